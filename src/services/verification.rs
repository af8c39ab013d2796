//! Email verification codes sent before registration.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::auth::{self, TokenService};
use crate::domain::aggregates::verification::{CODE_TTL_MINUTES, MAX_SENDS_PER_WINDOW};
use crate::domain::aggregates::EmailVerification;
use crate::domain::value_objects::EmailAddress;
use crate::error::{EcommerceError, Result};
use crate::integrations::EmailSender;
use crate::store::Repositories;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SendVerification {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct VerifyCode {
    #[validate(email)]
    pub email: String,
    #[validate(length(equal = 6))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeSent {
    pub message: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationGranted {
    pub verification_token: String,
}

fn six_digit_code() -> String { rand::thread_rng().gen_range(100_000..1_000_000).to_string() }

#[derive(Clone)]
pub struct VerificationService {
    repos: Repositories,
    email: Arc<dyn EmailSender>,
    tokens: TokenService,
}

impl VerificationService {
    pub fn new(repos: Repositories, email: Arc<dyn EmailSender>, tokens: TokenService) -> Self {
        Self { repos, email, tokens }
    }

    pub async fn send_code(&self, raw_email: &str) -> Result<CodeSent> {
        let email = EmailAddress::parse(raw_email).map_err(|e| EcommerceError::validation(e.to_string()))?;
        let now = Utc::now();

        let purged = self.repos.verifications.purge_expired_verifications(now).await?;
        if purged > 0 {
            tracing::debug!(purged, "expired verification codes removed");
        }

        if self.repos.customers.find_customer_by_email(&email).await?.is_some() {
            return Err(EcommerceError::validation("Email already registered"));
        }

        let window_start = now - Duration::minutes(CODE_TTL_MINUTES);
        if self.repos.verifications.count_verifications_since(&email, window_start).await? >= MAX_SENDS_PER_WINDOW {
            tracing::warn!(email = %email, "verification send rate limit hit");
            return Err(EcommerceError::validation("Too many requests. Please try again later."));
        }

        let code = six_digit_code();
        let hash = auth::hash_secret(code.clone(), auth::CODE_COST).await?;
        self.repos.verifications.insert_verification(&EmailVerification::issue(email.clone(), hash, now)).await?;

        self.email.send_verification_code(email.as_str(), &code).await?;
        tracing::info!(email = %email, "verification code sent");
        Ok(CodeSent { message: "Verification code sent" })
    }

    pub async fn verify_code(&self, raw_email: &str, code: &str) -> Result<VerificationGranted> {
        let email = EmailAddress::parse(raw_email).map_err(|e| EcommerceError::validation(e.to_string()))?;
        let now = Utc::now();

        let record = self
            .repos
            .verifications
            .latest_pending_verification(&email, now)
            .await?
            .ok_or_else(|| EcommerceError::validation("No pending verification found. Please request a new code."))?;

        if record.attempts_exhausted() {
            return Err(EcommerceError::validation("Too many failed attempts. Please request a new code."));
        }

        if !auth::verify_secret(code.to_string(), record.code_hash.clone()).await? {
            self.repos.verifications.record_failed_attempt(record.id).await?;
            return Err(EcommerceError::validation("Invalid verification code"));
        }

        self.repos.verifications.mark_verified(record.id, now).await?;
        Ok(VerificationGranted { verification_token: self.tokens.issue_verification(&email)? })
    }
}

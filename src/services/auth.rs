//! Bearer tokens and password hashing.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value_objects::EmailAddress;
use crate::error::{EcommerceError, Result};

pub const PASSWORD_COST: u32 = 12;
pub const CODE_COST: u32 = 10;

const VERIFICATION_PURPOSE: &str = "email-verification";
const VERIFICATION_TTL_SECS: i64 = 15 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VerificationClaims {
    email: String,
    purpose: String,
    iat: i64,
    exp: i64,
}

/// Signs and checks HS256 tokens with the shared secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenService {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn issue_access(&self, customer_id: Uuid, email: &EmailAddress) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AccessClaims { sub: customer_id, email: email.to_string(), iat: now, exp: now + self.ttl_secs };
        self.sign(&claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| EcommerceError::Unauthorized("Unauthorized".into()))
    }

    /// Short-lived proof that `email` passed code verification.
    pub fn issue_verification(&self, email: &EmailAddress) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = VerificationClaims {
            email: email.to_string(),
            purpose: VERIFICATION_PURPOSE.to_string(),
            iat: now,
            exp: now + VERIFICATION_TTL_SECS,
        };
        self.sign(&claims)
    }

    pub fn verification_matches(&self, token: &str, email: &EmailAddress) -> bool {
        match decode::<VerificationClaims>(token, &self.decoding, &Validation::new(Algorithm::HS256)) {
            Ok(data) => data.claims.purpose == VERIFICATION_PURPOSE && data.claims.email == email.as_str(),
            Err(e) => {
                tracing::debug!(error = %e, "verification token rejected");
                false
            }
        }
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| EcommerceError::Storage(format!("token signing failed: {e}")))
    }
}

/// bcrypt runs on the blocking pool.
pub async fn hash_secret(secret: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost))
        .await
        .map_err(|e| EcommerceError::Storage(e.to_string()))?
        .map_err(|e| EcommerceError::Storage(e.to_string()))
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_secret(secret: String, hash: String) -> Result<bool> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(secret, &hash))
        .await
        .map_err(|e| EcommerceError::Storage(e.to_string()))?;
    Ok(verified.unwrap_or(false))
}

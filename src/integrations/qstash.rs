//! QStash delayed delivery: publishing, cancellation and webhook signatures.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::IntegrationError;
use crate::config::QstashConfig;

/// At-least-once delayed delivery of a JSON payload to a webhook URL.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DelayedDispatch: Send + Sync {
    /// Returns the message handle, or `None` when nothing was scheduled.
    async fn publish(&self, url: &str, payload: serde_json::Value, delay: Duration) -> Result<Option<String>, IntegrationError>;

    async fn cancel(&self, handle: &str) -> Result<(), IntegrationError>;
}

/// HTTP client for the QStash v2 API.
#[derive(Debug, Clone)]
pub struct QstashClient {
    http: Client,
    base_url: String,
    token: String,
}

impl QstashClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { http: Client::new(), base_url: base_url.into().trim_end_matches('/').to_string(), token: token.into() }
    }

    /// `None` when no token is configured.
    pub fn from_config(config: &QstashConfig) -> Option<Self> {
        config.token.as_ref().map(|token| Self::new(config.url.clone(), token.clone()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_id: String,
}

#[async_trait]
impl DelayedDispatch for QstashClient {
    async fn publish(&self, url: &str, payload: serde_json::Value, delay: Duration) -> Result<Option<String>, IntegrationError> {
        let response = self
            .http
            .post(format!("{}/v2/publish/{}", self.base_url, url))
            .bearer_auth(&self.token)
            .header("Upstash-Delay", format!("{}s", delay.as_secs()))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IntegrationError::rejected("qstash", format!("publish failed with status {status}: {text}")));
        }

        let parsed: PublishResponse = response.json().await?;
        Ok(Some(parsed.message_id))
    }

    async fn cancel(&self, handle: &str) -> Result<(), IntegrationError> {
        let response = self
            .http
            .delete(format!("{}/v2/messages/{}", self.base_url, handle))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(IntegrationError::rejected("qstash", format!("cancel failed with status {status}: {text}")));
        }
        Ok(())
    }
}

/// Offline stand-in: schedules nothing.
#[derive(Debug, Clone, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl DelayedDispatch for NoopDispatcher {
    async fn publish(&self, url: &str, _payload: serde_json::Value, delay: Duration) -> Result<Option<String>, IntegrationError> {
        tracing::debug!(url, delay_secs = delay.as_secs(), "delayed dispatch offline, skipping publish");
        Ok(None)
    }

    async fn cancel(&self, handle: &str) -> Result<(), IntegrationError> {
        tracing::debug!(handle, "delayed dispatch offline, skipping cancel");
        Ok(())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,

    #[error("invalid signature: {0}")]
    Invalid(String),

    #[error("body hash mismatch")]
    BodyMismatch,
}

#[derive(Debug, Deserialize)]
struct SignatureClaims {
    body: String,
}

/// Checks the `Upstash-Signature` JWT against the current and next signing keys.
#[derive(Clone, Default)]
pub struct SignatureVerifier {
    keys: Vec<String>,
}

impl SignatureVerifier {
    pub fn new(current: Option<String>, next: Option<String>) -> Self {
        Self { keys: current.into_iter().chain(next).collect() }
    }

    pub fn from_config(config: &QstashConfig) -> Self {
        Self::new(config.current_signing_key.clone(), config.next_signing_key.clone())
    }

    /// Without keys every request is accepted.
    pub fn is_enabled(&self) -> bool { !self.keys.is_empty() }

    pub fn verify(&self, signature: Option<&str>, body: &[u8]) -> Result<(), SignatureError> {
        if !self.is_enabled() {
            return Ok(());
        }
        let token = signature.map(str::trim).filter(|s| !s.is_empty()).ok_or(SignatureError::Missing)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&["Upstash"]);
        validation.validate_nbf = true;

        let mut last = SignatureError::Invalid("no signing key".into());
        for key in &self.keys {
            match decode::<SignatureClaims>(token, &DecodingKey::from_secret(key.as_bytes()), &validation) {
                Ok(data) => {
                    let expected = URL_SAFE_NO_PAD.encode(Sha256::digest(body));
                    return if data.claims.body.trim_end_matches('=') == expected {
                        Ok(())
                    } else {
                        Err(SignatureError::BodyMismatch)
                    };
                }
                Err(e) => last = SignatureError::Invalid(e.to_string()),
            }
        }
        Err(last)
    }
}

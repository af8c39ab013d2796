//! Outbound collaborators: delayed dispatch, transactional email, object storage
//! and the event bus.

use thiserror::Error;

use crate::error::EcommerceError;

pub mod emailjs;
pub mod nats;
pub mod qstash;
pub mod s3;

pub use emailjs::{EmailItem, EmailJsClient, EmailSender, OrderConfirmation, ReminderDetails};
pub use nats::EventBus;
pub use qstash::{DelayedDispatch, NoopDispatcher, QstashClient, SignatureVerifier};
pub use s3::{ObjectStorage, PresignedUpload, S3Storage, StoredObject, UnconfiguredStorage};

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} rejected the request: {detail}")]
    Rejected { service: &'static str, detail: String },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("object storage error: {0}")]
    Storage(String),
}

impl IntegrationError {
    pub fn rejected(service: &'static str, detail: impl Into<String>) -> Self {
        Self::Rejected { service, detail: detail.into() }
    }
}

impl From<IntegrationError> for EcommerceError {
    fn from(error: IntegrationError) -> Self {
        match error {
            IntegrationError::NotConfigured(what) => Self::Storage(format!("{what} is not configured")),
            other => Self::Upstream(other.to_string()),
        }
    }
}

//! Email verification record

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use crate::domain::value_objects::EmailAddress;

pub const CODE_TTL_MINUTES: i64 = 10;
pub const MAX_ATTEMPTS: u32 = 5;
pub const MAX_SENDS_PER_WINDOW: usize = 3;

#[derive(Clone, Debug, PartialEq)]
pub struct EmailVerification {
    pub id: Uuid,
    pub email: EmailAddress,
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl EmailVerification {
    pub fn issue(email: EmailAddress, code_hash: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), email, code_hash, expires_at: now + Duration::minutes(CODE_TTL_MINUTES),
            attempts: 0, verified: false, verified_at: None, created_at: now,
        }
    }

    pub fn is_pending(&self, now: DateTime<Utc>) -> bool { !self.verified && self.expires_at > now }

    pub fn attempts_exhausted(&self) -> bool { self.attempts >= MAX_ATTEMPTS }
}

//! Customer Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{EmailAddress, PublicCode};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub country: Option<String>,
}

impl Default for ShippingAddress {
    fn default() -> Self {
        Self {
            full_name: None, phone: None, address1: None, address2: None, city: None,
            state: None, postcode: None, country: Some("Australia".to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    pub email: EmailAddress,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub shipping_address: Option<ShippingAddress>,
    pub referral_program_id: Option<Uuid>,
    pub(crate) referral_code: Option<PublicCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    pub fn register(email: EmailAddress, password_hash: String, referral_code: PublicCode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), email, password_hash, first_name: None, last_name: None, phone: None,
            is_admin: false, shipping_address: None, referral_program_id: None,
            referral_code: Some(referral_code), created_at: now, updated_at: now,
        }
    }

    pub fn referral_code(&self) -> Option<&PublicCode> { self.referral_code.as_ref() }

    /// Sets the personal referral code unless one already exists; returns whether it was set.
    pub fn grant_referral_code(&mut self, code: PublicCode) -> bool {
        if self.referral_code.is_some() { return false; }
        self.referral_code = Some(code);
        self.touch();
        true
    }

    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter().flatten().collect::<Vec<_>>().join(" ");
        if name.trim().is_empty() { self.email.to_string() } else { name }
    }

    pub fn profile(&self) -> CustomerProfile {
        CustomerProfile {
            id: self.id, email: self.email.to_string(), first_name: self.first_name.clone(),
            last_name: self.last_name.clone(), phone: self.phone.clone(), is_admin: self.is_admin,
            shipping_address: self.shipping_address.clone(), referral_program_id: self.referral_program_id,
            referral_code: self.referral_code.as_ref().map(ToString::to_string),
            created_at: self.created_at, updated_at: self.updated_at,
        }
    }

    pub fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Customer as exposed over the API, without the password hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub shipping_address: Option<ShippingAddress>,
    pub referral_program_id: Option<Uuid>,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referral_code_is_immutable() {
        let email = EmailAddress::parse("a@b.io").unwrap();
        let first = PublicCode::normalize("AAAA1111").unwrap();
        let mut c = Customer::register(email, "hash".into(), first.clone());
        assert!(!c.grant_referral_code(PublicCode::normalize("BBBB2222").unwrap()));
        assert_eq!(c.referral_code(), Some(&first));
    }

    #[test]
    fn test_profile_hides_hash_and_names() {
        let mut c = Customer::register(EmailAddress::parse("x@y.io").unwrap(), "secret".into(), PublicCode::random_upper());
        assert_eq!(c.display_name(), "x@y.io");
        c.first_name = Some("Ada".into());
        c.last_name = Some("Lovelace".into());
        assert_eq!(c.display_name(), "Ada Lovelace");
        let json = serde_json::to_string(&c.profile()).unwrap();
        assert!(!json.contains("secret"));
    }
}

//! Customer accounts: registration, login, profile and admin maintenance.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::auth::{self, TokenService};
use super::coupons::CouponService;
use crate::domain::aggregates::{Customer, CustomerProfile, ShippingAddress};
use crate::domain::value_objects::{EmailAddress, Money, PublicCode};
use crate::error::{EcommerceError, Result};
use crate::store::Repositories;

const CODE_ATTEMPTS: usize = 5;
const WELCOME_BONUS_CENTS: i64 = 500;
const REFERRAL_BONUS_CENTS: i64 = 200;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub verification_token: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub referral_code: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Login {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub shipping_address: Option<ShippingAddress>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    #[validate(length(min = 1))]
    pub current_password: String,
    #[validate(length(min = 8))]
    pub new_password: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdate {
    #[validate(email)]
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub is_admin: Option<bool>,
    pub referral_program_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub customer: CustomerProfile,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileEnvelope {
    pub customer: CustomerProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailExists {
    pub exists: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordChanged {
    pub updated: bool,
}

fn parse_email(raw: &str) -> Result<EmailAddress> {
    EmailAddress::parse(raw).map_err(|e| EcommerceError::validation(e.to_string()))
}

fn invalid_credentials() -> EcommerceError {
    EcommerceError::Unauthorized("Invalid email or password".into())
}

#[derive(Clone)]
pub struct CustomerService {
    repos: Repositories,
    coupons: CouponService,
    tokens: TokenService,
    password_cost: u32,
}

impl CustomerService {
    pub fn new(repos: Repositories, coupons: CouponService, tokens: TokenService) -> Self {
        Self { repos, coupons, tokens, password_cost: auth::PASSWORD_COST }
    }

    /// Lower bcrypt cost, for tests and local runs.
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub fn tokens(&self) -> &TokenService { &self.tokens }

    pub async fn get(&self, id: Uuid) -> Result<Customer> {
        self.repos.customers.get_customer(id).await?.ok_or(EcommerceError::NotFound("Customer"))
    }

    pub async fn register(&self, input: Registration) -> Result<Session> {
        let email = parse_email(&input.email)?;
        if !self.tokens.verification_matches(&input.verification_token, &email) {
            return Err(EcommerceError::validation(
                "Email verification expired or invalid. Please start over.",
            ));
        }
        if self.repos.customers.find_customer_by_email(&email).await?.is_some() {
            return Err(EcommerceError::validation("Email already registered"));
        }

        let hash = auth::hash_secret(input.password, self.password_cost).await?;
        let code = self.unique_referral_code().await?;
        let referrer = match input.referral_code.as_deref().and_then(PublicCode::normalize) {
            Some(code) => self.repos.customers.find_customer_by_referral_code(code.as_str()).await?,
            None => None,
        };

        let mut customer = Customer::register(email, hash, code);
        customer.first_name = input.first_name;
        customer.last_name = input.last_name;
        customer.phone = input.phone;
        customer.shipping_address = input.shipping_address;
        self.repos.customers.insert_customer(&customer).await?;
        tracing::info!(
            customer_id = %customer.id,
            referred = referrer.is_some(),
            "customer registered"
        );

        self.grant_signup_coupons(&customer, referrer.as_ref()).await;

        let access_token = self.tokens.issue_access(customer.id, &customer.email)?;
        Ok(Session { customer: customer.profile(), access_token })
    }

    /// Welcome coupon, plus a referral bonus for both sides. Failures are only logged.
    async fn grant_signup_coupons(&self, customer: &Customer, referrer: Option<&Customer>) {
        let expiry = Some(Utc::now() + Duration::days(365));
        let welcome = Money::from_cents(WELCOME_BONUS_CENTS);
        let description = Some("Welcome bonus".to_string());
        if let Err(e) = self.coupons.issue(customer.id, welcome, description, expiry).await {
            tracing::error!(
                customer_id = %customer.id,
                error = %e,
                "failed to create welcome coupon"
            );
        }

        let Some(referrer) = referrer else { return };
        let bonus = Money::from_cents(REFERRAL_BONUS_CENTS);
        let result = async {
            self.coupons.issue(customer.id, bonus, Some("Referral bonus".into()), expiry).await?;
            let description = format!("Referral bonus - referred {}", customer.email);
            self.coupons.issue(referrer.id, bonus, Some(description), expiry).await
        }
        .await;
        if let Err(e) = result {
            tracing::error!(
                customer_id = %customer.id,
                referrer_id = %referrer.id,
                error = %e,
                "failed to create referral coupons"
            );
        }
    }

    async fn unique_referral_code(&self) -> Result<PublicCode> {
        for _ in 0..CODE_ATTEMPTS {
            let code = PublicCode::random_upper();
            if !self.repos.customers.referral_code_taken(code.as_str()).await? {
                return Ok(code);
            }
        }
        Err(EcommerceError::validation("Failed to generate unique referral code"))
    }

    pub async fn login(&self, input: Login) -> Result<Session> {
        let email = parse_email(&input.email).map_err(|_| invalid_credentials())?;
        let customer = self
            .repos
            .customers
            .find_customer_by_email(&email)
            .await?
            .ok_or_else(invalid_credentials)?;
        if !auth::verify_secret(input.password, customer.password_hash.clone()).await? {
            tracing::info!(customer_id = %customer.id, "login rejected");
            return Err(invalid_credentials());
        }
        let access_token = self.tokens.issue_access(customer.id, &customer.email)?;
        Ok(Session { customer: customer.profile(), access_token })
    }

    pub async fn email_exists(&self, raw: &str) -> Result<EmailExists> {
        let email = parse_email(raw)?;
        let exists = self.repos.customers.find_customer_by_email(&email).await?.is_some();
        Ok(EmailExists { exists })
    }

    pub async fn me(&self, id: Uuid) -> Result<ProfileEnvelope> {
        Ok(ProfileEnvelope { customer: self.get(id).await?.profile() })
    }

    /// Names, phone and shipping address only.
    pub async fn update_me(&self, id: Uuid, input: ProfileUpdate) -> Result<ProfileEnvelope> {
        let mut customer = self.get(id).await?;
        if input.first_name.is_some() { customer.first_name = input.first_name; }
        if input.last_name.is_some() { customer.last_name = input.last_name; }
        if input.phone.is_some() { customer.phone = input.phone; }
        if input.shipping_address.is_some() { customer.shipping_address = input.shipping_address; }
        customer.touch();
        self.repos.customers.update_customer(&customer).await?;
        Ok(ProfileEnvelope { customer: customer.profile() })
    }

    pub async fn change_password(
        &self,
        id: Uuid,
        input: PasswordChange,
    ) -> Result<PasswordChanged> {
        let mut customer = self.get(id).await?;
        if !auth::verify_secret(input.current_password, customer.password_hash.clone()).await? {
            return Err(EcommerceError::Unauthorized("Current password is incorrect".into()));
        }
        customer.password_hash = auth::hash_secret(input.new_password, self.password_cost).await?;
        customer.touch();
        self.repos.customers.update_customer(&customer).await?;
        tracing::info!(customer_id = %customer.id, "password changed");
        Ok(PasswordChanged { updated: true })
    }

    pub async fn list(&self) -> Result<Vec<CustomerProfile>> {
        Ok(self.repos.customers.list_customers().await?.iter().map(Customer::profile).collect())
    }

    pub async fn profile(&self, id: Uuid) -> Result<CustomerProfile> {
        Ok(self.get(id).await?.profile())
    }

    /// Assigning a referral program hands out a personal code when the customer has none.
    pub async fn admin_update(&self, id: Uuid, input: CustomerUpdate) -> Result<CustomerProfile> {
        let mut customer = self.get(id).await?;
        if let Some(raw) = input.email.as_deref() {
            let email = parse_email(raw)?;
            if let Some(other) = self.repos.customers.find_customer_by_email(&email).await? {
                if other.id != customer.id {
                    return Err(EcommerceError::validation("Email already registered"));
                }
            }
            customer.email = email;
        }
        if input.first_name.is_some() { customer.first_name = input.first_name; }
        if input.last_name.is_some() { customer.last_name = input.last_name; }
        if input.phone.is_some() { customer.phone = input.phone; }
        if let Some(is_admin) = input.is_admin { customer.is_admin = is_admin; }
        if let Some(program_id) = input.referral_program_id {
            if self.repos.referrals.get_program(program_id).await?.is_none() {
                return Err(EcommerceError::NotFound("Referral"));
            }
            customer.referral_program_id = Some(program_id);
            if customer.referral_code().is_none() {
                let code = self.unique_referral_code().await?;
                customer.grant_referral_code(code);
            }
        }
        customer.touch();
        self.repos.customers.update_customer(&customer).await?;
        Ok(customer.profile())
    }
}

//! Referral programs and referral-code resolution.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Customer, DiscountType, ReferralProgram};
use crate::domain::value_objects::PublicCode;
use crate::error::{EcommerceError, Result};
use crate::store::Repositories;

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewReferralProgram {
    #[validate(length(min = 1))]
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReferralProgramUpdate {
    #[validate(length(min = 1))]
    pub name: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub active: Option<bool>,
}

/// Public view of a referral code, returned before checkout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCodeInfo {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub program_name: String,
}

fn non_negative(value: Decimal) -> Result<Decimal> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(EcommerceError::validation("discountValue must not be negative"));
    }
    Ok(value)
}

#[derive(Clone)]
pub struct ReferralService {
    repos: Repositories,
}

impl ReferralService {
    pub fn new(repos: Repositories) -> Self { Self { repos } }

    pub async fn list(&self) -> Result<Vec<ReferralProgram>> { self.repos.referrals.list_programs().await }

    pub async fn get(&self, id: Uuid) -> Result<ReferralProgram> {
        self.repos.referrals.get_program(id).await?.ok_or(EcommerceError::NotFound("Referral"))
    }

    pub async fn create(&self, input: NewReferralProgram) -> Result<ReferralProgram> {
        let program = ReferralProgram::create(input.name, input.discount_type, non_negative(input.discount_value)?, input.active.unwrap_or(true));
        self.repos.referrals.insert_program(&program).await?;
        tracing::info!(program_id = %program.id, name = %program.name, "referral program created");
        Ok(program)
    }

    pub async fn update(&self, id: Uuid, input: ReferralProgramUpdate) -> Result<ReferralProgram> {
        let mut program = self.get(id).await?;
        if let Some(name) = input.name { program.name = name.trim().to_string(); }
        if let Some(active) = input.active { program.active = active; }
        if input.discount_type.is_some() || input.discount_value.is_some() {
            let discount_type = input.discount_type.unwrap_or(program.discount_type);
            let value = input.discount_value.map(non_negative).transpose()?.unwrap_or(program.discount_value);
            program.set_discount(discount_type, value);
        }
        program.updated_at = chrono::Utc::now();
        self.repos.referrals.update_program(&program).await?;
        Ok(program)
    }

    pub async fn get_active(&self, id: Uuid) -> Result<Option<ReferralProgram>> {
        Ok(self.repos.referrals.get_program(id).await?.filter(|p| p.active))
    }

    /// Owner and active program behind a referral code. Every failing step gives the same error.
    pub async fn resolve_code(&self, raw: &str) -> Result<(Customer, ReferralProgram)> {
        let code = PublicCode::normalize(raw).ok_or(EcommerceError::InvalidReferralCode)?;
        let owner = self
            .repos
            .customers
            .find_customer_by_referral_code(code.as_str())
            .await?
            .ok_or(EcommerceError::InvalidReferralCode)?;
        let program_id = owner.referral_program_id.ok_or(EcommerceError::InvalidReferralCode)?;
        let program = self.get_active(program_id).await?.ok_or(EcommerceError::InvalidReferralCode)?;
        Ok((owner, program))
    }

    pub async fn describe_code(&self, raw: &str) -> Result<ReferralCodeInfo> {
        let (owner, program) = self.resolve_code(raw).await?;
        Ok(ReferralCodeInfo {
            code: owner.referral_code().map(ToString::to_string).unwrap_or_default(),
            discount_type: program.discount_type,
            discount_value: program.effective_value(),
            program_name: program.name,
        })
    }
}

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::{AppState, AuthCustomer, ValidatedJson};
use crate::error::Result;
use crate::services::customers::{EmailExists, Login, PasswordChange, PasswordChanged, ProfileEnvelope, ProfileUpdate, Registration, Session};
use crate::services::verification::{CodeSent, SendVerification, VerificationGranted, VerifyCode};

#[derive(Debug, Deserialize)]
pub struct EmailParam {
    #[serde(default)]
    email: String,
}

pub async fn send_verification(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<SendVerification>) -> Result<Json<CodeSent>> {
    Ok(Json(s.services.verification.send_code(&body.email).await?))
}

pub async fn verify_code(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<VerifyCode>) -> Result<Json<VerificationGranted>> {
    Ok(Json(s.services.verification.verify_code(&body.email, &body.code).await?))
}

pub async fn register(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<Registration>) -> Result<(StatusCode, Json<Session>)> {
    Ok((StatusCode::CREATED, Json(s.services.customers.register(body).await?)))
}

pub async fn login(State(s): State<AppState>, ValidatedJson(body): ValidatedJson<Login>) -> Result<Json<Session>> {
    Ok(Json(s.services.customers.login(body).await?))
}

pub async fn email_exists(State(s): State<AppState>, Query(q): Query<EmailParam>) -> Result<Json<EmailExists>> {
    Ok(Json(s.services.customers.email_exists(&q.email).await?))
}

pub async fn me(State(s): State<AppState>, caller: AuthCustomer) -> Result<Json<ProfileEnvelope>> {
    Ok(Json(s.services.customers.me(caller.id).await?))
}

pub async fn update_me(State(s): State<AppState>, caller: AuthCustomer, ValidatedJson(body): ValidatedJson<ProfileUpdate>) -> Result<Json<ProfileEnvelope>> {
    Ok(Json(s.services.customers.update_me(caller.id, body).await?))
}

pub async fn change_password(
    State(s): State<AppState>,
    caller: AuthCustomer,
    ValidatedJson(body): ValidatedJson<PasswordChange>,
) -> Result<Json<PasswordChanged>> {
    Ok(Json(s.services.customers.change_password(caller.id, body).await?))
}

//! Request extractors: bearer authentication and validated JSON bodies.

use axum::async_trait;
use axum::extract::{FromRef, FromRequest, FromRequestParts, Json, Request};
use axum::http::{header, request::Parts};
use serde::de::DeserializeOwned;
use uuid::Uuid;
use validator::Validate;

use super::AppState;
use crate::domain::aggregates::Customer;
use crate::error::EcommerceError;

/// Caller identified by a valid access token.
#[derive(Debug, Clone)]
pub struct AuthCustomer {
    pub id: Uuid,
    pub email: String,
}

fn bearer(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim()).filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthCustomer
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = bearer(parts).ok_or_else(|| EcommerceError::Unauthorized("Unauthorized".into()))?;
        let claims = state.services.tokens().verify_access(token)?;
        Ok(Self { id: claims.sub, email: claims.email })
    }
}

/// Authenticated caller whose stored record has `isAdmin` set.
#[derive(Debug, Clone)]
pub struct AdminCustomer(pub Customer);

#[async_trait]
impl<S> FromRequestParts<S> for AdminCustomer
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let caller = AuthCustomer::from_request_parts(parts, state).await?;
        let state = AppState::from_ref(state);
        let customer = match state.services.customers.get(caller.id).await {
            Ok(c) => c,
            Err(EcommerceError::NotFound(_)) => return Err(EcommerceError::Unauthorized("Unauthorized".into())),
            Err(e) => return Err(e),
        };
        if !customer.is_admin {
            tracing::warn!(customer_id = %customer.id, "admin route refused");
            return Err(EcommerceError::Forbidden);
        }
        Ok(Self(customer))
    }
}

/// JSON body that has passed its `validator` rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = EcommerceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| EcommerceError::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(authorization: Option<&str>) -> Parts {
        let mut builder = HttpRequest::builder().uri("/");
        if let Some(value) = authorization {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_bearer_parsing() {
        assert_eq!(bearer(&parts(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer(&parts(Some("bearer  xyz "))), Some("xyz"));
        assert_eq!(bearer(&parts(Some("Basic abc"))), None);
        assert_eq!(bearer(&parts(Some("Bearer "))), None);
        assert_eq!(bearer(&parts(None)), None);
    }
}

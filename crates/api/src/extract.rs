//! Request extractors that reject with [`ApiError`] instead of axum's
//! plain-text rejections.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use checkout::CheckoutError;
use common::{Actor, Role, UserId};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Caller id, set by the authenticating proxy in front of the API.
pub const USER_ID_HEADER: &str = "x-user-id";
/// `customer` (default) or `admin`.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller. Missing or malformed identity headers are
/// rejected with 401.
#[derive(Debug, Clone, Copy)]
pub struct Identity(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        };

        let user_id = header(USER_ID_HEADER)
            .and_then(|id| UserId::parse(id).ok())
            .ok_or(CheckoutError::Unauthorized)?;
        let role = match header(USER_ROLE_HEADER) {
            None => Role::Customer,
            Some(role) => role
                .parse::<Role>()
                .map_err(|_| CheckoutError::Unauthorized)?,
        };

        Ok(Identity(Actor { user_id, role }))
    }
}

/// An authenticated administrator; other callers get 403.
#[derive(Debug, Clone, Copy)]
pub struct AdminIdentity(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for AdminIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Identity(actor) = Identity::from_request_parts(parts, state).await?;
        if !actor.is_admin() {
            return Err(CheckoutError::Forbidden("administrator role required").into());
        }
        Ok(AdminIdentity(actor))
    }
}

pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(ApiPath(value))
    }
}

pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::validation(rejection.body_text()))?;
        Ok(ApiQuery(value))
    }
}

//! Custom Extractors
//!
//! Turn a presented bearer token into a verified subject, for HTTP requests
//! ([`AuthUser`]) and for real-time handshakes ([`authenticate_handshake`]).

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::application::services::AuthService;
use crate::domain::User;
use crate::shared::error::AppError;

/// Authenticated user resolved from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<dyn AuthService>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized("Missing authorization header".into()))?;

        let auth = Arc::<dyn AuthService>::from_ref(state);
        let user = auth.verify(bearer.token()).await?;

        Ok(AuthUser(user))
    }
}

/// Token carried by a handshake credential: either `Bearer <token>` or the
/// bare token.
pub fn bearer_token(credential: &str) -> Option<&str> {
    let credential = credential.trim();
    let token = match credential.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        Some(_) => return None,
        None if credential.eq_ignore_ascii_case("bearer") => return None,
        None => credential,
    };

    (!token.is_empty()).then_some(token)
}

/// Verify a real-time handshake credential.
pub async fn authenticate_handshake(
    auth: &dyn AuthService,
    credential: &str,
) -> Result<User, AppError> {
    let token = bearer_token(credential)
        .ok_or_else(|| AppError::Unauthorized("Missing handshake token".into()))?;

    Ok(auth.verify(token).await?)
}

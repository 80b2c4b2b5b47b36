//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::bearer::bearer_token;
use super::errors::{AuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use crate::db::{User, UserStatus};

/// Core authentication logic shared by the extractors.
///
/// Validates the bearer access token and loads the account. An expired or
/// missing token is rejected outright; refreshing is always an explicit
/// client call to the refresh endpoint, never a side effect of another
/// request.
async fn authenticate_request<S>(parts: &Parts, state: &S) -> Result<User, AuthErrorKind>
where
    S: HasAuthBackend + Send + Sync,
{
    let token = bearer_token(&parts.headers).ok_or(AuthErrorKind::NotAuthenticated)?;

    let claims = state
        .jwt()
        .validate_access_token(token)
        .map_err(|_| AuthErrorKind::InvalidToken)?;

    let user = state
        .db()
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .map_err(|e| {
            tracing::error!("Failed to get user: {}", e);
            AuthErrorKind::DatabaseError
        })?
        .ok_or(AuthErrorKind::UserNotFound)?;

    // A rejected account must not coast on a still-live access token
    if user.status != UserStatus::Active {
        return Err(AuthErrorKind::AccountInactive);
    }

    Ok(user)
}

/// Extractor for endpoints that require an authenticated, active account.
pub struct Auth(pub User);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_request(parts, state)
            .await
            .map(Auth)
            .map_err(AuthError::from)
    }
}

/// Extractor for endpoints restricted to the admin role.
pub struct AdminAuth(pub User);

impl<S> FromRequestParts<S> for AdminAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError(AuthErrorKind::InsufficientRole));
        }
        Ok(AdminAuth(user))
    }
}

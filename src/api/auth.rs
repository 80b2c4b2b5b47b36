//! Authentication API endpoints.
//!
//! - POST `/signup` - Create a staff account
//! - POST `/login` - Exchange credentials for a token pair
//! - POST `/refresh` - Exchange a refresh token for a new access token
//! - POST `/logout` - Revoke the presented refresh token
//! - GET `/me` - Current account profile

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::error::{ApiError, ResultExt};
use crate::auth::Auth;
use crate::db::{
    ADMIN_ROLE, Database, FLAG_ADMIN_SIGNUP, FLAG_MANUAL_APPROVAL, KEY_ROLES, NewUser, User,
    UserStatus, UserSummary,
};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::password;

#[derive(Clone)]
pub struct AuthApiState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(AuthApiState);

pub fn router(state: AuthApiState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}

/// A token pair plus the profile, returned by login and open signup.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    user: UserSummary,
    access_token: String,
    refresh_token: String,
}

/// Issue both tokens for a user and record the refresh token's jti.
async fn issue_session(state: &AuthApiState, user: User) -> Result<SessionResponse, ApiError> {
    let access = state.jwt.issue_access_token(&user.uuid).map_err(|e| {
        error!("Failed to issue access token: {}", e);
        ApiError::internal("Failed to issue token")
    })?;
    let refresh = state.jwt.issue_refresh_token(&user.uuid).map_err(|e| {
        error!("Failed to issue refresh token: {}", e);
        ApiError::internal("Failed to issue token")
    })?;

    state
        .db
        .tokens()
        .create(&refresh.jti, user.id, refresh.issued_at, refresh.expires_at)
        .await
        .db_err("Failed to store refresh token")?;

    Ok(SessionResponse {
        user: UserSummary::from(user),
        access_token: access.token,
        refresh_token: refresh.token,
    })
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    password::hash_password(password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::internal("Failed to process password")
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupRequest {
    name: String,
    email: String,
    password: String,
    role: String,
    phone_number: Option<String>,
    department: Option<String>,
}

#[derive(Serialize)]
struct PendingResponse {
    pending: bool,
}

/// Create a staff account.
///
/// The requested role must be one of the configured role names, and the
/// admin role is only open while the `admin_signup` flag is set. With
/// `manual_approval` set the account is created pending and no tokens are
/// issued.
async fn signup(
    State(state): State<AuthApiState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() {
        return Err(ApiError::bad_request("Name and email are required"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::bad_request(
            "Password must be at least 8 characters",
        ));
    }

    let settings = state.db.settings();
    let role_allowed = settings
        .contains(KEY_ROLES, &req.role)
        .await
        .db_err("Failed to check role")?;
    if !role_allowed {
        return Err(ApiError::bad_request("Invalid role"));
    }
    if req.role == ADMIN_ROLE {
        let admin_open = settings
            .flag_set(FLAG_ADMIN_SIGNUP)
            .await
            .db_err("Failed to check signup flags")?;
        if !admin_open {
            return Err(ApiError::forbidden("Admin signup is disabled"));
        }
    }

    let manual_approval = settings
        .flag_set(FLAG_MANUAL_APPROVAL)
        .await
        .db_err("Failed to check signup flags")?;
    let status = if manual_approval {
        UserStatus::Pending
    } else {
        UserStatus::Active
    };

    let password_hash = hash_password(&req.password)?;
    let uuid = uuid::Uuid::new_v4().to_string();
    let new_user = NewUser {
        uuid: &uuid,
        name: req.name.trim(),
        email: req.email.trim(),
        password_hash: &password_hash,
        role: &req.role,
        status,
        phone_number: req.phone_number.as_deref(),
        department: req.department.as_deref(),
    };

    match state.db.users().create(&new_user).await {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        Err(e) => return Err(ApiError::db_error("Failed to create user", e)),
    }

    if manual_approval {
        return Ok((StatusCode::CREATED, Json(PendingResponse { pending: true })).into_response());
    }

    let user = state
        .db
        .users()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to load user")?
        .ok_or_else(|| ApiError::internal("User vanished after signup"))?;
    let session = issue_session(&state, user).await?;
    Ok((StatusCode::CREATED, Json(session)).into_response())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    email: String,
    password: String,
}

/// Exchange credentials for a token pair.
///
/// Unknown email and wrong password share one message so the response does
/// not reveal which accounts exist.
async fn login(
    State(state): State<AuthApiState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_email(req.email.trim())
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !password::verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    match user.status {
        UserStatus::Active => {}
        UserStatus::Pending => {
            return Err(ApiError::forbidden("Account is awaiting approval"));
        }
        UserStatus::Rejected => {
            return Err(ApiError::forbidden("Account has been rejected"));
        }
    }

    let session = issue_session(&state, user).await?;
    Ok(Json(session))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

/// Exchange a refresh token for a new access token.
///
/// The refresh token is not rotated; the same one stays valid until logout
/// or expiry. A missing token is 401, anything presented but unusable
/// (malformed, expired, revoked, orphaned) is 403.
async fn refresh(
    State(state): State<AuthApiState>,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.unwrap_or_default();
    let token = req
        .refresh_token
        .ok_or_else(|| ApiError::unauthorized("No refresh token"))?;

    let claims = state
        .jwt
        .validate_refresh_token(&token)
        .map_err(|_| ApiError::forbidden("Invalid or expired refresh token"))?;

    // Revoked tokens validate fine but have no row
    state
        .db
        .tokens()
        .get_by_jti(&claims.jti)
        .await
        .db_err("Failed to check token")?
        .ok_or_else(|| ApiError::forbidden("Refresh token has been revoked"))?;

    let user = state
        .db
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::forbidden("User no longer exists"))?;

    if user.status != UserStatus::Active {
        return Err(ApiError::forbidden("Account is not active"));
    }

    let access = state.jwt.issue_access_token(&user.uuid).map_err(|e| {
        error!("Failed to issue access token: {}", e);
        ApiError::internal("Failed to issue token")
    })?;

    Ok(Json(RefreshResponse {
        access_token: access.token,
    }))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    refresh_token: Option<String>,
}

/// Revoke the presented refresh token.
///
/// Idempotent: an absent, already-revoked or foreign token still yields
/// success, since the caller's goal (that token no longer granting access
/// for them) holds either way.
async fn logout(
    State(state): State<AuthApiState>,
    Auth(user): Auth,
    body: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.unwrap_or_default();
    if let Some(token) = req.refresh_token
        && let Ok(claims) = state.jwt.validate_refresh_token(&token)
    {
        // Only revoke rows belonging to the caller
        let record = state
            .db
            .tokens()
            .get_by_jti(&claims.jti)
            .await
            .db_err("Failed to check token")?;
        if let Some(record) = record
            && record.user_id == user.id
        {
            state
                .db
                .tokens()
                .delete_by_jti(&claims.jti)
                .await
                .db_err("Failed to revoke token")?;
        }
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

/// Current account profile.
async fn me(Auth(user): Auth) -> impl IntoResponse {
    Json(UserSummary::from(user))
}

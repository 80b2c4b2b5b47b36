//! Admin API endpoints.
//!
//! All endpoints require the admin role.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use chrono::{Datelike, Months, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::AdminAuth;
use crate::db::{
    ADMIN_ROLE, Database, DepartmentCount, KEY_ROLES, MonthlyCount, SettingStore, UserStatus,
    UserSummary,
};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct AdminState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(AdminState);

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/stats", get(dashboard_stats))
        .route("/users", get(list_users))
        .route("/users/stats", get(user_stats))
        .route("/users/{uuid}", delete(delete_user))
        .route("/users/{uuid}/status", patch(set_user_status))
        .route("/settings", get(get_settings).post(add_setting))
        .route("/settings/{key}/{value}", delete(remove_setting))
        .with_state(state)
}

#[derive(Deserialize)]
struct StatsQuery {
    from: Option<String>,
    to: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DashboardStats {
    total_patients: i64,
    patients_today: i64,
    department_counts: Vec<DepartmentCount>,
    monthly_history: Vec<MonthlyCount>,
}

/// Dashboard numbers: patient totals, today's registrations, department
/// breakdown and monthly history. `from`/`to` are `YYYY-MM-DD` and bound
/// both the total and the history; the history defaults to the last six
/// calendar months.
async fn dashboard_stats(
    State(state): State<AdminState>,
    _auth: AdminAuth,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let patients = state.db.patients();

    let total_patients = patients
        .count_in_range(query.from.as_deref(), query.to.as_deref())
        .await
        .db_err("Failed to count patients")?;
    let patients_today = patients
        .count_today()
        .await
        .db_err("Failed to count patients")?;
    let department_counts = patients
        .department_counts()
        .await
        .db_err("Failed to count departments")?;

    let history_from = match &query.from {
        Some(from) => from.clone(),
        None => {
            let today = Utc::now().date_naive();
            let start = today
                .with_day(1)
                .and_then(|d| d.checked_sub_months(Months::new(5)))
                .unwrap_or(today);
            start.format("%Y-%m-%d").to_string()
        }
    };
    let monthly_history = patients
        .monthly_history(&history_from, query.to.as_deref())
        .await
        .db_err("Failed to load history")?;

    Ok(Json(DashboardStats {
        total_patients,
        patients_today,
        department_counts,
        monthly_history,
    }))
}

/// List all staff accounts, newest first.
async fn list_users(
    State(state): State<AdminState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let users = state
        .db
        .users()
        .list_all()
        .await
        .db_err("Failed to list users")?;
    Ok(Json(users))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RoleCount {
    role: String,
    count: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserStats {
    total: i64,
    by_role: Vec<RoleCount>,
}

/// Account counts, total and per role.
async fn user_stats(
    State(state): State<AdminState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let users = state.db.users();
    let total = users.count_total().await.db_err("Failed to count users")?;
    let by_role = users
        .count_by_role()
        .await
        .db_err("Failed to count users")?
        .into_iter()
        .map(|(role, count)| RoleCount { role, count })
        .collect();
    Ok(Json(UserStats { total, by_role }))
}

/// Delete a staff account and its refresh tokens.
///
/// Refused when the target is the last active admin, so the system can
/// never lock every admin out.
async fn delete_user(
    State(state): State<AdminState>,
    _auth: AdminAuth,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let user = state
        .db
        .users()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_admin() && user.status == UserStatus::Active {
        let admins = state
            .db
            .users()
            .count_active_admins()
            .await
            .db_err("Failed to count admins")?;
        if admins <= 1 {
            return Err(ApiError::conflict("Cannot delete the last admin"));
        }
    }

    state
        .db
        .tokens()
        .delete_all_by_user(user.id)
        .await
        .db_err("Failed to revoke tokens")?;
    state
        .db
        .users()
        .delete(user.id)
        .await
        .db_err("Failed to delete user")?;

    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Deserialize)]
struct SetStatusRequest {
    status: UserStatus,
}

/// Approve or reject an account (or reactivate a rejected one).
async fn set_user_status(
    State(state): State<AdminState>,
    _auth: AdminAuth,
    Path(uuid): Path<String>,
    Json(req): Json<SetStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let user = state
        .db
        .users()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    state
        .db
        .users()
        .set_status(user.id, req.status)
        .await
        .db_err("Failed to update status")?;

    // A rejected account must not keep refreshing
    if req.status != UserStatus::Active {
        state
            .db
            .tokens()
            .delete_all_by_user(user.id)
            .await
            .db_err("Failed to revoke tokens")?;
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

/// All configured value sets.
async fn get_settings(
    State(state): State<AdminState>,
    _auth: AdminAuth,
) -> Result<impl IntoResponse, ApiError> {
    let settings = state
        .db
        .settings()
        .all()
        .await
        .db_err("Failed to load settings")?;
    Ok(Json(settings))
}

#[derive(Deserialize)]
struct AddSettingRequest {
    key: String,
    value: String,
}

/// Add a value to a setting key.
async fn add_setting(
    State(state): State<AdminState>,
    _auth: AdminAuth,
    Json(req): Json<AddSettingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !SettingStore::is_known_key(&req.key) {
        return Err(ApiError::not_found("Unknown setting key"));
    }
    let value = req.value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request("Value cannot be empty"));
    }

    match state.db.settings().add(&req.key, value).await {
        Ok(()) => Ok(Json(serde_json::json!({ "success": true }))),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(ApiError::conflict("Value already exists"))
        }
        Err(e) => Err(ApiError::db_error("Failed to add setting", e)),
    }
}

/// Remove a value from a setting key. The admin role name is reserved and
/// can never be removed.
async fn remove_setting(
    State(state): State<AdminState>,
    _auth: AdminAuth,
    Path((key, value)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    if !SettingStore::is_known_key(&key) {
        return Err(ApiError::not_found("Unknown setting key"));
    }
    if key == KEY_ROLES && value == ADMIN_ROLE {
        return Err(ApiError::forbidden("The admin role cannot be removed"));
    }

    let removed = state
        .db
        .settings()
        .remove(&key, &value)
        .await
        .db_err("Failed to remove setting")?;

    Ok(Json(serde_json::json!({ "removed": removed })))
}

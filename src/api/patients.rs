//! Patient registry API endpoints.
//!
//! Open to any authenticated, active staff account.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::{ApiError, ResultExt, validate_uuid};
use crate::auth::Auth;
use crate::db::{Database, NewPatient, PatientFilter, SortOrder, User};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct PatientsState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(PatientsState);

pub fn router(state: PatientsState) -> Router {
    Router::new()
        .route("/", get(list_patients).post(register_patient))
        .route("/{uuid}", put(update_patient))
        .route("/{uuid}", delete(delete_patient))
        .with_state(state)
}

const SEXES: [&str; 3] = ["Male", "Female", "Other"];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PatientRequest {
    name: String,
    age: i64,
    sex: String,
    phone_number: String,
    whatsapp_number: Option<String>,
    place: String,
    department: String,
    doctor: String,
}

impl PatientRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::bad_request("Name is required"));
        }
        if self.age < 0 || self.age > 150 {
            return Err(ApiError::bad_request("Invalid age"));
        }
        if !SEXES.contains(&self.sex.as_str()) {
            return Err(ApiError::bad_request("Sex must be Male, Female or Other"));
        }
        if self.phone_number.trim().is_empty() {
            return Err(ApiError::bad_request("Phone number is required"));
        }
        Ok(())
    }

    fn as_new_patient<'a>(&'a self, uuid: &'a str, registered_by: &'a User) -> NewPatient<'a> {
        NewPatient {
            uuid,
            name: self.name.trim(),
            age: self.age,
            sex: &self.sex,
            phone_number: self.phone_number.trim(),
            // WhatsApp defaults to the phone number when not given
            whatsapp_number: self
                .whatsapp_number
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.phone_number.trim()),
            place: &self.place,
            department: &self.department,
            doctor: &self.doctor,
            registered_by: &registered_by.uuid,
            registered_by_role: &registered_by.role,
        }
    }
}

/// Register a patient, recording who registered them.
async fn register_patient(
    State(state): State<PatientsState>,
    Auth(user): Auth,
    Json(req): Json<PatientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;

    let uuid = uuid::Uuid::new_v4().to_string();
    state
        .db
        .patients()
        .create(&req.as_new_patient(&uuid, &user))
        .await
        .db_err("Failed to register patient")?;

    let patient = state
        .db
        .patients()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to load patient")?
        .ok_or_else(|| ApiError::internal("Patient vanished after registration"))?;

    Ok((StatusCode::CREATED, Json(patient)))
}

#[derive(Deserialize)]
struct ListQuery {
    department: Option<String>,
    doctor: Option<String>,
    name: Option<String>,
    date: Option<String>,
    sort: Option<SortOrder>,
    page: Option<u32>,
    limit: Option<u32>,
}

/// List patients with filters and pagination.
async fn list_patients(
    State(state): State<PatientsState>,
    _auth: Auth,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = PatientFilter {
        department: query.department.filter(|s| !s.is_empty()),
        doctor: query.doctor.filter(|s| !s.is_empty()),
        name: query.name.filter(|s| !s.is_empty()),
        date: query.date.filter(|s| !s.is_empty()),
        sort: query.sort,
    };

    let page = state
        .db
        .patients()
        .list(&filter, query.page.unwrap_or(1), query.limit.unwrap_or(10))
        .await
        .db_err("Failed to list patients")?;

    Ok(Json(page))
}

/// Replace a patient's details.
async fn update_patient(
    State(state): State<PatientsState>,
    Auth(user): Auth,
    Path(uuid): Path<String>,
    Json(req): Json<PatientRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;
    req.validate()?;

    let updated = state
        .db
        .patients()
        .update(&uuid, &req.as_new_patient(&uuid, &user))
        .await
        .db_err("Failed to update patient")?;
    if !updated {
        return Err(ApiError::not_found("Patient not found"));
    }

    let patient = state
        .db
        .patients()
        .get_by_uuid(&uuid)
        .await
        .db_err("Failed to load patient")?
        .ok_or_else(|| ApiError::not_found("Patient not found"))?;

    Ok(Json(patient))
}

/// Remove a patient record.
async fn delete_patient(
    State(state): State<PatientsState>,
    _auth: Auth,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    validate_uuid(&uuid)?;

    let deleted = state
        .db
        .patients()
        .delete(&uuid)
        .await
        .db_err("Failed to delete patient")?;
    if !deleted {
        return Err(ApiError::not_found("Patient not found"));
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

mod admin;
mod auth;
mod error;
mod patients;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;

/// Create the API router.
pub fn create_api_router(db: Database, jwt: Arc<JwtConfig>) -> Router {
    let auth_state = auth::AuthApiState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let admin_state = admin::AdminState {
        db: db.clone(),
        jwt: jwt.clone(),
    };

    let patients_state = patients::PatientsState { db, jwt };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/admin", admin::router(admin_state))
        .nest("/patients", patients::router(patients_state))
}

//! HTTP client for the front-desk API.
//!
//! Wraps reqwest with the session cache and silent token refresh. When a
//! request comes back 401, the client refreshes the access token and retries
//! the original request exactly once. Concurrent 401s share a single
//! in-flight refresh call; everyone queues on the same future and retries
//! with its result.

mod session;

pub use session::{Session, UserProfile};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;
use url::Url;

/// Client-side errors. Cloneable so a failed refresh can be handed to every
/// request waiting on the shared refresh future.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(Arc<reqwest::Error>),
    /// The server answered with an error status.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("Not authenticated")]
    NotAuthenticated,
    #[error("Invalid URL: {0}")]
    Url(String),
    #[error("Session storage failed: {0}")]
    Storage(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(Arc::new(e))
    }
}

impl ClientError {
    /// The HTTP status, when the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, Result<String, ClientError>>>;

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<Session>,
    /// The in-flight refresh, if any. Holding the slot means every 401 in
    /// this window awaits the same server call.
    refresh_gate: Mutex<Option<RefreshFuture>>,
}

/// API client with silent refresh. Cheap to clone.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    user: UserProfile,
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    access_token: String,
}

/// Fields for creating a staff account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
}

/// Outcome of a signup: immediate session, or queued for admin approval.
#[derive(Debug)]
pub enum SignupOutcome {
    LoggedIn(UserProfile),
    Pending,
}

/// Fields for registering or updating a patient.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDraft {
    pub name: String,
    pub age: i64,
    pub sex: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp_number: Option<String>,
    pub place: String,
    pub department: String,
    pub doctor: String,
}

/// A patient as the server reports it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub uuid: String,
    pub name: String,
    pub age: i64,
    pub sex: String,
    pub phone_number: String,
    pub whatsapp_number: String,
    pub place: String,
    pub department: String,
    pub doctor: String,
    pub registered_by: String,
    pub registered_by_role: String,
    pub created_at: String,
}

/// One page of the patient listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientListPage {
    pub patients: Vec<PatientRecord>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_patients: i64,
    pub patients_per_page: u32,
}

/// Patient listing filters; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct PatientQuery {
    pub department: Option<String>,
    pub doctor: Option<String>,
    pub name: Option<String>,
    pub date: Option<String>,
    /// "asc" or "desc"
    pub sort: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ApiClient {
    pub fn new(base_url: Url, session: Arc<Session>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http: reqwest::Client::new(),
                base_url,
                session,
                refresh_gate: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.inner.session
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| ClientError::Url(e.to_string()))
    }

    /// Sign in and persist the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint("/api/auth/login")?)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let payload: SessionPayload = Self::parse(response).await?;
        self.store_session(payload)
    }

    /// Create an account. Depending on server policy this either signs in
    /// right away or leaves the account pending approval.
    pub async fn signup(&self, request: &SignupRequest) -> Result<SignupOutcome, ClientError> {
        let response = self
            .inner
            .http
            .post(self.endpoint("/api/auth/signup")?)
            .json(request)
            .send()
            .await?;
        let value: serde_json::Value = Self::parse(response).await?;

        if value.get("pending").and_then(|p| p.as_bool()) == Some(true) {
            return Ok(SignupOutcome::Pending);
        }

        let payload: SessionPayload = serde_json::from_value(value)
            .map_err(|e| ClientError::Storage(format!("Unexpected signup response: {e}")))?;
        Ok(SignupOutcome::LoggedIn(self.store_session(payload)?))
    }

    fn store_session(&self, payload: SessionPayload) -> Result<UserProfile, ClientError> {
        self.inner
            .session
            .store_login(
                payload.user.clone(),
                payload.access_token,
                payload.refresh_token,
            )
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        Ok(payload.user)
    }

    /// Sign out. Local state is cleared first so the user ends up signed out
    /// even when the server is unreachable; the revocation call is best
    /// effort.
    pub async fn logout(&self) {
        let access_token = self.inner.session.access_token();
        let refresh_token = self.inner.session.refresh_token();

        if let Err(e) = self.inner.session.clear() {
            warn!("Failed to clear session storage: {}", e);
        }
        *self.inner.refresh_gate.lock().await = None;

        let (Some(access_token), Some(refresh_token)) = (access_token, refresh_token) else {
            return;
        };
        let Ok(url) = self.endpoint("/api/auth/logout") else {
            return;
        };
        let result = self
            .inner
            .http
            .post(url)
            .bearer_auth(access_token)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!(status = %response.status(), "Server-side logout failed");
            }
            Ok(_) => {}
            Err(e) => warn!("Server-side logout failed: {}", e),
        }
    }

    /// Current account profile.
    pub async fn me(&self) -> Result<UserProfile, ClientError> {
        self.get_json(self.endpoint("/api/auth/me")?).await
    }

    /// Register a patient.
    pub async fn register_patient(&self, draft: &PatientDraft) -> Result<PatientRecord, ClientError> {
        self.request_json(Method::POST, self.endpoint("/api/patients")?, Some(draft))
            .await
    }

    /// List patients with filters and pagination.
    pub async fn list_patients(&self, query: &PatientQuery) -> Result<PatientListPage, ClientError> {
        let mut url = self.endpoint("/api/patients")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(department) = &query.department {
                pairs.append_pair("department", department);
            }
            if let Some(doctor) = &query.doctor {
                pairs.append_pair("doctor", doctor);
            }
            if let Some(name) = &query.name {
                pairs.append_pair("name", name);
            }
            if let Some(date) = &query.date {
                pairs.append_pair("date", date);
            }
            if let Some(sort) = &query.sort {
                pairs.append_pair("sort", sort);
            }
            if let Some(page) = query.page {
                pairs.append_pair("page", &page.to_string());
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        self.get_json(url).await
    }

    /// Update a patient's details.
    pub async fn update_patient(
        &self,
        uuid: &str,
        draft: &PatientDraft,
    ) -> Result<PatientRecord, ClientError> {
        self.request_json(
            Method::PUT,
            self.endpoint(&format!("/api/patients/{uuid}"))?,
            Some(draft),
        )
        .await
    }

    /// Delete a patient record.
    pub async fn delete_patient(&self, uuid: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .request_json::<serde_json::Value, ()>(
                Method::DELETE,
                self.endpoint(&format!("/api/patients/{uuid}"))?,
                None,
            )
            .await?;
        Ok(())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        self.request_json::<T, ()>(Method::GET, url, None).await
    }

    /// Send an authorized request, silently refreshing the access token when
    /// the server answers 401. The original request is retried exactly once;
    /// any other error status propagates untouched.
    async fn request_json<T, B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let token = match self.inner.session.access_token() {
            Some(token) => token,
            None => self.refresh_access_token().await?,
        };

        let response = self.send(method.clone(), url.clone(), body, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::parse(response).await;
        }

        // Another request may have finished refreshing while this one was in
        // flight; only call the server when the token we used is still the
        // current one.
        let token = match self.inner.session.access_token() {
            Some(current) if current != token => current,
            _ => self.refresh_access_token().await?,
        };
        let response = self.send(method, url, body, &token).await?;
        Self::parse(response).await
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        token: &str,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.inner.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Get a fresh access token, joining the in-flight refresh if one exists.
    async fn refresh_access_token(&self) -> Result<String, ClientError> {
        let future = {
            let mut gate = self.inner.refresh_gate.lock().await;
            match gate.as_ref() {
                Some(future) => future.clone(),
                None => {
                    let future = Self::run_refresh(self.inner.clone()).boxed().shared();
                    *gate = Some(future.clone());
                    future
                }
            }
        };
        future.await
    }

    /// The single-flight body: calls the refresh endpoint, then releases the
    /// gate so the next expiry starts a fresh call.
    async fn run_refresh(inner: Arc<ClientInner>) -> Result<String, ClientError> {
        let result = Self::refresh_once(&inner).await;
        *inner.refresh_gate.lock().await = None;
        result
    }

    async fn refresh_once(inner: &Arc<ClientInner>) -> Result<String, ClientError> {
        let refresh_token = inner
            .session
            .refresh_token()
            .ok_or(ClientError::NotAuthenticated)?;

        let url = inner
            .base_url
            .join("/api/auth/refresh")
            .map_err(|e| ClientError::Url(e.to_string()))?;
        let response = inner
            .http
            .post(url)
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let payload: RefreshPayload = response.json().await?;
            inner.session.set_access_token(payload.access_token.clone());
            return Ok(payload.access_token);
        }

        let error = Self::api_error(status, response).await;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            // The session is dead server-side; force a local sign-out
            if let Err(e) = inner.session.clear() {
                warn!("Failed to clear session storage: {}", e);
            }
        }
        Err(error)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(Self::api_error(status, response).await)
        }
    }

    async fn api_error(status: StatusCode, response: reqwest::Response) -> ClientError {
        #[derive(Deserialize)]
        struct ErrorBody {
            error: String,
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.error,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        };
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

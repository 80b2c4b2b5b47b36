#![allow(dead_code)]

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use frontdesk::client::{ApiClient, Session};
use frontdesk::db::{Database, NewUser, UserStatus};
use frontdesk::jwt::{AccessClaims, TokenType};
use frontdesk::{ServerConfig, create_app};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789012345";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789012345";
pub const PASSWORD: &str = "correct horse battery staple";

pub struct TestContext {
    pub base_url: Url,
    pub db: Database,
    /// How many times POST /api/auth/refresh reached the server.
    pub refresh_calls: Arc<AtomicUsize>,
    session_root: tempfile::TempDir,
    server_handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

impl TestContext {
    /// Kill the server mid-test, for exercising unreachable-server paths.
    pub fn stop_server(&self) {
        self.server_handle.abort();
    }
}

/// Counts refresh endpoint hits so tests can assert on single-flight
/// behavior.
async fn count_refresh_calls(
    State(counter): State<Arc<AtomicUsize>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() == axum::http::Method::POST
        && request.uri().path() == "/api/auth/refresh"
    {
        counter.fetch_add(1, Ordering::SeqCst);
    }
    next.run(request).await
}

/// Start a server on a random port with an in-memory database.
pub async fn setup() -> TestContext {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");

    let config = ServerConfig {
        db: db.clone(),
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
    };

    let refresh_calls = Arc::new(AtomicUsize::new(0));
    let app = create_app(&config).layer(axum::middleware::from_fn_with_state(
        refresh_calls.clone(),
        count_refresh_calls,
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    TestContext {
        base_url: Url::parse(&format!("http://127.0.0.1:{}/", addr.port())).expect("Invalid URL"),
        db,
        refresh_calls,
        session_root: tempfile::tempdir().expect("Failed to create temp dir"),
        server_handle,
    }
}

impl TestContext {
    /// Create an API client with its own session directory.
    pub fn new_client(&self) -> ApiClient {
        let dir = self
            .session_root
            .path()
            .join(uuid::Uuid::new_v4().to_string());
        let session = Session::load(dir).expect("Failed to load session");
        ApiClient::new(self.base_url.clone(), Arc::new(session))
    }

    /// Create a client whose session lives in the given directory, so tests
    /// can simulate an app restart by reusing the directory.
    pub fn client_with_dir(&self, dir: &std::path::Path) -> ApiClient {
        let session = Session::load(dir).expect("Failed to load session");
        ApiClient::new(self.base_url.clone(), Arc::new(session))
    }

    pub fn session_root(&self) -> &std::path::Path {
        self.session_root.path()
    }

    /// Seed a user directly in the database. Returns the user's UUID.
    pub async fn seed_user(&self, email: &str, role: &str, status: UserStatus) -> String {
        let uuid = uuid::Uuid::new_v4().to_string();
        let password_hash =
            frontdesk::password::hash_password(PASSWORD).expect("Failed to hash password");
        self.db
            .users()
            .create(&NewUser {
                uuid: &uuid,
                name: "Test User",
                email,
                password_hash: &password_hash,
                role,
                status,
                phone_number: None,
                department: None,
            })
            .await
            .expect("Failed to seed user");
        uuid
    }

    pub async fn seed_admin(&self, email: &str) -> String {
        self.seed_user(email, "admin", UserStatus::Active).await
    }

    fn endpoint(&self, path: &str) -> Url {
        self.base_url.join(path).expect("Invalid URL")
    }

    /// Log in over raw HTTP. Returns (access token, refresh token).
    pub async fn login_raw(&self, email: &str) -> (String, String) {
        let response = reqwest::Client::new()
            .post(self.endpoint("/api/auth/login"))
            .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .expect("Login request failed");
        assert_eq!(response.status(), 200, "Login should succeed");
        let body: serde_json::Value = response.json().await.expect("Invalid login response");
        (
            body["accessToken"].as_str().expect("No access token").to_string(),
            body["refreshToken"]
                .as_str()
                .expect("No refresh token")
                .to_string(),
        )
    }

    /// GET a path with a bearer token, returning (status, body).
    pub async fn get_authed(&self, path: &str, token: &str) -> (u16, serde_json::Value) {
        let response = reqwest::Client::new()
            .get(self.endpoint(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Request failed");
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    /// POST a JSON body, optionally with a bearer token. Returns (status, body).
    pub async fn post_json(
        &self,
        path: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> (u16, serde_json::Value) {
        let mut request = reqwest::Client::new().post(self.endpoint(path)).json(&body);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.expect("Request failed");
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    /// Send a request with any method, optionally with a token and body.
    pub async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (u16, serde_json::Value) {
        let mut request = reqwest::Client::new().request(method, self.endpoint(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("Request failed");
        let status = response.status().as_u16();
        let body = response.json().await.unwrap_or(serde_json::Value::Null);
        (status, body)
    }
}

/// Craft an access token that expired in the past, signed with the test
/// access secret. Exercises the client's silent-refresh path without
/// waiting out a real expiry.
pub fn expired_access_token(user_uuid: &str) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Clock before epoch")
        .as_secs();
    let claims = AccessClaims {
        sub: user_uuid.to_string(),
        token_type: TokenType::Access,
        iat: now - 1000,
        exp: now - 500,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(ACCESS_SECRET),
    )
    .expect("Failed to encode token")
}

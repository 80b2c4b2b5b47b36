//! Tests for the client session cache and silent-refresh interceptor.

mod common;

use common::{PASSWORD, expired_access_token, setup};
use frontdesk::client::{ClientError, SignupOutcome, SignupRequest};
use frontdesk::db::{FLAG_MANUAL_APPROVAL, KEY_SIGNUP_FLAGS, UserStatus};
use std::sync::atomic::Ordering;

fn signup_request(email: &str) -> SignupRequest {
    SignupRequest {
        name: "Test User".to_string(),
        email: email.to_string(),
        password: PASSWORD.to_string(),
        role: "doctor".to_string(),
        phone_number: None,
        department: Some("General".to_string()),
    }
}

#[tokio::test]
async fn test_login_populates_session() {
    let ctx = setup().await;
    ctx.seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let client = ctx.new_client();

    assert!(!client.is_authenticated());
    let profile = client.login("doc@clinic.test", PASSWORD).await.unwrap();
    assert_eq!(profile.email, "doc@clinic.test");
    assert!(client.is_authenticated());
    assert_eq!(
        client.session().user().unwrap().email,
        "doc@clinic.test"
    );
    assert!(client.session().access_token().is_some());
}

#[tokio::test]
async fn test_login_failure_leaves_session_signed_out() {
    let ctx = setup().await;
    ctx.seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let client = ctx.new_client();

    let err = client.login("doc@clinic.test", "wrong password").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_signup_logs_in_immediately() {
    let ctx = setup().await;
    let client = ctx.new_client();

    let outcome = client
        .signup(&signup_request("doc@clinic.test"))
        .await
        .unwrap();
    let SignupOutcome::LoggedIn(profile) = outcome else {
        panic!("Open signup should log in right away");
    };
    assert_eq!(profile.email, "doc@clinic.test");
    assert!(client.is_authenticated());

    // The stored tokens work for authenticated calls
    let me = client.me().await.unwrap();
    assert_eq!(me.email, "doc@clinic.test");
}

#[tokio::test]
async fn test_signup_under_manual_approval_is_pending() {
    let ctx = setup().await;
    ctx.db
        .settings()
        .add(KEY_SIGNUP_FLAGS, FLAG_MANUAL_APPROVAL)
        .await
        .unwrap();
    let client = ctx.new_client();

    let outcome = client
        .signup(&signup_request("doc@clinic.test"))
        .await
        .unwrap();
    assert!(matches!(outcome, SignupOutcome::Pending));

    // No tokens were issued; the client stays signed out
    assert!(!client.is_authenticated());
    assert!(client.session().user().is_none());
}

#[tokio::test]
async fn test_expired_access_token_triggers_one_silent_refresh() {
    let ctx = setup().await;
    let uuid = ctx
        .seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let client = ctx.new_client();
    client.login("doc@clinic.test", PASSWORD).await.unwrap();

    // Simulate expiry without waiting 15 minutes
    client.session().set_access_token(expired_access_token(&uuid));
    ctx.refresh_calls.store(0, Ordering::SeqCst);

    let profile = client.me().await.unwrap();
    assert_eq!(profile.email, "doc@clinic.test");
    assert_eq!(ctx.refresh_calls.load(Ordering::SeqCst), 1);

    // The refreshed token keeps working without further refreshes
    client.me().await.unwrap();
    assert_eq!(ctx.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_refresh() {
    let ctx = setup().await;
    let uuid = ctx
        .seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let client = ctx.new_client();
    client.login("doc@clinic.test", PASSWORD).await.unwrap();

    client.session().set_access_token(expired_access_token(&uuid));
    ctx.refresh_calls.store(0, Ordering::SeqCst);

    // A burst of requests against an expired token coalesces on one refresh
    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.me().await }));
    }
    for handle in handles {
        let profile = handle.await.unwrap().unwrap();
        assert_eq!(profile.email, "doc@clinic.test");
    }

    assert_eq!(ctx.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_revoked_session_fails_and_clears_local_state() {
    let ctx = setup().await;
    let uuid = ctx
        .seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let dir = ctx.session_root().join("revoked-session");
    let client = ctx.client_with_dir(&dir);
    client.login("doc@clinic.test", PASSWORD).await.unwrap();

    // Revoke everything server-side, then force the client to refresh
    let user = ctx.db.users().get_by_uuid(&uuid).await.unwrap().unwrap();
    ctx.db.tokens().delete_all_by_user(user.id).await.unwrap();
    client.session().set_access_token(expired_access_token(&uuid));

    let err = client.me().await.unwrap_err();
    assert_eq!(err.status(), Some(403));

    // The dead session is wiped locally, durably too
    assert!(!client.is_authenticated());
    let reloaded = ctx.client_with_dir(&dir);
    assert!(!reloaded.is_authenticated());
}

#[tokio::test]
async fn test_concurrent_requests_all_fail_when_refresh_is_revoked() {
    let ctx = setup().await;
    let uuid = ctx
        .seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let dir = ctx.session_root().join("revoked-burst");
    let client = ctx.client_with_dir(&dir);
    client.login("doc@clinic.test", PASSWORD).await.unwrap();

    let user = ctx.db.users().get_by_uuid(&uuid).await.unwrap().unwrap();
    ctx.db.tokens().delete_all_by_user(user.id).await.unwrap();
    client.session().set_access_token(expired_access_token(&uuid));
    ctx.refresh_calls.store(0, Ordering::SeqCst);

    // A burst against a revoked session: the single refresh fails and
    // every waiting request is rejected with it
    let mut handles = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        handles.push(tokio::spawn(async move { client.me().await }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(
            err.status() == Some(403) || matches!(err, ClientError::NotAuthenticated),
            "Unexpected error: {err:?}"
        );
    }

    assert_eq!(ctx.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(!client.is_authenticated());
    assert!(client.session().user().is_none());

    // The sign-out is durable too
    let reloaded = ctx.client_with_dir(&dir);
    assert!(!reloaded.is_authenticated());
}

#[tokio::test]
async fn test_session_survives_restart_via_refresh() {
    let ctx = setup().await;
    ctx.seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let dir = ctx.session_root().join("restart-session");

    let client = ctx.client_with_dir(&dir);
    client.login("doc@clinic.test", PASSWORD).await.unwrap();
    drop(client);

    // A fresh process: refresh token on disk, no access token in memory
    let client = ctx.client_with_dir(&dir);
    assert!(client.is_authenticated());
    assert!(client.session().access_token().is_none());
    ctx.refresh_calls.store(0, Ordering::SeqCst);

    let profile = client.me().await.unwrap();
    assert_eq!(profile.email, "doc@clinic.test");
    assert_eq!(ctx.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_401_errors_propagate_without_refresh() {
    let ctx = setup().await;
    ctx.seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let client = ctx.new_client();
    client.login("doc@clinic.test", PASSWORD).await.unwrap();
    ctx.refresh_calls.store(0, Ordering::SeqCst);

    // 400 from the server is not an auth problem; no refresh happens
    let err = client.delete_patient("not-a-uuid").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(ctx.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_requests_without_session_fail_fast() {
    let ctx = setup().await;
    let client = ctx.new_client();

    let err = client.me().await.unwrap_err();
    assert!(matches!(err, ClientError::NotAuthenticated));
}

#[tokio::test]
async fn test_logout_revokes_and_clears() {
    let ctx = setup().await;
    ctx.seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let client = ctx.new_client();
    client.login("doc@clinic.test", PASSWORD).await.unwrap();
    let refresh_token = client.session().refresh_token().unwrap();

    client.logout().await;
    assert!(!client.is_authenticated());

    // The refresh token is dead server-side too
    let (status, _) = ctx
        .post_json(
            "/api/auth/refresh",
            None,
            serde_json::json!({ "refreshToken": refresh_token }),
        )
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn test_logout_clears_local_state_when_server_is_down() {
    let ctx = setup().await;
    ctx.seed_user("doc@clinic.test", "doctor", UserStatus::Active)
        .await;
    let client = ctx.new_client();
    client.login("doc@clinic.test", PASSWORD).await.unwrap();

    ctx.stop_server();
    client.logout().await;
    assert!(!client.is_authenticated());
    assert!(client.session().user().is_none());
}

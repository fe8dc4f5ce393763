//! Integration test: build the router over the in-memory store and drive the
//! credential lifecycle through HTTP.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use credo_api::config::ApiConfig;
use credo_api::{AppState, router};
use credo_core::{AuthLifecycle, UserDirectory};
use credo_core::auth::jwt::JwtTokenIssuer;
use credo_core::auth::password::{BcryptHasher, PasswordHashing};
use credo_core::clock::SystemClock;
use credo_core::config::AuthPolicy;
use credo_core::events::{ChannelPublisher, ForgotPasswordEvent, PublishedEvent};
use credo_core::ids::new_id;
use credo_core::models::auth::User;
use credo_core::models::role::Role;
use credo_core::store::{CredentialStore, MemoryCredentialStore};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

const SECRET: &str = "integration-test-secret";

struct TestApp {
    app: Router,
    store: Arc<MemoryCredentialStore>,
    events: mpsc::Receiver<PublishedEvent>,
}

fn test_app() -> TestApp {
    let policy = AuthPolicy {
        bcrypt_cost: 4,
        ..AuthPolicy::default()
    };
    let store = Arc::new(MemoryCredentialStore::new());
    let (publisher, events) = ChannelPublisher::new(16);
    let auth = AuthLifecycle::new(
        store.clone(),
        Arc::new(BcryptHasher::new(policy.bcrypt_cost)),
        Arc::new(JwtTokenIssuer::new(SECRET.as_bytes(), policy.access_token_ttl)),
        Arc::new(publisher),
        Arc::new(SystemClock),
        policy.clone(),
    );
    let users = UserDirectory::new(
        store.clone(),
        Arc::new(BcryptHasher::new(policy.bcrypt_cost)),
        Arc::new(SystemClock),
    );
    let state = AppState {
        auth: Arc::new(auth),
        users: Arc::new(users),
        config: ApiConfig {
            bind_addr: "127.0.0.1:0".into(),
            database_url: "postgres://unused".into(),
            jwt_secret: SECRET.into(),
            policy,
        },
    };
    TestApp {
        app: router(state),
        store,
        events,
    }
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    (status, json)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    call(app, "POST", uri, Some(body), None).await
}

async fn register_ann(app: &Router) {
    let (status, body) = post(
        app,
        "/auth/register",
        json!({
            "name": "Ann",
            "email": "ann@x.com",
            "password": "pw123456",
            "passwordConfirmation": "pw123456"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register: {body}");
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Value) {
    post(app, "/auth/login", json!({ "email": email, "password": password })).await
}

#[tokio::test]
async fn register_login_refresh_logout_over_http() {
    let t = test_app();
    register_ann(&t.app).await;

    let (status, first) = login(&t.app, "ann@x.com", "pw123456").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["tokenType"], "Bearer");
    assert_eq!(first["expiresIn"], 900);
    let first_refresh = first["refreshToken"].as_str().unwrap().to_string();

    let (status, second) = post(&t.app, "/auth/refresh", json!({ "refreshToken": first_refresh })).await;
    assert_eq!(status, StatusCode::OK);
    let second_refresh = second["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(second_refresh, first_refresh);

    let (status, body) = post(&t.app, "/auth/refresh", json!({ "refreshToken": first_refresh })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");

    let (status, _) = post(&t.app, "/auth/logout", json!({ "refreshToken": second_refresh })).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&t.app, "/auth/refresh", json!({ "refreshToken": second_refresh })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn registration_validation_and_conflicts() {
    let t = test_app();

    let (status, body) = post(
        &t.app,
        "/auth/register",
        json!({ "name": "Ann", "email": "ann@x.com", "password": "short", "passwordConfirmation": "short" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = post(
        &t.app,
        "/auth/register",
        json!({ "name": "Ann", "password": "pw123456", "passwordConfirmation": "pw123456" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = post(
        &t.app,
        "/auth/register",
        json!({ "name": "Ann", "email": "ann@x.com", "password": "pw123456", "passwordConfirmation": "pw654321" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    register_ann(&t.app).await;
    let (status, body) = post(
        &t.app,
        "/auth/register",
        json!({ "name": "Imposter", "email": "ann@x.com", "password": "other999", "passwordConfirmation": "other999" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_exists");
    assert_eq!(t.store.user_count(), 1);
}

#[tokio::test]
async fn login_failures_share_one_response() {
    let t = test_app();
    register_ann(&t.app).await;

    let wrong_password = login(&t.app, "ann@x.com", "not-the-one").await;
    let unknown_email = login(&t.app, "bob@x.com", "pw123456").await;

    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
    assert_eq!(wrong_password.1["error"], "invalid_credentials");
}

#[tokio::test]
async fn forgot_password_does_not_reveal_registration() {
    let mut t = test_app();
    register_ann(&t.app).await;

    let unknown = post(&t.app, "/auth/forgot-password", json!({ "email": "bob@x.com" })).await;
    assert!(t.events.try_recv().is_err());
    assert_eq!(t.store.password_reset_count(), 0);

    let known = post(&t.app, "/auth/forgot-password", json!({ "email": "ann@x.com" })).await;
    assert_eq!(known.0, StatusCode::OK);
    assert_eq!(known, unknown);
    assert_eq!(t.store.password_reset_count(), 1);
    assert!(t.events.try_recv().is_ok());
}

#[tokio::test]
async fn password_reset_over_http() {
    let mut t = test_app();
    register_ann(&t.app).await;
    let (_, session) = login(&t.app, "ann@x.com", "pw123456").await;

    post(&t.app, "/auth/forgot-password", json!({ "email": "ann@x.com" })).await;
    let event: ForgotPasswordEvent = t.events.recv().await.unwrap().decode().unwrap();

    let (status, body) = post(
        &t.app,
        "/auth/reset-password",
        json!({ "token": event.token, "newPassword": "tiny" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = post(
        &t.app,
        "/auth/reset-password",
        json!({ "token": event.token, "newPassword": "newpass99" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(
        &t.app,
        "/auth/reset-password",
        json!({ "token": event.token, "newPassword": "again9999" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "reset_already_used");

    let (status, _) = post(&t.app, "/auth/refresh", json!({ "refreshToken": session["refreshToken"] })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(login(&t.app, "ann@x.com", "pw123456").await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(login(&t.app, "ann@x.com", "newpass99").await.0, StatusCode::OK);

    let (status, body) = post(
        &t.app,
        "/auth/reset-password",
        json!({ "token": "never-issued", "newPassword": "newpass99" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "invalid_token");
}

#[tokio::test]
async fn me_requires_a_valid_bearer_token() {
    let t = test_app();
    register_ann(&t.app).await;

    let (status, _) = call(&t.app, "GET", "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&t.app, "GET", "/auth/me", None, Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, tokens) = login(&t.app, "ann@x.com", "pw123456").await;
    let access = tokens["accessToken"].as_str().unwrap();
    let (status, profile) = call(&t.app, "GET", "/auth/me", None, Some(access)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], "ann@x.com");
    assert_eq!(profile["name"], "Ann");
    assert_eq!(profile["role"], "user");
    assert!(profile.get("passwordHash").is_none());
}

#[tokio::test]
async fn me_for_deleted_user_is_not_found() {
    let t = test_app();
    register_ann(&t.app).await;
    let (_, tokens) = login(&t.app, "ann@x.com", "pw123456").await;
    let access = tokens["accessToken"].as_str().unwrap();

    let user = t.store.find_user_by_email("ann@x.com").await.unwrap().unwrap();
    assert!(t.store.delete_user(&user.id).await.unwrap());

    let (status, body) = call(&t.app, "GET", "/auth/me", None, Some(access)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

/// Insert an administrator directly and return its access token.
async fn admin_token(t: &TestApp) -> String {
    let hash = BcryptHasher::new(4).hash("rootpass1").unwrap();
    let now = Utc::now();
    t.store
        .create_user(&User {
            id: new_id(),
            name: "Root".into(),
            email: "root@x.com".into(),
            password_hash: hash,
            role_id: Role::Admin.id().into(),
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
    let (_, tokens) = login(&t.app, "root@x.com", "rootpass1").await;
    tokens["accessToken"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn user_management_is_admin_only() {
    let t = test_app();
    register_ann(&t.app).await;
    let (_, user_tokens) = login(&t.app, "ann@x.com", "pw123456").await;
    let user_access = user_tokens["accessToken"].as_str();

    let (status, body) = call(&t.app, "GET", "/users", None, user_access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let ann_id = t.store.find_user_by_email("ann@x.com").await.unwrap().unwrap().id;
    let (status, _) = call(&t.app, "GET", &format!("/users/{ann_id}"), None, user_access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(&t.app, "GET", "/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = admin_token(&t).await;
    let (status, body) = call(&t.app, "GET", "/users", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["limit"], 10);
    assert_eq!(body["pagination"]["offset"], 0);
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["users"][0]["email"], "ann@x.com");
    assert!(body["users"][0].get("passwordHash").is_none());

    let (status, body) = call(&t.app, "GET", "/users?limit=1&offset=1", None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["users"].as_array().unwrap().len(), 1);
    assert_eq!(body["users"][0]["email"], "root@x.com");

    let (status, body) = call(&t.app, "GET", &format!("/users/{ann_id}"), None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], ann_id.as_str());
    assert_eq!(body["role"], "user");

    let (status, body) = call(
        &t.app,
        "GET",
        &format!("/users/{}", new_id()),
        None,
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn admin_creates_updates_and_deletes_users() {
    let t = test_app();
    let admin = admin_token(&t).await;

    let (status, created) = call(
        &t.app,
        "POST",
        "/users",
        Some(json!({
            "name": "Bob",
            "email": "bob@x.com",
            "password": "bobpass12",
            "role": "admin"
        })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create: {created}");
    assert_eq!(created["role"], "admin");
    let bob_id = created["id"].as_str().unwrap().to_string();

    let (status, _) = login(&t.app, "bob@x.com", "bobpass12").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &t.app,
        "POST",
        "/users",
        Some(json!({ "name": "Eve", "email": "eve@x.com", "password": "evepass12", "role": "root" })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, body) = call(
        &t.app,
        "POST",
        "/users",
        Some(json!({ "name": "Bob", "email": "bob@x.com", "password": "bobpass12" })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_exists");

    let uri = format!("/users/{bob_id}");
    let (status, updated) = call(
        &t.app,
        "PATCH",
        &uri,
        Some(json!({ "name": "Robert", "role": "user" })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Robert");
    assert_eq!(updated["email"], "bob@x.com");
    assert_eq!(updated["role"], "user");

    let (status, _) = call(
        &t.app,
        "PATCH",
        &uri,
        Some(json!({ "email": "root@x.com" })),
        Some(&admin),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, bob_tokens) = login(&t.app, "bob@x.com", "bobpass12").await;
    let (status, _) = call(&t.app, "DELETE", &uri, None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&t.app, "DELETE", &uri, None, Some(&admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &t.app,
        "/auth/refresh",
        json!({ "refreshToken": bob_tokens["refreshToken"] }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&t.app, "bob@x.com", "bobpass12").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

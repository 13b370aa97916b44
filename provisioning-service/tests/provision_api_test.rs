//! Router-level tests for the provisioning API, driven through the axum
//! router with mock identity and directory collaborators.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

use provisioning_service::config::{
    DirectoryStoreConfig, Environment, IdentityProviderConfig, OperatorConfig, ProvisioningConfig,
    SecurityConfig, SwaggerConfig, SwaggerMode,
};
use provisioning_service::models::{new_session_slot, AdminSession, IdentityId, Role, SessionSlot};
use provisioning_service::services::{
    MockDirectoryStore, MockIdentityProvider, ProvisioningService, RoleCatalog, SessionGuard,
};
use provisioning_service::{build_router, AppState};

const ADMIN_KEY: &str = "test-admin-key";
const OPERATOR_ACCESS: &str = "op-access";

struct TestApp {
    router: Router,
    slot: SessionSlot,
    identity: Arc<MockIdentityProvider>,
    directory: Arc<MockDirectoryStore>,
}

fn test_config() -> ProvisioningConfig {
    ProvisioningConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Prod,
        service_name: "provisioning-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        identity: IdentityProviderConfig {
            base_url: "http://identity.local".to_string(),
            api_key: "anon".to_string(),
            request_timeout_seconds: 5,
        },
        directory: DirectoryStoreConfig {
            base_url: "http://directory.local".to_string(),
            request_timeout_seconds: 5,
        },
        operator: OperatorConfig {
            email: "admin@x.com".to_string(),
            password: "password123".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            admin_api_key: ADMIN_KEY.to_string(),
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

fn roles() -> Vec<Role> {
    vec![
        Role {
            id: 1,
            name: "Admin".to_string(),
        },
        Role {
            id: 2,
            name: "Editor".to_string(),
        },
    ]
}

async fn test_app() -> TestApp {
    let slot = new_session_slot();
    let operator = AdminSession {
        access_token: OPERATOR_ACCESS.to_string(),
        refresh_token: "op-refresh".to_string(),
        identity_id: IdentityId::new(),
        expires_at: Utc::now() + Duration::hours(1),
    };
    *slot.write().await = Some(operator.clone());

    let identity = Arc::new(MockIdentityProvider::new(slot.clone(), operator));
    let directory = Arc::new(MockDirectoryStore::new(
        slot.clone(),
        OPERATOR_ACCESS,
        roles(),
    ));
    let catalog = RoleCatalog::from_roles(roles());
    let guard = SessionGuard::new(slot.clone(), identity.clone());
    let provisioning = Arc::new(ProvisioningService::new(
        identity.clone(),
        directory.clone(),
        guard,
        catalog.clone(),
    ));

    let state = AppState {
        config: test_config(),
        provisioning,
        catalog,
        session: slot.clone(),
    };

    TestApp {
        router: build_router(state),
        slot,
        identity,
        directory,
    }
}

fn provision_request(body: serde_json::Value, admin_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/admin/provision")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = admin_key {
        builder = builder.header("X-Admin-Api-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn valid_body() -> serde_json::Value {
    serde_json::json!({
        "given_name": "Jane",
        "family_name": "Doe",
        "email": "jane@x.com",
        "password": "Secret123!",
        "role_id": 2
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_provision_requires_admin_key() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(provision_request(valid_body(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provision_rejects_wrong_admin_key() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(provision_request(valid_body(), Some("wrong-key")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_provision_rejects_malformed_email() {
    let app = test_app().await;
    let mut body = valid_body();
    body["email"] = serde_json::json!("not-an-email");

    let response = app
        .router
        .oneshot(provision_request(body, Some(ADMIN_KEY)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_provision_rejects_unparseable_body() {
    let app = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/admin/provision")
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Admin-Api-Key", ADMIN_KEY)
        .body(Body::from("{not json"))
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_provision_happy_path_returns_created_record() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(provision_request(valid_body(), Some(ADMIN_KEY)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["record"]["email"], "jane@x.com");
    assert_eq!(json["record"]["role_id"], 2);

    assert_eq!(app.directory.records().len(), 1);
    let ambient = app.slot.read().await.clone().unwrap();
    assert_eq!(ambient.access_token, OPERATOR_ACCESS);
}

#[tokio::test]
async fn test_provision_duplicate_email_returns_conflict() {
    let app = test_app().await;

    let first = app
        .router
        .clone()
        .oneshot(provision_request(valid_body(), Some(ADMIN_KEY)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .router
        .oneshot(provision_request(valid_body(), Some(ADMIN_KEY)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(app.directory.records().len(), 1);
}

#[tokio::test]
async fn test_provision_unknown_role_is_bad_request() {
    let app = test_app().await;
    let mut body = valid_body();
    body["role_id"] = serde_json::json!(999);

    let response = app
        .router
        .oneshot(provision_request(body, Some(ADMIN_KEY)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_orphan_outcome_has_distinct_payload() {
    let app = test_app().await;
    app.identity.reject_refresh();

    let response = app
        .router
        .oneshot(provision_request(valid_body(), Some(ADMIN_KEY)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["status"], "orphaned");
    assert!(json["identity_id"].is_string());
    assert!(json["reason"]
        .as_str()
        .unwrap()
        .contains("session could not be restored"));
}

#[tokio::test]
async fn test_orphan_retry_endpoint_completes_the_account() {
    let app = test_app().await;
    app.directory.fail_next_insert(
        provisioning_service::services::DirectoryError::Transient("directory down".to_string()),
    );

    let response = app
        .router
        .clone()
        .oneshot(provision_request(valid_body(), Some(ADMIN_KEY)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    let identity_id = json["identity_id"].as_str().unwrap().to_string();

    let retry_body = serde_json::json!({
        "given_name": "Jane",
        "family_name": "Doe",
        "email": "jane@x.com",
        "role_id": 2
    });
    let retry = Request::builder()
        .method("POST")
        .uri(format!("/admin/provision/{}/directory", identity_id))
        .header(header::CONTENT_TYPE, "application/json")
        .header("X-Admin-Api-Key", ADMIN_KEY)
        .body(Body::from(retry_body.to_string()))
        .unwrap();

    let response = app.router.oneshot(retry).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "completed");
    assert_eq!(json["record"]["identity_id"], identity_id.as_str());
    assert_eq!(app.directory.records().len(), 1);
}

#[tokio::test]
async fn test_roles_endpoint_lists_catalog() {
    let app = test_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/admin/roles")
        .header("X-Admin-Api-Key", ADMIN_KEY)
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["roles"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_health_reports_unavailable_without_session() {
    let app = test_app().await;
    *app.slot.write().await = None;

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_reports_healthy_with_session() {
    let app = test_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["checks"]["operator_session"], "up");
    assert_eq!(json["checks"]["role_catalog"], "loaded");
}

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ProvisioningConfig;
use crate::models::SessionSlot;
use crate::services::{ProvisioningService, RoleCatalog};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::provisioning::provision_account,
        handlers::provisioning::complete_orphan,
        handlers::provisioning::list_roles,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::provisioning::ProvisionAccountRequest,
            dtos::provisioning::CompleteOrphanRequest,
            dtos::provisioning::ProvisionAccountResponse,
            dtos::provisioning::OrphanAccountResponse,
            dtos::provisioning::RolesResponse,
            models::DirectoryRecord,
            models::Role,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Provisioning", description = "Administrator-mediated account provisioning"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("x-admin-api-key"))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: ProvisioningConfig,
    pub provisioning: Arc<ProvisioningService>,
    pub catalog: RoleCatalog,
    pub session: SessionSlot,
}

pub fn build_router(state: AppState) -> Router {
    // Admin routes, all behind the admin API key
    let admin_routes = Router::new()
        .route("/admin/provision", post(handlers::provision_account))
        .route(
            "/admin/provision/:identity_id/directory",
            post(handlers::complete_orphan),
        )
        .route("/admin/roles", get(handlers::list_roles))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    let mut app = Router::new().route("/health", get(health_check));

    // Only add Swagger UI if enabled in config
    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => match state.config.swagger.enabled {
            config::SwaggerMode::Public | config::SwaggerMode::Authenticated => true,
            config::SwaggerMode::Disabled => false,
        },
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        // Still provide the OpenAPI JSON for programmatic access
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    app.merge(admin_routes)
        .with_state(state.clone())
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(&REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static(middleware::admin::ADMIN_KEY_HEADER),
                ]),
        )
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    // Without an ambient operator session no provisioning can run.
    if state.session.read().await.is_none() {
        tracing::error!("Health check failed: no ambient operator session");
        return Err(AppError::ServiceUnavailable);
    }

    let catalog_state = if state.catalog.is_empty().await {
        "empty"
    } else {
        "loaded"
    };

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "operator_session": "up",
            "role_catalog": catalog_state
        }
    })))
}

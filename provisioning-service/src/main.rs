use provisioning_service::{
    build_router,
    config::ProvisioningConfig,
    models::new_session_slot,
    services::{
        HttpDirectoryStore, HttpIdentityProvider, IdentityProvider, ProvisioningService,
        RoleCatalog, SessionGuard,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = ProvisioningConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting provisioning service"
    );

    // One slot holds the process-wide ambient session; the identity client
    // and the session guard are the only writers.
    let session = new_session_slot();

    let identity_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.identity.request_timeout_seconds))
        .build()
        .map_err(|e| service_core::error::AppError::ConfigError(anyhow::anyhow!(e)))?;
    let identity = Arc::new(HttpIdentityProvider::new(
        identity_http,
        &config.identity.base_url,
        &config.identity.api_key,
        session.clone(),
    ));

    let directory_http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.directory.request_timeout_seconds))
        .build()
        .map_err(|e| service_core::error::AppError::ConfigError(anyhow::anyhow!(e)))?;
    let directory = Arc::new(HttpDirectoryStore::new(
        directory_http,
        &config.directory.base_url,
        session.clone(),
    ));

    // Establish the operator's ambient session before accepting requests.
    identity
        .sign_in(&config.operator.email, &config.operator.password)
        .await
        .map_err(|e| {
            service_core::error::AppError::ConfigError(anyhow::anyhow!(
                "Operator sign-in failed: {}",
                e
            ))
        })?;
    tracing::info!("Operator session established");

    let catalog = RoleCatalog::new();
    match catalog.load(directory.as_ref()).await {
        Ok(count) => tracing::info!(count, "Role catalog ready"),
        Err(e) => tracing::warn!(error = %e, "Role catalog unavailable at startup"),
    }

    let guard = SessionGuard::new(session.clone(), identity.clone());
    let provisioning = Arc::new(ProvisioningService::new(
        identity,
        directory,
        guard,
        catalog.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        provisioning,
        catalog,
        session,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    // In-flight provisioning runs complete in their own tasks; give the
    // server a moment to drain connections.
    tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
}

use axum::{middleware::from_fn, routing::get, Router};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::config::{BillingConfig, IdentityConfig, IdentityKind, StorageBackend, StorageConfig};
use crate::gateway::{AuthGate, CorsSettings, Gateway, InvoiceOperations, RouteTable};
use crate::handlers;
use crate::services::{
    AlegraClient, IdentityProvider, InMemoryInvoiceStore, IntrospectionIdentityProvider,
    JwtIdentityProvider, MirroredInvoiceStore, MongoInvoiceStore,
};
use crate::AppState;

pub fn build_identity_provider(config: &IdentityConfig) -> Result<Arc<dyn IdentityProvider>, AppError> {
    match config.kind {
        IdentityKind::Jwt => {
            let jwt = config.jwt.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("identity.jwt section is required"))
            })?;
            let provider = JwtIdentityProvider::new(jwt).map_err(AppError::ConfigError)?;
            Ok(Arc::new(provider))
        }
        IdentityKind::Introspection => {
            let introspection = config.introspection.as_ref().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("identity.introspection section is required"))
            })?;
            let provider =
                IntrospectionIdentityProvider::new(introspection).map_err(AppError::ConfigError)?;
            Ok(Arc::new(provider))
        }
    }
}

/// The invoice store, plus the MongoDB handle when that is the backend.
///
/// With an `alegra` section the store is wrapped in the Alegra mirror.
pub async fn build_invoice_store(
    config: &StorageConfig,
) -> Result<(Arc<dyn InvoiceOperations>, Option<MongoInvoiceStore>), AppError> {
    let (primary, database): (Arc<dyn InvoiceOperations>, Option<MongoInvoiceStore>) =
        match config.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory invoice store; invoices are lost on restart");
                let store: Arc<dyn InvoiceOperations> = Arc::new(InMemoryInvoiceStore::new());
                (store, None)
            }
            StorageBackend::Mongodb => {
                let uri = config.uri.as_ref().ok_or_else(|| {
                    AppError::ConfigError(anyhow::anyhow!("storage.uri is required for mongodb"))
                })?;
                let store = MongoInvoiceStore::connect(
                    uri.expose_secret(),
                    &config.database,
                    &config.collection,
                )
                .await?;
                store.initialize_indexes().await?;
                let operations: Arc<dyn InvoiceOperations> = Arc::new(store.clone());
                (operations, Some(store))
            }
        };

    let Some(alegra) = &config.alegra else {
        return Ok((primary, database));
    };
    let client = AlegraClient::new(alegra).map_err(AppError::ConfigError)?;
    let mirrored: Arc<dyn InvoiceOperations> = Arc::new(MirroredInvoiceStore::new(primary, client));
    Ok((mirrored, database))
}

pub fn build_gateway(
    config: &BillingConfig,
    provider: Arc<dyn IdentityProvider>,
    operations: Arc<dyn InvoiceOperations>,
) -> Result<Gateway, AppError> {
    let cors = CorsSettings::new(&config.gateway.allow_origin, config.gateway.max_age_seconds)
        .map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Invalid gateway.allow_origin: {}", e))
        })?;
    let routes = RouteTable::invoices(&cors)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Invalid route table: {}", e)))?;

    Ok(Gateway::new(
        routes,
        AuthGate::new(provider),
        operations,
        config.gateway.deadline(),
    ))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .fallback(handlers::dispatch)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
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
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        let provider = build_identity_provider(&config.identity)?;
        let (operations, database) = build_invoice_store(&config.storage).await?;
        let gateway = build_gateway(&config, provider, operations)?;

        let mut state = AppState::new(gateway, config.service_name.clone());
        if let Some(database) = database {
            state = state.with_database(database);
        }

        let app = build_router(state);

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!(
                    "Invalid listen address {}:{}: {}",
                    config.server.host,
                    config.server.port,
                    e
                ))
            })?;
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, service = %config.service_name, "Listening");

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .into_future();

        Ok(Self {
            port,
            server: Box::new(server),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

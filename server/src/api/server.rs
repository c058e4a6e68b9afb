//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::routes::{channels, files, presence, status, tasks};
use crate::core::CoreApp;
use crate::core::constants::{DEFAULT_BODY_LIMIT, MAX_UPLOAD_BYTES};
use crate::data::files::BlobStore;
use crate::data::sqlite::SqliteService;
use crate::domain::fanout::ChannelService;
use crate::domain::registry::SubscriberRegistry;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqliteService>,
    pub registry: Arc<SubscriberRegistry>,
    pub channels: Arc<ChannelService>,
    pub blobs: Arc<BlobStore>,
    pub shutdown_rx: watch::Receiver<bool>,
    pub started_at: Instant,
}

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        let shutdown = app.shutdown.clone();
        let state = AppState {
            db: Arc::clone(&app.database),
            registry: Arc::clone(&app.registry),
            channels: Arc::clone(&app.channels),
            blobs: Arc::clone(&app.blobs),
            shutdown_rx: shutdown.subscribe(),
            started_at: Instant::now(),
        };

        let router = build_router(state, app.config.verbose);

        let addr = SocketAddr::from(([0, 0, 0, 0], app.config.port));
        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "workshop listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}

pub fn build_router(state: AppState, verbose: bool) -> Router {
    let router = Router::new()
        .route("/", get(channels::subscribe_all))
        .route("/status", get(status::status))
        .route("/channels", get(channels::list_channels))
        .route("/history", get(channels::global_history))
        .route("/ch/{ch}", get(channels::subscribe).post(channels::publish))
        .route("/ch/{ch}/history", get(channels::channel_history))
        .route("/tasks", post(tasks::create).get(tasks::list))
        .route("/tasks/{id}", get(tasks::get))
        .route("/tasks/{id}/claim", post(tasks::claim))
        .route("/tasks/{id}/update", post(tasks::update))
        .route("/tasks/{id}/done", post(tasks::done))
        .route("/tasks/{id}/abandon", post(tasks::abandon))
        .route("/tasks/{id}/interrupt", post(tasks::interrupt))
        .route(
            "/files",
            post(files::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024)),
        )
        .route("/files/{*hash}", get(files::download))
        .route("/presence", post(presence::heartbeat).get(presence::list))
        .fallback(middleware::handle_404)
        .layer(axum::middleware::from_fn(middleware::cors))
        .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT))
        .with_state(state);

    if verbose {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::core::config::Config;
use crate::core::constants::{APP_NAME, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::data::files::BlobStore;
use crate::data::sqlite::SqliteService;
use crate::domain::fanout::{self, ChannelService};
use crate::domain::registry::SubscriberRegistry;
use crate::domain::retention;

pub struct CoreApp {
    pub config: Config,
    pub shutdown: ShutdownService,
    pub database: Arc<SqliteService>,
    pub registry: Arc<SubscriberRegistry>,
    pub channels: Arc<ChannelService>,
    pub blobs: Arc<BlobStore>,
}

impl CoreApp {
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let app = Self::init().await?;
        Self::start_server(app).await
    }

    async fn init() -> Result<Self> {
        let config = Config::from_env();

        let database = Arc::new(
            SqliteService::init(&config.db_path)
                .await
                .with_context(|| format!("initialize database at {}", config.db_path.display()))?,
        );
        let blobs = Arc::new(
            BlobStore::init(config.blob_dir.clone())
                .await
                .with_context(|| format!("initialize blob store at {}", config.blob_dir.display()))?,
        );
        let registry = Arc::new(SubscriberRegistry::new());
        let channels = Arc::new(ChannelService::new(Arc::clone(&database), Arc::clone(&registry)));

        let shutdown = ShutdownService::new(Arc::clone(&database));
        shutdown
            .register(fanout::start_keepalive_task(
                Arc::clone(&registry),
                shutdown.subscribe(),
            ))
            .await;
        shutdown
            .register(retention::start_retention_task(
                Arc::clone(&database),
                config.retention_days,
                shutdown.subscribe(),
            ))
            .await;
        shutdown
            .register(database.start_checkpoint_task(shutdown.subscribe()))
            .await;
        shutdown.install_signal_handlers();

        Ok(Self {
            config,
            shutdown,
            database,
            registry,
            channels,
            blobs,
        })
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        let server = ApiServer::new(app);
        let app = server.start().await?;

        // The acceptor has stopped (signal or error); drain background tasks
        // and close the store.
        app.shutdown.shutdown().await;
        Ok(())
    }
}

use anyhow::Context;
use clap::Parser;
use image_queue_broker::{Consumer, MemoryBroker, Producer, RedisBroker};
use image_queue_gateway::config::{BrokerBackend, StorageBackend};
use image_queue_gateway::{create_router, AppState, GatewayConfig};
use image_queue_persistence::{
    DatabaseStorage, MemorySessionRepository, MemoryStorage, RedisSessionRepository, SqliteDatabase,
    Storage,
};
use image_queue_worker::{StorageReporter, Worker};
use std::future::IntoFuture;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "iq-gateway")]
#[command(about = "Image Queue API Gateway", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "gateway.yaml")]
    config: String,

    /// Listen host
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long)]
    port: Option<u16>,

    /// Secret for signing session tokens
    #[arg(long, env = "IQ_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config_found = std::path::Path::new(&args.config).exists();
    let mut config = if config_found {
        GatewayConfig::from_file(&args.config)?
    } else {
        GatewayConfig::default()
    };

    // Override with CLI args
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(secret) = args.jwt_secret {
        config.storage.jwt_secret = secret;
    }

    init_tracing(&config);
    if !config_found {
        tracing::warn!("Config file {} not found, using defaults", args.config);
    }
    tracing::info!(
        storage = ?config.storage.backend,
        broker = ?config.broker.backend,
        embedded_worker = config.worker.embedded,
        "Starting gateway"
    );

    let storage = build_storage(&config).await?;
    let (producer, consumer) = build_broker(&config).await?;

    let state = Arc::new(AppState::new(storage.clone(), producer)?);
    let app = create_router(state, config.server.max_body_bytes);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("REST API listening on {}", addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();

    match consumer {
        Some(consumer) => {
            let worker = Worker::new(consumer, Arc::new(StorageReporter::new(storage)));
            tracing::info!("Running embedded worker");
            tokio::select! {
                served = server => served?,
                worked = worker.run() => worked.context("embedded worker stopped")?,
            }
        }
        None => server.await?,
    }

    Ok(())
}

fn init_tracing(config: &GatewayConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());
    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

async fn build_storage(config: &GatewayConfig) -> anyhow::Result<Arc<dyn Storage>> {
    let settings = &config.storage;
    match settings.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
            Ok(storage)
        }
        StorageBackend::Database => {
            let db = SqliteDatabase::open(&settings.sqlite_path)?;
            tracing::info!("Using SQLite storage at {}", settings.sqlite_path.display());

            match &settings.redis_url {
                Some(redis_url) => {
                    if settings.jwt_secret.is_empty() {
                        anyhow::bail!(
                            "a JWT secret is required for Redis sessions (set IQ_JWT_SECRET)"
                        );
                    }
                    let sessions = RedisSessionRepository::connect(
                        redis_url,
                        &settings.jwt_secret,
                        settings.session_ttl_secs,
                    )
                    .await?;
                    let storage: Arc<dyn Storage> = Arc::new(DatabaseStorage::new(
                        db.task_repository(),
                        db.user_repository(),
                        sessions,
                    ));
                    Ok(storage)
                }
                None => {
                    let storage: Arc<dyn Storage> = Arc::new(DatabaseStorage::new(
                        db.task_repository(),
                        db.user_repository(),
                        MemorySessionRepository::with_ttl(settings.session_ttl_secs),
                    ));
                    Ok(storage)
                }
            }
        }
    }
}

/// Producer for the API, plus a consumer when a worker runs in this process
async fn build_broker(
    config: &GatewayConfig,
) -> anyhow::Result<(Arc<dyn Producer>, Option<Arc<dyn Consumer>>)> {
    let backend = config.broker.backend;
    let (producer, consumer): (Arc<dyn Producer>, Arc<dyn Consumer>) = match backend {
        BrokerBackend::Memory => {
            let broker = Arc::new(MemoryBroker::new());
            if !config.worker.embedded {
                tracing::warn!(
                    "In-memory queue without an embedded worker: tasks will never be processed"
                );
            }
            let producer: Arc<dyn Producer> = broker.clone();
            let consumer: Arc<dyn Consumer> = broker;
            (producer, consumer)
        }
        BrokerBackend::Redis => {
            let broker = Arc::new(RedisBroker::connect(config.redis_broker()).await?);
            let producer: Arc<dyn Producer> = broker.clone();
            let consumer: Arc<dyn Consumer> = broker;
            (producer, consumer)
        }
    };

    Ok((producer, config.worker.embedded.then_some(consumer)))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("Received shutdown signal");
}

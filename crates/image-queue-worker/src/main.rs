use clap::Parser;
use image_queue_broker::RedisBroker;
use image_queue_client::GatewayClient;
use image_queue_worker::config::ReportMode;
use image_queue_worker::{CommitReporter, Reporter, Worker, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "iq-worker")]
#[command(about = "Image Queue Worker", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Redis URL of the task queue
    #[arg(long)]
    redis_url: Option<String>,

    /// Queue name
    #[arg(long)]
    queue: Option<String>,

    /// Consumer name (owns the in-flight list in Redis)
    #[arg(long)]
    consumer_name: Option<String>,

    /// Gateway base URL for commits
    #[arg(long)]
    gateway_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        WorkerConfig::from_file(config_path)?
    } else {
        WorkerConfig::default()
    };

    // Override with CLI args
    if let Some(redis_url) = args.redis_url {
        config.broker.redis_url = redis_url;
    }
    if let Some(queue) = args.queue {
        config.broker.queue_name = queue;
    }
    if let Some(consumer_name) = args.consumer_name {
        config.broker.consumer_name = consumer_name;
    }
    if let Some(gateway_url) = args.gateway_url {
        config.report.gateway_url = gateway_url;
    }

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

    let broker = RedisBroker::connect(config.redis_broker()).await?;

    let reporter: Arc<dyn Reporter> = match config.report.mode {
        ReportMode::Commit => {
            let client = GatewayClient::with_timeout(
                config.report.gateway_url.clone(),
                Duration::from_secs(config.report.timeout_secs),
            )?;
            tracing::info!("Reporting outcomes to {}", config.report.gateway_url);
            Arc::new(CommitReporter::new(client))
        }
    };

    let worker = Arc::new(Worker::new(Arc::new(broker), reporter));

    // Handle shutdown signals
    let shutdown = worker.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        shutdown.notify_one();
    });

    worker.run().await?;
    tracing::info!("Worker stopped after {} tasks", worker.processed());

    Ok(())
}

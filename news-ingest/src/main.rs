use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use envconfig::Envconfig;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use news_ingest::app_context::AppContext;
use news_ingest::config::{Config, FailurePolicy};
use news_ingest::consumer::TopicConsumer;
use news_ingest::run_pipeline;
use news_ingest::server::start_probe_server;
use news_ingest::sinks::kafka::KafkaSink;
use news_ingest::sinks::postgres::PostgresSink;

fn setup_tracing() {
    let log_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();
    info!("starting up...");

    let config = Config::init_from_env()?;
    let policy = FailurePolicy::from_str(&config.on_batch_failure)
        .unwrap_or_else(|e| panic!("invalid failure policy: {e}"));

    let consumer = TopicConsumer::new(&config.kafka)?;
    info!("subscribed to topic: {}", config.kafka.raw_topic);

    let context = Arc::new(AppContext::new(&config).await?);

    let latest_state = PostgresSink::new(context.pool.clone());
    // Startup schema creation is fatal: no batch can be processed without it
    latest_state.ensure_schema().await?;

    let producer_liveness = context
        .liveness
        .register("kafka_producer".to_string(), chrono::Duration::seconds(60))
        .await;
    let publisher = KafkaSink::new(&config.kafka, producer_liveness)?;

    start_probe_server(&config, context.liveness.clone());

    // Shutdown is honored at batch boundaries only, a batch in flight
    // always completes
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let result = run_pipeline(
        &config,
        policy,
        consumer,
        context,
        &publisher,
        &latest_state,
        shutdown,
    )
    .await;

    if let Err(e) = &result {
        error!("pipeline stopped: {}", e);
    }

    // Drain the producer queue so acked-but-buffered records are not lost
    if let Err(e) = publisher.flush() {
        error!("failed to flush producer on shutdown: {}", e);
    }

    result.map_err(Into::into)
}

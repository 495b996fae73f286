use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tracing::{error, info, warn};

pub mod app_context;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod metrics_consts;
pub mod server;
pub mod sinks;
pub mod transform;
pub mod types;

use app_context::AppContext;
use config::{Config, FailurePolicy};
use consumer::{Offset, RecvErr, TopicConsumer};
use errors::PipelineError;
use metrics_consts::{
    BATCHES_FAILED, BATCH_ACQUIRE_TIME, DUPLICATES_IN_BATCH, EMPTY_PAYLOADS, ENVELOPES_RECEIVED,
    ENVELOPE_PARSE_ERROR, FORCED_SMALL_BATCH, OFFSET_STORE_FAILED, RECORDS_PER_ENVELOPE,
    RECORDS_SEEN,
};
use sinks::RecordSink;
use transform::{dedupe, flatten, normalize};
use types::{Envelope, FlatRecord};

/// One micro-batch: the flattened, normalized records of the envelopes
/// consumed since the previous batch, plus their offsets. Offsets are
/// stored only after the batch has been handed to both sinks.
pub struct MicroBatch {
    pub records: Vec<FlatRecord>,
    offsets: Vec<Offset>,
}

/// Consume envelopes until the batch is full or has waited long enough,
/// running each one through the decode, flatten and normalize stages.
/// Malformed messages are counted and skipped, they never stop the stream.
async fn acquire_batch(
    consumer: &TopicConsumer,
    config: &Config,
    context: &AppContext,
    shutdown: &AtomicBool,
) -> Result<MicroBatch, PipelineError> {
    let mut records = Vec::with_capacity(config.max_batch_size);
    let mut offsets = Vec::new();
    let start = tokio::time::Instant::now();

    while records.len() < config.max_batch_size {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        context.worker_liveness.report_healthy().await;

        // Race the next envelope against a tick, so a partial batch still
        // flushes once max_batch_wait_secs has passed
        tokio::select! {
            received = consumer.json_recv::<Envelope>() => {
                let (envelope, offset) = match received {
                    Ok(r) => r,
                    Err(RecvErr::Empty) => {
                        warn!("received empty payload");
                        counter!(EMPTY_PAYLOADS).increment(1);
                        continue;
                    }
                    Err(RecvErr::Serde(e)) => {
                        warn!("failed to decode envelope: {}", e);
                        counter!(ENVELOPE_PARSE_ERROR).increment(1);
                        continue;
                    }
                    Err(RecvErr::Kafka(e)) => return Err(e.into()),
                };

                counter!(ENVELOPES_RECEIVED).increment(1);
                offsets.push(offset);

                let before = records.len();
                records.extend(flatten(envelope).map(normalize));
                histogram!(RECORDS_PER_ENVELOPE).record((records.len() - before) as f64);
            }
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                if !records.is_empty()
                    && start.elapsed() > Duration::from_secs(config.max_batch_wait_secs)
                {
                    counter!(FORCED_SMALL_BATCH).increment(1);
                    break;
                }
            }
        }
    }

    counter!(RECORDS_SEEN).increment(records.len() as u64);
    histogram!(BATCH_ACQUIRE_TIME).record(start.elapsed().as_millis() as f64);
    Ok(MicroBatch { records, offsets })
}

/// Drive the pipeline until shutdown or a halting failure: acquire a
/// micro-batch, deduplicate it, hand it to both sinks concurrently, then
/// store the consumed offsets.
pub async fn run_pipeline(
    config: &Config,
    policy: FailurePolicy,
    consumer: TopicConsumer,
    context: Arc<AppContext>,
    publisher: &impl RecordSink,
    latest_state: &impl RecordSink,
    shutdown: Arc<AtomicBool>,
) -> Result<(), PipelineError> {
    loop {
        let batch = acquire_batch(&consumer, config, &context, &shutdown).await?;

        if batch.records.is_empty() {
            if shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, stopping at batch boundary");
                return Ok(());
            }
            continue;
        }

        let mut records = batch.records;
        let removed = dedupe(&mut records);
        counter!(DUPLICATES_IN_BATCH).increment(removed as u64);

        // The two output paths are independent: one failing never blocks
        // or fails the other
        let (published, merged) = tokio::join!(
            publisher.send_batch(&records),
            latest_state.send_batch(&records),
        );

        let mut failed = None;
        for (path, outcome) in [("publish", published), ("merge", merged)] {
            if let Err(e) = outcome {
                counter!(BATCHES_FAILED, &[("path", path)]).increment(1);
                error!(
                    "{} path failed for a batch of {} records: {}",
                    path,
                    records.len(),
                    e
                );
                failed = Some(e);
            }
        }

        if let Some(e) = failed {
            match policy {
                // Advances past the lost batch, like the original pipeline
                FailurePolicy::Skip => warn!("skipping failed batch and advancing offsets"),
                FailurePolicy::Halt => return Err(e.into()),
            }
        }

        for offset in batch.offsets {
            let value = offset.get_value();
            if let Err(e) = offset.store() {
                counter!(OFFSET_STORE_FAILED).increment(1);
                error!("failed to store consumer offset {}: {}", value, e);
            }
        }

        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested, stopping at batch boundary");
            return Ok(());
        }
    }
}

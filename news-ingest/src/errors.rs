use std::fmt;

use rdkafka::error::KafkaError;
use thiserror::Error;

/// Steps of the staged merge protocol, in execution order. Attached to
/// `MergeError` so a failure names the step it died in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStep {
    EnsureSchema,
    AppendStaging,
    Merge,
    ClearStaging,
}

impl fmt::Display for MergeStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MergeStep::EnsureSchema => write!(f, "ensure_schema"),
            MergeStep::AppendStaging => write!(f, "append_staging"),
            MergeStep::Merge => write!(f, "merge"),
            MergeStep::ClearStaging => write!(f, "clear_staging"),
        }
    }
}

#[derive(Debug, Error)]
#[error("merge protocol failed at {step}: {source}")]
pub struct MergeError {
    pub step: MergeStep,
    #[source]
    pub source: sqlx::Error,
}

/// Failure of one output path for one batch. The pipeline's failure policy
/// decides whether this skips the batch or halts the process.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to produce to kafka: {0}")]
    KafkaProduce(#[from] KafkaError),
    #[error("kafka delivery timed out before an ack")]
    KafkaCanceled,
    #[error(transparent)]
    Merge(#[from] MergeError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("kafka consumer error: {0}")]
    Consumer(#[from] KafkaError),
    #[error(transparent)]
    Sink(#[from] SinkError),
}

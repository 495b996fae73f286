use async_trait::async_trait;

use crate::errors::SinkError;
use crate::types::FlatRecord;

pub mod kafka;
pub mod postgres;

/// A batch-oriented destination for cleaned records. The pipeline drives
/// every sink with the same deduplicated batch; implementations must
/// tolerate replay of a batch they have already seen.
#[async_trait]
pub trait RecordSink {
    async fn send_batch(&self, records: &[FlatRecord]) -> Result<(), SinkError>;
}

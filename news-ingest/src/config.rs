use std::str::FromStr;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    #[envconfig(from = "POSTGRES_HOST", default = "localhost")]
    pub db_host: String,

    #[envconfig(from = "POSTGRES_PORT", default = "5432")]
    pub db_port: u16,

    #[envconfig(from = "POSTGRES_DB", default = "news")]
    pub db_name: String,

    #[envconfig(from = "POSTGRES_USER", default = "postgres")]
    pub db_user: String,

    #[envconfig(from = "POSTGRES_PASSWORD", default = "postgres")]
    pub db_password: String,

    #[envconfig(default = "4")]
    pub max_pg_connections: u32,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    // Upper bound on flat records gathered into one micro-batch
    #[envconfig(default = "2000")]
    pub max_batch_size: usize,

    // A partial batch is flushed once it has waited this long
    #[envconfig(default = "5")]
    pub max_batch_wait_secs: u64,

    // "skip" or "halt", see FailurePolicy
    #[envconfig(default = "skip")]
    pub on_batch_failure: String,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3301")]
    pub port: u16,
}

impl Config {
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    #[envconfig(default = "kafka:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "raw-latest-news")]
    pub raw_topic: String,

    #[envconfig(default = "cleaned-latest-news")]
    pub cleaned_topic: String,

    #[envconfig(default = "news-ingest")]
    pub consumer_group: String,

    // "earliest" matches the original backfill-from-start behavior
    #[envconfig(default = "earliest")]
    pub offset_reset: String,

    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    #[envconfig(default = "false")]
    pub kafka_tls: bool,
}

/// What to do with a batch one of whose sinks failed. `Skip` logs the error
/// and advances the consumer offsets past the batch; `Halt` exits without
/// storing them, so the batch is replayed on restart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    Skip,
    Halt,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_ref() {
            "skip" => Ok(FailurePolicy::Skip),
            "halt" => Ok(FailurePolicy::Halt),
            _ => Err(format!("unknown failure policy: {s}, must be skip or halt")),
        }
    }
}

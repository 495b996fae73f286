use std::time::Duration;

use async_trait::async_trait;
use health::HealthHandle;
use metrics::{counter, histogram};
use rdkafka::error::KafkaError;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tracing::{debug, error, info};

use crate::config::KafkaConfig;
use crate::errors::SinkError;
use crate::metrics_consts::{PUBLISH_BATCH_SIZE, RECORDS_PUBLISHED};
use crate::sinks::RecordSink;
use crate::types::FlatRecord;

pub struct KafkaContext {
    liveness: HealthHandle,
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, _: rdkafka::Statistics) {
        // The stats callback only fires while the librdkafka poll loop runs
        self.liveness.report_healthy_blocking();
    }
}

/// Publishes cleaned records to the output topic, one message per
/// (id, category) record, keyed by the article id.
#[derive(Clone)]
pub struct KafkaSink {
    producer: FutureProducer<KafkaContext>,
    topic: String,
}

impl KafkaSink {
    pub fn new(config: &KafkaConfig, liveness: HealthHandle) -> Result<KafkaSink, KafkaError> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .set(
                "compression.codec",
                config.kafka_compression_codec.to_owned(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> =
            client_config.create_with_context(KafkaContext { liveness })?;

        // Ping the cluster so a bad broker address fails at startup
        producer
            .client()
            .fetch_metadata(None, Timeout::After(Duration::from_secs(10)))?;
        info!("connected to Kafka brokers");

        Ok(KafkaSink {
            producer,
            topic: config.cleaned_topic.clone(),
        })
    }

    /// Drain the in-memory producer queue, called once on shutdown.
    pub fn flush(&self) -> Result<(), KafkaError> {
        self.producer.flush(Duration::from_secs(30))
    }

    fn queue_send(&self, record: &FlatRecord) -> Result<DeliveryFuture, SinkError> {
        let payload = serde_json::to_string(record)?;

        match self.producer.send_result(FutureRecord {
            topic: self.topic.as_str(),
            payload: Some(&payload),
            partition: None,
            key: Some(record.key()),
            timestamp: None,
            headers: None,
        }) {
            Ok(ack) => Ok(ack),
            Err((e, _)) => {
                error!("failed to queue record {} for delivery: {}", record.key(), e);
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl RecordSink for KafkaSink {
    async fn send_batch(&self, records: &[FlatRecord]) -> Result<(), SinkError> {
        // Queue every record first, then wait for the broker acks together.
        // The first failed ack fails the batch; retrying is the caller's
        // policy, not ours.
        let mut acks = Vec::with_capacity(records.len());
        for record in records {
            acks.push(self.queue_send(record)?);
        }

        for ack in acks {
            match ack.await {
                Ok(Ok(_)) => counter!(RECORDS_PUBLISHED).increment(1),
                Ok(Err((e, _))) => {
                    error!("failed to produce to kafka: {}", e);
                    return Err(e.into());
                }
                Err(_) => {
                    // Cancelled after exhausting message.timeout.ms
                    error!("timed out waiting for a kafka ack");
                    return Err(SinkError::KafkaCanceled);
                }
            }
        }

        histogram!(PUBLISH_BATCH_SIZE).record(records.len() as f64);
        Ok(())
    }
}

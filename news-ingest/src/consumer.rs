use std::sync::{Arc, Weak};

use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message,
};
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::KafkaConfig;

/// Cheaply cloneable wrapper over an rdkafka `StreamConsumer` subscribed to
/// the raw topic.
///
/// Offset storage is manual: callers hold the `Offset` returned with each
/// message until the message's whole batch has cleared both sinks, then
/// store it. The periodic auto-commit then picks up stored offsets.
#[derive(Clone)]
pub struct TopicConsumer {
    inner: Arc<Inner>,
}

struct Inner {
    consumer: StreamConsumer,
    topic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecvErr {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("payload deserialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("received empty payload")]
    Empty,
}

#[derive(Debug, thiserror::Error)]
pub enum OffsetErr {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("consumer gone")]
    Gone,
}

impl TopicConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("group.id", &config.consumer_group)
            .set("auto.offset.reset", &config.offset_reset)
            .set("enable.auto.offset.store", "false");

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[config.raw_topic.as_str()])?;

        let inner = Inner {
            consumer,
            topic: config.raw_topic.clone(),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Receive one message and decode its payload as JSON. Empty and
    /// undecodable payloads have their offset stored right away so the
    /// poison pill is not replayed forever.
    pub async fn json_recv<T>(&self) -> Result<(T, Offset), RecvErr>
    where
        T: DeserializeOwned,
    {
        let message = self.inner.consumer.recv().await?;

        let offset = Offset {
            handle: Arc::downgrade(&self.inner),
            partition: message.partition(),
            offset: message.offset(),
        };

        let Some(payload) = message.payload() else {
            if let Err(e) = offset.store() {
                warn!("failed to store offset of an empty payload: {}", e);
            }
            return Err(RecvErr::Empty);
        };

        let payload = match serde_json::from_slice(payload) {
            Ok(p) => p,
            Err(e) => {
                if let Err(e) = offset.store() {
                    warn!("failed to store offset of an undecodable payload: {}", e);
                }
                return Err(RecvErr::Serde(e));
            }
        };

        Ok((payload, offset))
    }
}

pub struct Offset {
    handle: Weak<Inner>,
    partition: i32,
    offset: i64,
}

impl Offset {
    pub fn store(self) -> Result<(), OffsetErr> {
        let inner = self.handle.upgrade().ok_or(OffsetErr::Gone)?;
        inner
            .consumer
            .store_offset(&inner.topic, self.partition, self.offset)?;
        Ok(())
    }

    pub fn get_value(&self) -> i64 {
        self.offset
    }
}

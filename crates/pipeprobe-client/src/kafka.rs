//! Kafka event source.

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "kafka")]
use crate::consumer::{decode_and_deliver, EventSource};
#[cfg(feature = "kafka")]
use pipeprobe_core::CorrelationRegistry;
#[cfg(feature = "kafka")]
use rdkafka::consumer::{Consumer, StreamConsumer};
#[cfg(feature = "kafka")]
use rdkafka::message::Message as _;
#[cfg(feature = "kafka")]
use rdkafka::ClientConfig;
#[cfg(feature = "kafka")]
use tokio::task::JoinHandle;
#[cfg(feature = "kafka")]
use tokio_util::sync::CancellationToken;
#[cfg(feature = "kafka")]
use tracing::{info, warn};

/// Configuration for [`KafkaEventSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    /// Consumer group; a fresh `pipeprobe-<uuid>` when unset
    pub group_id: Option<String>,
    /// `latest` or `earliest`
    pub auto_offset_reset: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            topic: String::new(),
            group_id: None,
            auto_offset_reset: "latest".to_string(),
        }
    }
}

impl KafkaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() || self.brokers.iter().any(|b| b.is_empty()) {
            return Err(ClientError::MissingField("brokers"));
        }
        if self.topic.is_empty() {
            return Err(ClientError::MissingField("topic"));
        }
        match self.auto_offset_reset.as_str() {
            "latest" | "earliest" => Ok(()),
            other => Err(ClientError::invalid(
                "auto_offset_reset",
                format!("expected latest or earliest, got {other:?}"),
            )),
        }
    }

    /// Consumer group to join; a fresh one per call when none is configured.
    pub fn resolve_group_id(&self) -> String {
        self.group_id
            .clone()
            .unwrap_or_else(|| format!("pipeprobe-{}", Uuid::new_v4()))
    }

    #[cfg(feature = "kafka")]
    fn to_client_config(&self) -> ClientConfig {
        let group_id = self.resolve_group_id();

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", self.brokers.join(","))
            .set("group.id", group_id)
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("enable.auto.commit", "true");
        config
    }
}

/// Reads the pipeline's output topic.
#[cfg(feature = "kafka")]
pub struct KafkaEventSource {
    consumer: StreamConsumer,
    topic: String,
}

#[cfg(feature = "kafka")]
impl KafkaEventSource {
    /// Creates the consumer and subscribes to the configured topic.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        config.validate()?;
        let consumer: StreamConsumer = config.to_client_config().create()?;
        consumer.subscribe(&[config.topic.as_str()])?;
        info!(
            topic = %config.topic,
            brokers = %config.brokers.join(","),
            "subscribed to output topic"
        );

        Ok(Self {
            consumer,
            topic: config.topic.clone(),
        })
    }
}

#[cfg(feature = "kafka")]
impl EventSource for KafkaEventSource {
    fn start(self, registry: CorrelationRegistry, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    msg = self.consumer.recv() => msg,
                };
                match msg {
                    Ok(msg) => {
                        if let Some(payload) = msg.payload() {
                            decode_and_deliver(payload, &registry);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, topic = %self.topic, "Kafka consumer error");
                    }
                }
            }
            self.consumer.unsubscribe();
            info!(topic = %self.topic, "Kafka event source stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            KafkaConfig::default().validate(),
            Err(ClientError::MissingField("brokers"))
        ));

        let mut config = KafkaConfig {
            brokers: vec!["localhost:9092".to_string()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::MissingField("topic"))));

        config.topic = "pipeline-output".to_string();
        assert!(config.validate().is_ok());

        config.auto_offset_reset = "smallest".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fresh_group_per_source() {
        let mut config = KafkaConfig {
            brokers: vec!["localhost:9092".to_string()],
            topic: "out".to_string(),
            ..Default::default()
        };
        let a = config.resolve_group_id();
        assert!(a.starts_with("pipeprobe-"));
        assert_ne!(a, config.resolve_group_id());

        config.group_id = Some("fixed".to_string());
        assert_eq!(config.resolve_group_id(), "fixed");
    }

    #[cfg(feature = "kafka")]
    #[test]
    fn test_client_config_keys() {
        let config = KafkaConfig {
            brokers: vec!["a:9092".to_string(), "b:9092".to_string()],
            topic: "out".to_string(),
            ..Default::default()
        };
        let client = config.to_client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("a:9092,b:9092"));
        assert_eq!(client.get("auto.offset.reset"), Some("latest"));
    }
}

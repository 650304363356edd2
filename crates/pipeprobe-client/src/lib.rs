//! Protocol clients and event consumers for pipeprobe.
//!
//! A [`ProtocolClient`] publishes one message and waits until the same
//! message, identified by its device ID, shows up on the pipeline's output.
//! An [`EventSource`] reads that output and delivers every decoded message
//! to the shared [`CorrelationRegistry`](pipeprobe_core::CorrelationRegistry).
//!
//! # Transports
//! - `HttpClient`: POST to an ingestion endpoint
//! - `MqttClient`: publish to a per-device MQTT topic
//!
//! # Event sources
//! - `ChannelEventSource`: raw payloads from an in-process channel
//! - `KafkaEventSource`: a Kafka topic (cargo feature `kafka`)

pub mod client;
pub mod consumer;
pub mod error;
pub mod http;
pub mod kafka;
pub mod mqtt;

pub use client::ProtocolClient;
pub use consumer::{decode_and_deliver, ChannelEventSource, EventSource};
pub use error::{ClientError, Result};
pub use http::{HttpClient, HttpConfig};
pub use kafka::KafkaConfig;
#[cfg(feature = "kafka")]
pub use kafka::KafkaEventSource;
pub use mqtt::{MqttClient, MqttConfig};

//! MQTT publishing client.

use crate::client::{encode, CallTimer, ProtocolClient};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use pipeprobe_core::{CallError, CorrelationRegistry, Message, Response};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_PORT: u16 = 1883;

const REQUEST_CAPACITY: usize = 10;
const DISCONNECT_GRACE: Duration = Duration::from_millis(250);

/// Configuration for [`MqttClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// `tcp://host:port`, `mqtt://host:port` or `host[:port]`
    pub broker: String,
    /// Three-segment template; the middle segment is replaced by the device ID.
    pub topic: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
    /// Limit for connecting and for the broker's publish acknowledgement
    pub ack_timeout_secs: u64,
    pub await_confirmation: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: String::new(),
            topic: String::new(),
            qos: 1,
            keep_alive_secs: 30,
            ack_timeout_secs: 10,
            await_confirmation: true,
        }
    }
}

impl MqttConfig {
    pub fn new(broker: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            topic: topic.into(),
            ..Default::default()
        }
    }
}

/// Publishes each message on its own short-lived connection.
///
/// Every call connects with a fresh client ID and a clean session, waits for
/// the acknowledgement its QoS calls for, and disconnects.
#[derive(Debug, Clone)]
pub struct MqttClient {
    host: String,
    port: u16,
    topic_prefix: String,
    topic_suffix: String,
    qos: QoS,
    keep_alive: Duration,
    ack_timeout: Duration,
    await_confirmation: bool,
    registry: CorrelationRegistry,
}

impl MqttClient {
    pub fn new(config: MqttConfig, registry: CorrelationRegistry) -> Result<Self> {
        let (host, port) = parse_broker(&config.broker)?;
        let (topic_prefix, topic_suffix) = parse_topic(&config.topic)?;
        let qos = parse_qos(config.qos)?;
        if config.ack_timeout_secs == 0 {
            return Err(ClientError::invalid("ack_timeout_secs", "must be positive"));
        }

        Ok(Self {
            host,
            port,
            topic_prefix,
            topic_suffix,
            qos,
            keep_alive: Duration::from_secs(config.keep_alive_secs),
            ack_timeout: Duration::from_secs(config.ack_timeout_secs),
            await_confirmation: config.await_confirmation,
            registry,
        })
    }

    /// Topic a message for `device_id` is published to.
    pub fn topic_for(&self, device_id: &str) -> String {
        format!("{}/{}/{}", self.topic_prefix, device_id, self.topic_suffix)
    }

    pub fn broker_addr(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// Connects, publishes and waits for the broker's acknowledgement.
    /// Returns the instant the publish was handed to the connection.
    async fn publish(
        &self,
        topic: String,
        payload: Vec<u8>,
    ) -> std::result::Result<Instant, CallError> {
        let mut options = MqttOptions::new(Uuid::new_v4().to_string(), &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        self.within_ack_timeout(poll_until(&mut eventloop, |event| {
            matches!(event, Event::Incoming(Packet::ConnAck(_)))
        }))
        .await?;

        let sent = Instant::now();
        client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let qos = self.qos;
        self.within_ack_timeout(poll_until(&mut eventloop, |event| is_publish_ack(qos, event)))
            .await?;

        if client.disconnect().await.is_ok() {
            let _ = timeout(
                DISCONNECT_GRACE,
                poll_until(&mut eventloop, |event| {
                    matches!(event, Event::Outgoing(Outgoing::Disconnect))
                }),
            )
            .await;
        }

        Ok(sent)
    }

    async fn within_ack_timeout<F>(&self, fut: F) -> std::result::Result<(), CallError>
    where
        F: std::future::Future<Output = std::result::Result<(), ConnectionError>>,
    {
        match timeout(self.ack_timeout, fut).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CallError::Transport(e.to_string())),
            Err(_) => Err(CallError::Transport(format!(
                "no response from {}:{} within {:?}",
                self.host, self.port, self.ack_timeout
            ))),
        }
    }
}

#[async_trait]
impl ProtocolClient for MqttClient {
    async fn call_endpoint(&self, message: &Message, cancel: &CancellationToken) -> Response {
        let timer = CallTimer::start();
        let pending = self.registry.register(message.device_id());

        let payload = match encode(message) {
            Ok(payload) => payload,
            Err(e) => return timer.fail(e, None),
        };
        let size = payload.len();
        let topic = self.topic_for(message.device_id());

        let sent = match self.publish(topic, payload).await {
            Ok(sent) => sent,
            Err(e) => {
                debug!(device_id = %message.device_id(), error = %e, "publish failed");
                return timer.fail(e, Some(size));
            }
        };

        if !self.await_confirmation {
            return timer.succeed(size);
        }

        timer.confirm(pending, cancel, sent, size).await
    }
}

async fn poll_until<F>(
    eventloop: &mut EventLoop,
    done: F,
) -> std::result::Result<(), ConnectionError>
where
    F: Fn(&Event) -> bool,
{
    loop {
        let event = eventloop.poll().await?;
        if done(&event) {
            return Ok(());
        }
    }
}

fn is_publish_ack(qos: QoS, event: &Event) -> bool {
    match qos {
        QoS::AtMostOnce => matches!(event, Event::Outgoing(Outgoing::Publish(_))),
        QoS::AtLeastOnce => matches!(event, Event::Incoming(Packet::PubAck(_))),
        QoS::ExactlyOnce => matches!(event, Event::Incoming(Packet::PubComp(_))),
    }
}

fn parse_broker(broker: &str) -> Result<(String, u16)> {
    if broker.is_empty() {
        return Err(ClientError::MissingField("broker"));
    }
    let addr = broker
        .strip_prefix("tcp://")
        .or_else(|| broker.strip_prefix("mqtt://"))
        .unwrap_or(broker);
    if addr.contains("://") {
        return Err(ClientError::invalid("broker", format!("unsupported scheme in {broker:?}")));
    }

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|e| {
                ClientError::invalid("broker", format!("bad port in {broker:?}: {e}"))
            })?;
            (host, port)
        }
        None => (addr, DEFAULT_PORT),
    };
    if host.is_empty() {
        return Err(ClientError::invalid("broker", format!("no host in {broker:?}")));
    }
    Ok((host.to_string(), port))
}

fn parse_topic(topic: &str) -> Result<(String, String)> {
    if topic.is_empty() {
        return Err(ClientError::MissingField("topic"));
    }
    let segments: Vec<&str> = topic.split('/').collect();
    match segments.as_slice() {
        [prefix, _, suffix] => Ok((prefix.to_string(), suffix.to_string())),
        _ => Err(ClientError::invalid(
            "topic",
            format!("expected three segments, got {} in {topic:?}", segments.len()),
        )),
    }
}

fn parse_qos(qos: u8) -> Result<QoS> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(ClientError::invalid("qos", format!("must be 0, 1 or 2, got {other}"))),
    }
}

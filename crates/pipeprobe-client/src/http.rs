//! HTTP ingestion client.

use crate::client::{encode, CallTimer, ProtocolClient};
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use pipeprobe_core::{CallError, CorrelationRegistry, Message, Response};
use reqwest::header::CONTENT_TYPE;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration for [`HttpClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Ingestion endpoint, e.g. `http://localhost:8080/ingest`
    pub url: String,
    pub content_type: String,
    /// Per-request timeout of the underlying HTTP client
    pub timeout_secs: u64,
    /// Wait for the message to come back on the event source
    pub await_confirmation: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            content_type: "application/json".to_string(),
            timeout_secs: 10,
            await_confirmation: true,
        }
    }
}

impl HttpConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Checks the configuration and returns the parsed endpoint.
    pub fn validate(&self) -> Result<Url> {
        if self.url.is_empty() {
            return Err(ClientError::MissingField("url"));
        }
        let url = Url::parse(&self.url).map_err(|e| ClientError::invalid("url", e.to_string()))?;
        if self.content_type.is_empty() {
            return Err(ClientError::MissingField("content_type"));
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::invalid("timeout_secs", "must be positive"));
        }
        Ok(url)
    }
}

/// POSTs every message to a fixed endpoint.
///
/// The underlying `reqwest::Client` pools connections, so one instance
/// should serve the whole run.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    url: Url,
    content_type: String,
    await_confirmation: bool,
    registry: CorrelationRegistry,
}

impl HttpClient {
    pub fn new(config: HttpConfig, registry: CorrelationRegistry) -> Result<Self> {
        let url = config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            content_type: config.content_type,
            await_confirmation: config.await_confirmation,
            registry,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ProtocolClient for HttpClient {
    async fn call_endpoint(&self, message: &Message, cancel: &CancellationToken) -> Response {
        let timer = CallTimer::start();
        let pending = self.registry.register(message.device_id());

        let body = match encode(message) {
            Ok(body) => body,
            Err(e) => return timer.fail(e, None),
        };
        let size = body.len();

        let sent = Instant::now();
        let result = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, &self.content_type)
            .body(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => return timer.fail(CallError::Transport(e.to_string()), Some(size)),
        };

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), device_id = %message.device_id(), "request rejected");
            return timer.fail(
                CallError::Rejected {
                    status: status.as_u16(),
                    body,
                },
                Some(size),
            );
        }

        if !self.await_confirmation {
            return timer.succeed(size);
        }

        timer.confirm(pending, cancel, sent, size).await
    }
}

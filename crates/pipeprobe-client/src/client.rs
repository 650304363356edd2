//! The publish-and-confirm contract shared by all transports.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeprobe_core::{CallError, Message, PendingResponse, Response};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Sends one message and measures how long it takes to come back out of
/// the pipeline.
///
/// Implementations register the message's device ID before transmitting,
/// so a confirmation that overtakes the transport acknowledgement is not
/// lost. Per-call failures are reported in the returned [`Response`].
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Publishes `message` and waits for its confirmation until `cancel`
    /// fires.
    async fn call_endpoint(&self, message: &Message, cancel: &CancellationToken) -> Response;
}

/// Start-of-call bookkeeping shared by the transports.
pub(crate) struct CallTimer {
    pub(crate) started_at: DateTime<Utc>,
    start: Instant,
}

impl CallTimer {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    pub(crate) fn fail(&self, error: CallError, message_size: Option<usize>) -> Response {
        Response::failure(self.started_at, error, self.start.elapsed(), message_size)
    }

    pub(crate) fn succeed(&self, message_size: usize) -> Response {
        Response::success(self.started_at, self.start.elapsed(), message_size)
    }

    /// Races the confirmation against `cancel`. Latency is measured from
    /// `sent`, the instant the transport accepted the message.
    pub(crate) async fn confirm(
        &self,
        pending: PendingResponse,
        cancel: &CancellationToken,
        sent: Instant,
        message_size: usize,
    ) -> Response {
        tokio::select! {
            biased;
            _ = pending.recv() => {
                Response::success(self.started_at, sent.elapsed(), message_size)
            }
            _ = cancel.cancelled() => Response::failure(
                self.started_at,
                CallError::Timeout,
                sent.elapsed(),
                Some(message_size),
            ),
        }
    }
}

pub(crate) fn encode(message: &Message) -> std::result::Result<Vec<u8>, CallError> {
    message.encode().map_err(|e| CallError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_encode_sends_document_as_is() {
        let doc = json!({
            "deviceInfo": {"deviceID": "dev-1", "firmware": "1.2.3"},
            "custom": [1, 2]
        });
        let Value::Object(map) = doc.clone() else {
            unreachable!()
        };
        let message = Message::from_document(map).unwrap();

        let wire: Value = serde_json::from_slice(&encode(&message).unwrap()).unwrap();
        assert_eq!(wire, doc);
    }

    #[test]
    fn test_encode_typed_message() {
        let mut message = Message::default();
        message.device_info.device_id = "dev-2".to_string();

        let wire: Value = serde_json::from_slice(&encode(&message).unwrap()).unwrap();
        assert_eq!(wire["deviceInfo"]["deviceID"], "dev-2");
        assert!(wire.get("batchInfo").is_some());
    }
}

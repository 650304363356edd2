//! Event sources feeding the correlation registry.

use pipeprobe_core::{CorrelationRegistry, Message};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reads the pipeline's output and delivers every message it decodes.
pub trait EventSource {
    /// Spawns the read loop. The loop stops once `cancel` fires or the
    /// underlying stream ends.
    fn start(self, registry: CorrelationRegistry, cancel: CancellationToken) -> JoinHandle<()>;
}

/// Decodes one payload and hands it to the registry.
///
/// Undecodable payloads are logged and dropped. Returns whether a pending
/// call was resolved.
pub fn decode_and_deliver(payload: &[u8], registry: &CorrelationRegistry) -> bool {
    match Message::decode(payload) {
        Ok(message) => {
            let device_id = message.device_id().to_string();
            let matched = registry.deliver(message);
            if !matched {
                debug!(device_id = %device_id, "no pending call for message");
            }
            matched
        }
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "failed to decode event");
            false
        }
    }
}

/// Event source backed by an in-process channel of raw payloads.
pub struct ChannelEventSource {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl ChannelEventSource {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Creates a source together with the sender feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

impl EventSource for ChannelEventSource {
    fn start(mut self, registry: CorrelationRegistry, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    payload = self.rx.recv() => match payload {
                        Some(payload) => {
                            decode_and_deliver(&payload, &registry);
                        }
                        None => break,
                    },
                }
            }
            info!("channel event source stopped");
        })
    }
}

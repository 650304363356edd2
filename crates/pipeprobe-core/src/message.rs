//! Wire message and call outcome types

use crate::error::{CallError, CoreError, Result};
use crate::schema::json_type_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Synthetic telemetry document sent into the pipeline.
///
/// The same JSON shape is expected back on the pipeline's output log, where
/// `deviceInfo.deviceID` is used to find the request that produced it.
///
/// A message built from a raw document (see [`Message::from_document`])
/// only fills in its device identity; [`Message::encode`] then sends the
/// document itself, untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub device_info: DeviceInfo,
    #[serde(default)]
    pub batch_info: BatchInfo,
    #[serde(default)]
    pub measurements: Measurements,
    #[serde(default)]
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps_today: Option<f64>,
    #[serde(default)]
    pub timestamp: String,
    /// Top-level fields produced by a schema template that have no typed slot.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    #[serde(skip)]
    pub(crate) document: Option<Map<String, Value>>,
}

impl Message {
    /// Wraps a raw JSON document as the payload of a message.
    ///
    /// Only `deviceInfo.deviceID` (or `deviceId`) is read from it. A missing
    /// key leaves the device ID empty; a key of the wrong type is an error.
    pub fn from_document(document: Map<String, Value>) -> Result<Self> {
        let device_id = match document.get("deviceInfo") {
            None => String::new(),
            Some(Value::Object(info)) => {
                match info.get("deviceID").or_else(|| info.get("deviceId")) {
                    None => String::new(),
                    Some(Value::String(id)) => id.clone(),
                    Some(other) => {
                        return Err(CoreError::InvalidMessage(format!(
                            "deviceInfo.deviceID must be a string, got {}",
                            json_type_name(other)
                        )))
                    }
                }
            }
            Some(other) => {
                return Err(CoreError::InvalidMessage(format!(
                    "deviceInfo must be an object, got {}",
                    json_type_name(other)
                )))
            }
        };

        Ok(Self {
            device_info: DeviceInfo {
                device_id,
                ..Default::default()
            },
            document: Some(document),
            ..Default::default()
        })
    }

    /// Decodes a payload read back from the pipeline.
    ///
    /// Payloads that do not fit the typed fields are kept as raw documents.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Message>(payload) {
            Ok(message) => Ok(message),
            Err(_) => Self::from_document(serde_json::from_slice(payload)?),
        }
    }

    /// Wire form of this message.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        match &self.document {
            Some(document) => serde_json::to_vec(document),
            None => serde_json::to_vec(self),
        }
    }

    /// The raw document this message was built from, if any.
    pub fn document(&self) -> Option<&Map<String, Value>> {
        self.document.as_ref()
    }

    /// Correlation key of this message.
    pub fn device_id(&self) -> &str {
        &self.device_info.device_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default)]
    pub platform: String,
    #[serde(default, rename = "deviceID", alias = "deviceId")]
    pub device_id: String,
    #[serde(default)]
    pub authorization_token: String,
}

/// Collection window of a batch (RFC3339 timestamps).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    #[serde(default)]
    pub collection_start: String,
    #[serde(default)]
    pub collection_end: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    #[serde(default)]
    pub instantaneous: Vec<Instantaneous>,
    #[serde(default)]
    pub cumulative: Vec<Cumulative>,
    #[serde(default)]
    pub duration: Vec<DurationSample>,
}

/// Point-in-time sample, e.g. a heart rate reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instantaneous {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub timestamp: String,
}

/// Counter accumulated over a period, e.g. steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cumulative {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub period_start: String,
    #[serde(default)]
    pub period_end: String,
    /// Period length in seconds
    #[serde(default)]
    pub duration: i64,
}

/// Activity with a length, e.g. a sleep phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationSample {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub period_start: String,
    #[serde(default)]
    pub period_end: String,
}

/// Outcome of a single `call_endpoint` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Wall clock time at which the call started
    pub timestamp: DateTime<Utc>,
    pub error: Option<CallError>,
    pub latency: Duration,
    /// Encoded request size in bytes, if encoding got that far
    pub message_size: Option<usize>,
}

impl Response {
    pub fn success(timestamp: DateTime<Utc>, latency: Duration, message_size: usize) -> Self {
        Self {
            timestamp,
            error: None,
            latency,
            message_size: Some(message_size),
        }
    }

    pub fn failure(
        timestamp: DateTime<Utc>,
        error: CallError,
        latency: Duration,
        message_size: Option<usize>,
    ) -> Self {
        Self {
            timestamp,
            error: Some(error),
            latency,
            message_size,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

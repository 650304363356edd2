//! pipeprobe core - data model and request/confirmation plumbing
//!
//! This crate provides the pieces every pipeprobe transport builds on:
//! - `Message`: the synthetic telemetry document sent into the pipeline
//! - `Response`: the latency-annotated outcome of one call
//! - `Generator`: numeric, timestamp and identifier value producers
//! - `SchemaNode` / `PathTree`: typed trees for schema templates and dot-path maps
//! - `SchemaSupplier` / `TelemetryProvider`: per-call message suppliers
//! - `CorrelationRegistry`: rendezvous between publishers and the event consumer

pub mod error;
pub mod generator;
pub mod message;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod supplier;

pub use error::{CallError, CoreError, Result};
pub use generator::Generator;
pub use message::{
    BatchInfo, Cumulative, DeviceInfo, DurationSample, Instantaneous, Measurements, Message,
    Response,
};
pub use provider::TelemetryProvider;
pub use registry::{CorrelationRegistry, PendingResponse};
pub use schema::{PathTree, ScalarKind, SchemaNode};
pub use supplier::{MessageSupplier, SchemaSupplier};

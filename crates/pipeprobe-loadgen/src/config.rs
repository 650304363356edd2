//! YAML configuration for a load run.

use crate::phase::{Phase, Preset};
use crate::workload::RunPlan;
use anyhow::{bail, Context};
use pipeprobe_client::{HttpClient, HttpConfig, KafkaConfig, MqttClient, MqttConfig, ProtocolClient};
use pipeprobe_core::{
    CorrelationRegistry, Generator, MessageSupplier, SchemaSupplier, TelemetryProvider,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

/// Complete run configuration - loaded from YAML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport used to publish messages
    pub client: ClientSettings,
    /// Where published messages come back out; required when waiting for confirmation
    pub consumer: Option<KafkaConfig>,
    pub workload: WorkloadSettings,
    pub messages: MessageSettings,
    pub collector: CollectorSettings,
    pub logging: LoggingSettings,
}

/// Transport selection, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientSettings {
    Mqtt(MqttConfig),
    Http(HttpConfig),
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings::Http(HttpConfig::new("http://localhost:8080/ingest"))
    }
}

impl ClientSettings {
    pub fn await_confirmation(&self) -> bool {
        match self {
            ClientSettings::Mqtt(config) => config.await_confirmation,
            ClientSettings::Http(config) => config.await_confirmation,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientSettings::Mqtt(_) => "mqtt",
            ClientSettings::Http(_) => "http",
        }
    }
}

/// Load shape settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadSettings {
    pub preset: Preset,
    /// Phases used by the `custom` preset
    pub phases: Vec<Phase>,
    /// Maximum number of calls awaiting their outcome at once
    pub max_in_flight: usize,
    /// How long a call may wait for its confirmation
    pub confirm_timeout_secs: u64,
}

impl Default for WorkloadSettings {
    fn default() -> Self {
        Self {
            preset: Preset::Smoke,
            phases: Vec::new(),
            max_in_flight: 256,
            confirm_timeout_secs: 10,
        }
    }
}

impl WorkloadSettings {
    /// Phases the run will execute.
    pub fn resolved_phases(&self) -> Vec<Phase> {
        self.preset.phases().unwrap_or_else(|| self.phases.clone())
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    /// Built-in step-count telemetry
    #[default]
    Provider,
    /// Schema template with constants and generators
    Schema,
}

/// Message generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    pub source: MessageSource,
    /// Approximate message size in bytes (provider only)
    pub max_size: usize,
    pub schema: Option<SchemaSettings>,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            source: MessageSource::Provider,
            max_size: 500,
            schema: None,
        }
    }
}

/// Schema template and the values filled into it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// JSON schema file
    pub path: PathBuf,
    #[serde(default)]
    pub constants: Vec<ConstantEntry>,
    #[serde(default)]
    pub variables: Vec<VariableEntry>,
}

/// Fixed value for a dot path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantEntry {
    pub name: String,
    pub value: Value,
}

/// Generated value for a dot path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableEntry {
    pub name: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub generator: Generator,
}

/// Result collection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Write one CSV row per call
    pub csv_file: Option<PathBuf>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Write default config to a file (for generating example config)
    pub fn write_default(path: impl AsRef<Path>) -> anyhow::Result<()> {
        let config = Self::default();
        let yaml = serde_yaml::to_string(&config)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Get log level
    pub fn log_level(&self) -> Level {
        match self.logging.level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Checks cross-field rules that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client.await_confirmation() && self.consumer.is_none() {
            bail!("client.await_confirmation is set but no consumer is configured");
        }
        if let Some(consumer) = &self.consumer {
            consumer.validate().context("invalid consumer")?;
        }

        let workload = &self.workload;
        if workload.preset == Preset::Custom && workload.phases.is_empty() {
            bail!("workload.preset is custom but workload.phases is empty");
        }
        for phase in workload.resolved_phases() {
            if let Err(e) = phase.validate() {
                bail!("invalid workload phase: {e}");
            }
        }
        if workload.max_in_flight == 0 {
            bail!("workload.max_in_flight must be positive");
        }
        if workload.confirm_timeout_secs == 0 {
            bail!("workload.confirm_timeout_secs must be positive");
        }

        match self.messages.source {
            MessageSource::Provider => {
                if self.messages.max_size == 0 {
                    bail!("messages.max_size must be positive");
                }
            }
            MessageSource::Schema => {
                let Some(schema) = &self.messages.schema else {
                    bail!("messages.source is schema but messages.schema is missing");
                };
                schema.validate()?;
            }
        }
        Ok(())
    }

    /// Resolves the workload section into what the runner executes.
    pub fn run_plan(&self, name: impl Into<String>) -> RunPlan {
        RunPlan {
            name: name.into(),
            phases: self.workload.resolved_phases(),
            max_in_flight: self.workload.max_in_flight,
            confirm_timeout: self.workload.confirm_timeout(),
            csv_file: self.collector.csv_file.clone(),
        }
    }

    /// Builds the configured transport client.
    pub fn build_client(
        &self,
        registry: CorrelationRegistry,
    ) -> anyhow::Result<Arc<dyn ProtocolClient>> {
        let client: Arc<dyn ProtocolClient> = match &self.client {
            ClientSettings::Mqtt(config) => Arc::new(
                MqttClient::new(config.clone(), registry).context("creating MQTT client")?,
            ),
            ClientSettings::Http(config) => Arc::new(
                HttpClient::new(config.clone(), registry).context("creating HTTP client")?,
            ),
        };
        info!(transport = self.client.kind(), "client ready");
        Ok(client)
    }

    /// Builds the configured message supplier.
    pub fn build_supplier(&self) -> anyhow::Result<Arc<dyn MessageSupplier>> {
        match self.messages.source {
            MessageSource::Provider => Ok(Arc::new(TelemetryProvider::new(self.messages.max_size))),
            MessageSource::Schema => {
                let Some(schema) = &self.messages.schema else {
                    bail!("messages.source is schema but messages.schema is missing");
                };
                let supplier = SchemaSupplier::from_schema_file(
                    &schema.path,
                    schema.constants.iter().map(|c| (c.name.as_str(), c.value.clone())),
                    schema.variables.iter().map(|v| (v.name.as_str(), v.generator.clone())),
                )
                .with_context(|| format!("building supplier from {}", schema.path.display()))?;
                Ok(Arc::new(supplier))
            }
        }
    }
}

impl SchemaSettings {
    fn validate(&self) -> anyhow::Result<()> {
        for constant in &self.constants {
            if constant.name.is_empty() {
                bail!("schema constant without a name");
            }
            if !matches!(constant.value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
                bail!("schema constant {:?} must be a string, number or boolean", constant.name);
            }
        }
        for variable in &self.variables {
            if variable.name.is_empty() {
                bail!("schema variable without a name");
            }
            variable
                .generator
                .validate()
                .with_context(|| format!("schema variable {:?}", variable.name))?;
        }
        Ok(())
    }
}

//! CLI entry point for pipeprobe.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeprobe_core::CorrelationRegistry;
use pipeprobe_loadgen::{config::Config, phase::Preset, workload::run_workload};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pipeprobe")]
#[command(about = "End-to-end latency probe for telemetry ingestion pipelines")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workload described by a configuration file
    Run {
        /// Configuration file (YAML)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the configured preset
        #[arg(short, long, value_enum)]
        preset: Option<Preset>,

        /// Output file for report (markdown)
        #[arg(short, long)]
        output: Option<String>,

        /// Also output JSON report
        #[arg(long)]
        json: bool,
    },

    /// Write an example configuration file
    GenerateConfig {
        /// Destination path
        path: PathBuf,
    },
}

fn init_tracing(level: Level) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
        });
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

#[cfg(feature = "kafka")]
fn start_consumer(
    config: &Config,
    registry: CorrelationRegistry,
    cancel: CancellationToken,
) -> Result<Option<JoinHandle<()>>> {
    use pipeprobe_client::{EventSource, KafkaEventSource};

    let Some(kafka) = &config.consumer else {
        return Ok(None);
    };
    let source = KafkaEventSource::new(kafka).context("creating Kafka consumer")?;
    Ok(Some(source.start(registry, cancel)))
}

#[cfg(not(feature = "kafka"))]
fn start_consumer(
    config: &Config,
    _registry: CorrelationRegistry,
    _cancel: CancellationToken,
) -> Result<Option<JoinHandle<()>>> {
    if config.consumer.is_some() {
        anyhow::bail!(
            "a consumer is configured but pipeprobe was built without the `kafka` feature"
        );
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config_path, preset, output, json) = match cli.command {
        Commands::GenerateConfig { path } => {
            Config::write_default(&path)?;
            println!("Generated default configuration: {}", path.display());
            return Ok(());
        }
        Commands::Run {
            config,
            preset,
            output,
            json,
        } => (config, preset, output, json),
    };

    let mut config = Config::from_file(&config_path)?;
    if let Some(preset) = preset {
        config.workload.preset = preset;
    }
    config.validate()?;

    init_tracing(config.log_level());
    info!("Loaded configuration from: {}", config_path.display());

    let registry = CorrelationRegistry::new();

    // Stops issuing new calls; running calls still finish.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight calls");
                shutdown.cancel();
            }
        });
    }

    let consumer_cancel = CancellationToken::new();
    let consumer = start_consumer(&config, registry.clone(), consumer_cancel.clone())?;

    let client = config.build_client(registry.clone())?;
    let supplier = config.build_supplier()?;

    let id = Uuid::new_v4().simple().to_string();
    let name = format!("{}-{}", config.workload.preset, &id[..8]);
    let report = run_workload(config.run_plan(name), client, supplier, shutdown).await?;

    consumer_cancel.cancel();
    if let Some(handle) = consumer {
        if let Err(e) = handle.await {
            warn!("Consumer task failed: {}", e);
        }
    }

    // Print summary to console
    report.print_summary();

    // Save report if output file specified
    if let Some(output_path) = output {
        let md_path = if output_path.ends_with(".md") {
            output_path
        } else {
            format!("{}.md", output_path)
        };

        std::fs::write(&md_path, report.to_markdown())
            .with_context(|| format!("writing {}", md_path))?;
        info!("Markdown report saved to: {}", md_path);

        if json {
            let json_path = md_path.replace(".md", ".json");
            std::fs::write(&json_path, report.to_json())
                .with_context(|| format!("writing {}", json_path))?;
            info!("JSON report saved to: {}", json_path);
        }
    }

    Ok(())
}

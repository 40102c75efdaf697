//! Swarmforge daemon entry point.
//!
//! Thin by design: this binary only resolves configuration, wires up
//! logging, and drives the [`Orchestrator`] lifecycle. Anything
//! domain-specific — what a spawned agent actually does with a task —
//! belongs behind a [`TaskProcessor`] registered with the embedding
//! application, not here.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;

use swarmforge::adapters::InMemoryStore;
use swarmforge::domain::models::Task;
use swarmforge::infrastructure::config::ConfigLoader;
use swarmforge::infrastructure::logging::{LogConfig, LogFormat, LoggerImpl};
use swarmforge::{AgentTypeRegistry, Orchestrator, StoreAdapter, TaskProcessor};

/// Swarmforge: distributed agent swarm coordination runtime.
#[derive(Parser, Debug)]
#[command(name = "swarmforge", version, about, long_about = None)]
struct Cli {
    /// Path to a YAML config file, merged over the built-in defaults and
    /// under `SWARMFORGE_*` environment overrides. Falls back to
    /// `.swarmforge/config.yaml` in the working directory when omitted.
    #[arg(long, env = "SWARMFORGE_CONFIG_PATH")]
    config: Option<std::path::PathBuf>,

    /// Log level: trace, debug, info, warn, error.
    #[arg(long, env = "SWARMFORGE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit pretty (human-readable) logs instead of JSON.
    #[arg(long)]
    pretty_logs: bool,
}

/// Default task processor run by the daemon: echoes `payload` back as the
/// result. Stands in for the domain-specific processor a real deployment
/// would register per agent type.
struct EchoProcessor {
    capabilities: HashSet<String>,
}

#[async_trait]
impl TaskProcessor for EchoProcessor {
    async fn process_task(&self, task: &Task) -> anyhow::Result<serde_json::Value> {
        Ok(task.payload.clone())
    }

    fn capabilities(&self) -> HashSet<String> {
        self.capabilities.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path).context("failed to load configuration")?,
        None => ConfigLoader::load().context("failed to load configuration")?,
    };

    let log_config = LogConfig {
        level: cli.log_level.clone(),
        format: if cli.pretty_logs { LogFormat::Pretty } else { LogFormat::Json },
        ..LogConfig::default()
    };
    let _logger = LoggerImpl::init(&log_config).context("failed to initialize logging")?;

    tracing::info!(
        min_agents = config.min_agents,
        max_agents = config.max_agents,
        topology = ?config.topology,
        "starting swarmforge"
    );

    let mut registry = AgentTypeRegistry::new();
    for kind in &config.agent_types {
        let capabilities: HashSet<String> = [kind.clone()].into_iter().collect();
        registry.register(
            kind.clone(),
            Arc::new(move || Arc::new(EchoProcessor { capabilities: capabilities.clone() }) as Arc<dyn TaskProcessor>),
        );
    }

    let store: Arc<dyn StoreAdapter> = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(config, registry, store);
    orchestrator.start().await.context("failed to start orchestrator")?;

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received, stopping swarmforge");

    orchestrator.stop().await;
    Ok(())
}

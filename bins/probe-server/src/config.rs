use std::collections::HashSet;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use probe_engine::StageConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "probe-server", about = "Flow probe: hold, inspect and route records by hand")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the stages and the operator API
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "probe.toml", env = "CONFIG_PATH")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Pause between trigger passes of an idle stage.
    #[serde(default = "default_trigger_interval_ms")]
    pub trigger_interval_ms: u64,
    /// Alerts kept before the oldest is evicted.
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,
    /// Delivered records kept per relationship.
    #[serde(default = "default_delivered_buffer")]
    pub delivered_buffer: usize,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

fn default_api_port() -> u16 {
    9300
}
fn default_trigger_interval_ms() -> u64 {
    250
}
fn default_max_alerts() -> usize {
    probe_engine::alerts::DEFAULT_MAX_ALERTS
}
fn default_delivered_buffer() -> usize {
    1000
}

impl ProbeConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config { context: "read", detail: format!("'{path}': {e}") })?;
        Self::parse(&content)
            .map_err(|e| match e {
                ServerError::Config { context, detail } => {
                    ServerError::Config { context, detail: format!("'{path}': {detail}") }
                }
                other => other,
            })
    }

    pub fn parse(content: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::Config { context: "parse", detail: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServerError> {
        if self.stages.is_empty() {
            return Err(ServerError::NoComponents("[[stages]]"));
        }
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.id.trim().is_empty() {
                return Err(ServerError::Config {
                    context: "validate",
                    detail: "stage id is empty".into(),
                });
            }
            if !seen.insert(stage.id.as_str()) {
                return Err(ServerError::Config {
                    context: "validate",
                    detail: format!("duplicate stage id '{}'", stage.id),
                });
            }
        }
        if self.trigger_interval_ms == 0 {
            return Err(ServerError::Config {
                context: "validate",
                detail: "trigger_interval_ms must be positive".into(),
            });
        }
        Ok(())
    }
}

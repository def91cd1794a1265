//! CLI configuration management.

use anyhow::{Context, anyhow, bail};
use mediaci_runner::RunnerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Registry used when a command names none.
    #[serde(default = "default_registry")]
    pub registry: PathBuf,
    /// Output format.
    #[serde(default)]
    pub output_format: OutputFormat,
    /// Local stage execution settings.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Tool that measures PSNR for smoke cases.
    #[serde(default = "default_metrics_command")]
    pub metrics_command: Vec<String>,
}

fn default_registry() -> PathBuf {
    PathBuf::from("config/registry.yaml")
}

fn default_metrics_command() -> Vec<String> {
    vec!["metrics_calc_lite".to_string()]
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            registry: default_registry(),
            output_format: OutputFormat::default(),
            runner: RunnerConfig::default(),
            metrics_command: default_metrics_command(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Yaml,
}

impl CliConfig {
    /// Load configuration from file.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Get the configuration file path.
    pub fn config_path() -> anyhow::Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("dev", "mediaci", "mediaci")
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;
        Ok(dirs.config_dir().join("config.yaml"))
    }

    /// Set a configuration value.
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "registry" => self.registry = PathBuf::from(value),
            "output_format" => {
                self.output_format = match value {
                    "table" => OutputFormat::Table,
                    "json" => OutputFormat::Json,
                    "yaml" => OutputFormat::Yaml,
                    _ => bail!("Invalid output format: {}", value),
                };
            }
            "runner.root_dir" => self.runner.root_dir = PathBuf::from(value),
            "runner.timeout_seconds" => {
                self.runner.timeout_seconds = match value {
                    "none" => None,
                    secs => Some(secs.parse().with_context(|| format!("Invalid timeout: {}", secs))?),
                };
            }
            "runner.max_log_lines" => {
                self.runner.max_log_lines = value
                    .parse()
                    .with_context(|| format!("Invalid line count: {}", value))?;
            }
            "metrics_command" => {
                self.metrics_command = value.split_whitespace().map(str::to_string).collect();
                if self.metrics_command.is_empty() {
                    bail!("metrics_command cannot be empty");
                }
            }
            _ => bail!("Unknown config key: {}", key),
        }
        Ok(())
    }
}

use campwatch_common::types::DerivedMetric;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest second count a `chrono::Duration` can hold.
const MAX_DURATION_SECS: u64 = (i64::MAX / 1000) as u64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Seconds between two cycles of the polling loop.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Minimum gap between two sends of the same alert message.
    #[serde(default = "default_cool_down_secs")]
    pub cool_down_secs: u64,
    /// Drop log entries not sent for this long. Unset keeps them forever.
    #[serde(default)]
    pub log_retention_secs: Option<u64>,
    /// Dimension column holding the entity id (campaign name).
    #[serde(default = "default_entity_column")]
    pub entity_column: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub derived_metrics: Vec<DerivedMetric>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub on_corrupt_log: CorruptLogPolicy,
}

/// File names under `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_snapshot_file")]
    pub snapshot: String,
    #[serde(default = "default_rules_file")]
    pub rules: String,
    #[serde(default = "default_exclusions_file")]
    pub exclusions: String,
    #[serde(default = "default_alert_log_file")]
    pub alert_log: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            snapshot: default_snapshot_file(),
            rules: default_rules_file(),
            exclusions: default_exclusions_file(),
            alert_log: default_alert_log_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// What the loop does when the persisted alert log cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorruptLogPolicy {
    /// Stop the runner and leave the file for inspection.
    #[default]
    Halt,
    /// Log an error and continue with an empty log. Every active alert
    /// will be re-sent once.
    Reset,
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_cool_down_secs() -> u64 {
    3600
}

fn default_entity_column() -> String {
    "campaign".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_snapshot_file() -> String {
    campwatch_storage::source::DEFAULT_SNAPSHOT_FILE.to_string()
}

fn default_rules_file() -> String {
    campwatch_storage::source::DEFAULT_RULES_FILE.to_string()
}

fn default_exclusions_file() -> String {
    campwatch_storage::source::DEFAULT_EXCLUSIONS_FILE.to_string()
}

fn default_alert_log_file() -> String {
    "alert_log.json".to_string()
}

impl RunnerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_secs == 0 {
            anyhow::bail!("poll_interval_secs must be greater than 0");
        }
        if self.entity_column.trim().is_empty() {
            anyhow::bail!("entity_column must not be empty");
        }
        if self.cool_down_secs > MAX_DURATION_SECS {
            anyhow::bail!("cool_down_secs is out of range");
        }
        if let Some(retention) = self.log_retention_secs {
            if retention > MAX_DURATION_SECS {
                anyhow::bail!("log_retention_secs is out of range");
            }
            if retention < self.cool_down_secs {
                tracing::warn!(
                    retention,
                    cool_down = self.cool_down_secs,
                    "log_retention_secs is shorter than the cool-down, using the cool-down instead"
                );
            }
        }
        Ok(())
    }

    pub fn cool_down(&self) -> Duration {
        Duration::seconds(self.cool_down_secs as i64)
    }

    pub fn log_retention(&self) -> Option<Duration> {
        self.log_retention_secs
            .map(|secs| Duration::seconds(secs as i64))
    }

    pub fn snapshot_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.files.snapshot)
    }

    pub fn rules_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.files.rules)
    }

    pub fn exclusions_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.files.exclusions)
    }

    pub fn alert_log_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.files.alert_log)
    }
}

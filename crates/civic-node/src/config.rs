use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub storage: StorageConfig,
    pub adjudication: AdjudicationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub data_dir: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "rocksdb".
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjudicationConfig {
    /// Period of the expiry/due-date sweep loop.
    pub sweep_interval_secs: u64,
    pub inspection_interval_days: i64,
    pub expedited_interval_days: i64,
    pub tolerance_percent: f64,
    pub unit_price: f64,
    pub monthly_interest: f64,
    pub full_penalty: f64,
    pub partial_penalty: f64,
    pub transfer_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json".
    pub format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                data_dir: PathBuf::from("./data"),
                name: "civic-node".to_string(),
            },
            storage: StorageConfig {
                backend: "memory".to_string(),
            },
            adjudication: AdjudicationConfig {
                sweep_interval_secs: 300,
                inspection_interval_days: 180,
                expedited_interval_days: 30,
                tolerance_percent: 5.0,
                unit_price: 10.0,
                monthly_interest: 0.05,
                full_penalty: 100.0,
                partial_penalty: 50.0,
                transfer_timeout_secs: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `CIVIC_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = env::var("CIVIC_DATA_DIR") {
            self.node.data_dir = PathBuf::from(data_dir);
        }
        if let Ok(name) = env::var("CIVIC_NODE_NAME") {
            if !name.is_empty() {
                self.node.name = name;
            }
        }
        if let Ok(backend) = env::var("CIVIC_STORAGE_BACKEND") {
            self.storage.backend = backend;
        }
        if let Ok(interval) = env::var("CIVIC_SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = interval.parse() {
                self.adjudication.sweep_interval_secs = secs;
            }
        }
        if let Ok(days) = env::var("CIVIC_INSPECTION_INTERVAL_DAYS") {
            if let Ok(val) = days.parse() {
                self.adjudication.inspection_interval_days = val;
            }
        }
        if let Ok(tolerance) = env::var("CIVIC_TOLERANCE_PERCENT") {
            if let Ok(val) = tolerance.parse() {
                self.adjudication.tolerance_percent = val;
            }
        }
        if let Ok(level) = env::var("CIVIC_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

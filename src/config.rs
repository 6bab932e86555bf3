use crate::admission::AdmissionConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "repodex";
const CONFIG_FILE: &str = "config.json";

/// Pipeline configuration, stored as JSON in the app data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Admission gate thresholds
    #[serde(default)]
    pub admission: AdmissionConfig,

    /// Units with more files than this are skipped outright
    #[serde(default = "default_max_files_per_unit")]
    pub max_files_per_unit: usize,

    /// Root of durable storage
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,

    /// Language tag used in durable paths and record envelopes
    #[serde(default = "default_language")]
    pub language: String,

    /// Root for per-unit staging directories
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,

    /// Number of worker loops
    /// If 0, uses the number of CPU cores
    #[serde(default)]
    pub workers: usize,
}

fn default_max_files_per_unit() -> usize {
    20_000
}

fn default_base_path() -> PathBuf {
    app_data_base().join("published")
}

fn default_language() -> String {
    "java".to_string()
}

fn default_staging_root() -> PathBuf {
    app_data_base().join("staging")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            admission: AdmissionConfig::default(),
            max_files_per_unit: default_max_files_per_unit(),
            base_path: default_base_path(),
            language: default_language(),
            staging_root: default_staging_root(),
            workers: 0,
        }
    }
}

impl PipelineConfig {
    /// Load config from a JSON file, or return default if not found
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: PipelineConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Load config from the app data directory
    pub fn load_default() -> Result<Self> {
        Self::load(&get_config_path()?)
    }

    /// Save config as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Get the effective worker count (resolves 0 to CPU count)
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus()
        } else {
            self.workers
        }
    }
}

/// Get the number of CPUs available
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Platform data directory for this tool, without touching the filesystem
fn app_data_base() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Get the application data directory, creating it if needed
pub fn get_app_data_dir() -> Result<PathBuf> {
    let app_dir = app_data_base();
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("Could not create app data directory {}", app_dir.display()))?;
    Ok(app_dir)
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_app_data_dir()?.join(CONFIG_FILE))
}

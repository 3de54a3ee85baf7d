//! Configuration for the memory optimizer

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::area::MemoryArea;
use super::capabilities::OperatingSystemCapabilities;
use super::optimizer::OptimizationRequest;
use super::report::OptimizationReason;

const CONFIG_DIR: &str = "memory-cleaner";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no per-user config directory on this system")]
    NoConfigDir,
}

/// Main optimizer configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Areas reclaimed by scheduled and manual runs
    pub memory_areas: MemoryArea,

    /// Processes to never trim (image name, extension optional)
    pub excluded_processes: Vec<String>,

    /// Hours between scheduled runs, 0 disables
    pub auto_optimization_interval_hours: u32,

    /// Memory load percentage that triggers a run, 0 disables
    pub auto_optimization_memory_usage: u32,

    /// Minimum interval between automatic optimizations (seconds)
    pub min_interval_secs: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            memory_areas: MemoryArea::COMBINED_PAGE_LIST
                | MemoryArea::MODIFIED_PAGE_LIST
                | MemoryArea::STANDBY_LIST
                | MemoryArea::SYSTEM_FILE_CACHE
                | MemoryArea::WORKING_SET,
            excluded_processes: Vec::new(),
            auto_optimization_interval_hours: 0,
            auto_optimization_memory_usage: 0,
            min_interval_secs: 30,
        }
    }
}

impl OptimizerConfig {
    /// Load config from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save config to TOML file, creating the parent directory
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }
        std::fs::write(path, content).map_err(io)
    }

    /// `<config dir>/memory-cleaner/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Defaults when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Restrict the configured areas to what this OS supports.
    ///
    /// Both standby flags together collapse to the full standby purge.
    pub fn sanitize(&mut self, capabilities: &OperatingSystemCapabilities) {
        let mut areas = self.memory_areas;

        if areas.contains(MemoryArea::STANDBY_LIST | MemoryArea::STANDBY_LIST_LOW_PRIORITY) {
            areas.remove(MemoryArea::STANDBY_LIST_LOW_PRIORITY);
        }

        let supported = areas & capabilities.supported_areas();
        let dropped = areas - supported;
        if !dropped.is_empty() {
            warn!(
                "Ignoring memory areas not supported on this OS: {}",
                dropped.describe()
            );
        }

        self.memory_areas = supported;
    }

    pub fn is_auto_optimization_enabled(&self) -> bool {
        self.auto_optimization_interval_hours > 0 || self.auto_optimization_memory_usage > 0
    }

    /// Request for the configured areas.
    pub fn request(&self, reason: OptimizationReason) -> OptimizationRequest {
        OptimizationRequest::new(reason, self.memory_areas)
            .with_excluded_processes(self.excluded_processes.iter().cloned())
    }
}

//! # Configuration Management
//!
//! Index, parallelism and logging settings. Loadable from TOML:
//!
//! ```toml
//! [index]
//! dimension = 128
//! max_elements = 100000
//! space = "Euclidean"
//!
//! [parallel]
//! num_threads = 8
//! grain_size = 64
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub parallel: ParallelConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from a TOML string. Missing sections take defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(|e| Error::Configuration {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Configuration {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Configuration {
            message: e.to_string(),
        })
    }

    /// Write as a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Reject settings no index can be built from
    pub fn validate(&self) -> Result<()> {
        if self.index.dimension == 0 {
            return Err(Error::Configuration {
                message: "index.dimension must be at least 1".to_string(),
            });
        }
        if self.index.m < 2 {
            return Err(Error::Configuration {
                message: format!("index.m must be at least 2, got {}", self.index.m),
            });
        }
        Ok(())
    }
}

/// Metric space an index is built over.
///
/// Chooses the engine metric together with the vector normalization and the
/// distance transform surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpaceKind {
    /// Squared Euclidean distance
    L2,
    /// True Euclidean distance (squared internally, square-rooted on output)
    Euclidean,
    /// 1 - cosine similarity (vectors normalized on the way in)
    Cosine,
    /// 1 - inner product
    InnerProduct,
}

/// Engine implementation behind a batch index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    /// Exact brute-force search
    Flat,
    /// Navigable graph (approximate)
    Vamana,
}

/// Index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dimension: usize,
    pub max_elements: usize,
    pub space: SpaceKind,
    pub engine: EngineKind,
    /// Max out-degree per graph node
    pub m: usize,
    /// Search beam used while inserting
    pub ef_construction: usize,
    /// Search beam used by queries
    pub ef_search: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 128,
            max_elements: 10_000,
            space: SpaceKind::L2,
            engine: EngineKind::Vamana,
            m: 16,
            ef_construction: 200,
            ef_search: 10,
        }
    }
}

/// Batch parallelism configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Worker threads per batch call; 0 runs on the calling thread
    pub num_threads: usize,
    /// Minimum number of items per worker
    pub grain_size: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: 0,
            grain_size: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Text,
        }
    }
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by tracing filters
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    Text,
    Json,
}

//! Pawntrace Configuration System
//!
//! Provides configuration for the backtrace engine and its tooling:
//! - Settings files (`pawntrace.toml`, `~/.pawntrace/config.toml`)
//! - Call trace flags (`trace = "npf"`) and their filter (`trace_filter`)
//! - Backtrace limits and module search paths
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded and merged in the following order (later overrides earlier):
//! 1. Global config (~/.pawntrace/config.toml)
//! 2. Local config (./pawntrace.toml, searched upward)
//! 3. Environment variables (AMX_PATH, PAWNTRACE_TRACE)
//! 4. CLI flags
//!
//! # Example
//!
//! ```no_run
//! use pawntrace_config::ConfigLoader;
//! use std::path::Path;
//!
//! let mut loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("max depth: {}", config.limits.max_depth);
//! ```

pub mod loader;
pub mod settings;
pub mod trace;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Home directory not found")]
    HomeNotFound,
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader};
pub use settings::{BacktraceLimits, BacktraceSettings, SearchSettings, Settings};
pub use trace::{TraceFilter, TraceFlags};

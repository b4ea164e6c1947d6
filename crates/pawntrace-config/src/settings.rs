//! Settings files (pawntrace.toml, ~/.pawntrace/config.toml)
//!
//! Both files share one schema. Every field is optional so a local file can
//! override a single value of the global one.

use crate::trace::{TraceFilter, TraceFlags};
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default frame cap for bytecode frame walking
pub const DEFAULT_MAX_DEPTH: usize = 100;
/// Default number of arguments rendered per frame
pub const DEFAULT_MAX_ARGUMENTS: usize = 10;
/// Default length at which decoded strings are clipped
pub const DEFAULT_MAX_STRING_LENGTH: usize = 80;

/// Directories searched for compiled modules when none are configured
pub fn default_search_paths() -> Vec<PathBuf> {
    vec![PathBuf::from("gamemodes"), PathBuf::from("filterscripts")]
}

/// Contents of one settings file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Call trace flags ("n", "p", "f")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,

    /// Regular expression trace lines must match to be logged
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_filter: Option<String>,

    /// Backtrace limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backtrace: Option<BacktraceSettings>,

    /// Module search settings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchSettings>,
}

/// `[backtrace]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct BacktraceSettings {
    /// Maximum frames walked per public call (default: 100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,

    /// Maximum arguments printed per frame (default: 10)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_arguments: Option<usize>,

    /// Maximum characters printed per string argument (default: 80)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_string_length: Option<usize>,
}

/// `[search]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct SearchSettings {
    /// Directories scanned for .amx files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<PathBuf>>,
}

/// Effective backtrace limits after merging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacktraceLimits {
    pub max_depth: usize,
    pub max_arguments: usize,
    pub max_string_length: usize,
}

impl Default for BacktraceLimits {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_arguments: DEFAULT_MAX_ARGUMENTS,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
        }
    }
}

impl Settings {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate field values
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(trace) = &self.trace {
            TraceFlags::parse(trace)?;
        }

        if let Some(pattern) = &self.trace_filter {
            TraceFilter::parse(pattern)?;
        }

        if let Some(bt) = &self.backtrace {
            for (field, value) in [
                ("backtrace.max_depth", bt.max_depth),
                ("backtrace.max_arguments", bt.max_arguments),
                ("backtrace.max_string_length", bt.max_string_length),
            ] {
                if value == Some(0) {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_string(),
                        reason: "must be greater than zero".to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merge(self, other: Settings) -> Settings {
        let backtrace = match (self.backtrace, other.backtrace) {
            (Some(base), Some(top)) => Some(BacktraceSettings {
                max_depth: top.max_depth.or(base.max_depth),
                max_arguments: top.max_arguments.or(base.max_arguments),
                max_string_length: top.max_string_length.or(base.max_string_length),
            }),
            (base, top) => top.or(base),
        };

        let search = match (self.search, other.search) {
            (Some(base), Some(top)) => Some(SearchSettings {
                paths: top.paths.or(base.paths),
            }),
            (base, top) => top.or(base),
        };

        Settings {
            trace: other.trace.or(self.trace),
            trace_filter: other.trace_filter.or(self.trace_filter),
            backtrace,
            search,
        }
    }

    /// Effective limits, falling back to defaults
    pub fn limits(&self) -> BacktraceLimits {
        let defaults = BacktraceLimits::default();
        match &self.backtrace {
            Some(bt) => BacktraceLimits {
                max_depth: bt.max_depth.unwrap_or(defaults.max_depth),
                max_arguments: bt.max_arguments.unwrap_or(defaults.max_arguments),
                max_string_length: bt.max_string_length.unwrap_or(defaults.max_string_length),
            },
            None => defaults,
        }
    }

    /// Configured search paths, or the defaults
    pub fn search_paths(&self) -> Vec<PathBuf> {
        self.search
            .as_ref()
            .and_then(|s| s.paths.clone())
            .unwrap_or_else(default_search_paths)
    }
}

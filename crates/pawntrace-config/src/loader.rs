//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{BacktraceLimits, Settings};
use crate::trace::{TraceFilter, TraceFlags};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Local settings file name
pub const CONFIG_FILE_NAME: &str = "pawntrace.toml";

/// Extra module search directories, in the platform's path-list format
pub const ENV_AMX_PATH: &str = "AMX_PATH";

/// Replaces the `trace` option
pub const ENV_TRACE: &str = "PAWNTRACE_TRACE";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.pawntrace/config.toml) - lowest priority
/// 2. Local config (./pawntrace.toml) - overrides global
/// 3. Environment variables - overrides local
/// 4. CLI flags - highest priority (handled by caller)
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Call events to trace
    pub trace: TraceFlags,

    /// Only trace lines matching this are logged; `None` logs all of them
    pub trace_filter: Option<TraceFilter>,

    /// Backtrace limits
    pub limits: BacktraceLimits,

    /// Directories scanned for compiled modules, in search order
    pub search_paths: Vec<PathBuf>,

    /// Directory where pawntrace.toml was found
    pub config_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), None)
    }
}

impl Config {
    fn from_settings(settings: &Settings, config_root: Option<PathBuf>) -> Self {
        // Settings were validated on load; an unparsable trace string can only
        // come from a hand-built Settings and is treated as "no tracing".
        let trace = settings
            .trace
            .as_deref()
            .map(|s| TraceFlags::parse(s).unwrap_or_default())
            .unwrap_or_default();
        let trace_filter = settings
            .trace_filter
            .as_deref()
            .and_then(|p| TraceFilter::parse(p).ok());

        Self {
            trace,
            trace_filter,
            limits: settings.limits(),
            search_paths: settings.search_paths(),
            config_root,
        }
    }

    /// Check if a local pawntrace.toml was found
    pub fn has_local_config(&self) -> bool {
        self.config_root.is_some()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from a fixed path
    pub fn with_global_path(path: impl Into<PathBuf>) -> Self {
        Self {
            global_config_path: Some(path.into()),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find pawntrace.toml, then merges it over
    /// the global config and applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (config_root, local) = self.find_local_settings(start_dir)?;
        let global = self.load_global_settings().unwrap_or_default();

        let merged = global.merge(local);
        self.resolve(merged, config_root)
    }

    /// Load configuration from a specific settings file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let local = Settings::load_from_file(config_path)?;
        let global = self.load_global_settings().unwrap_or_default();

        let config_root = config_path.parent().map(|p| p.to_path_buf());
        self.resolve(global.merge(local), config_root)
    }

    fn resolve(&self, settings: Settings, config_root: Option<PathBuf>) -> ConfigResult<Config> {
        let mut config = Config::from_settings(&settings, config_root);
        self.apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Find local settings by walking up directory tree
    fn find_local_settings(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, Settings)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(CONFIG_FILE_NAME);

            if config_path.exists() {
                let settings = Settings::load_from_file(&config_path)?;
                return Ok((Some(current), settings));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, Settings::default())),
            }
        }
    }

    /// Load global settings from ~/.pawntrace/config.toml
    fn load_global_settings(&mut self) -> ConfigResult<Settings> {
        let path = match &self.global_config_path {
            Some(path) => path.clone(),
            None => {
                let path = Self::global_config_dir()?.join("config.toml");
                self.global_config_path = Some(path.clone());
                path
            }
        };

        // Global config is optional - if it doesn't exist, return default
        if !path.exists() {
            return Ok(Settings::default());
        }

        Settings::load_from_file(&path)
    }

    /// Apply environment variable overrides
    ///
    /// `AMX_PATH` directories are searched before configured ones.
    /// `PAWNTRACE_TRACE` replaces the trace flags outright.
    fn apply_env_overrides(&self, config: &mut Config) -> ConfigResult<()> {
        if let Some(amx_path) = env::var_os(ENV_AMX_PATH) {
            let mut paths: Vec<PathBuf> = env::split_paths(&amx_path)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            paths.append(&mut config.search_paths);
            config.search_paths = paths;
        }

        if let Ok(trace) = env::var(ENV_TRACE) {
            config.trace = TraceFlags::parse(&trace)?;
        }

        Ok(())
    }

    /// Get the global configuration directory (~/.pawntrace)
    pub fn global_config_dir() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".pawntrace"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_path(dir.path().join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_local_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "trace = \"p\"\n");

        let config = isolated_loader(&temp_dir)
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert!(config.trace.publics);
        assert!(config.has_local_config());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "[backtrace]\nmax_depth = 7\n");

        let sub_dir = temp_dir.path().join("gamemodes");
        fs::create_dir(&sub_dir).unwrap();

        let config = isolated_loader(&temp_dir)
            .load_from_directory(&sub_dir)
            .unwrap();

        assert_eq!(config.limits.max_depth, 7);
        assert_eq!(config.config_root.as_deref(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_no_config_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();

        let config = isolated_loader(&temp_dir)
            .load_from_directory(temp_dir.path())
            .unwrap();

        assert_eq!(config.trace, TraceFlags::NONE);
        assert_eq!(config.limits, BacktraceLimits::default());
        assert!(!config.has_local_config());
    }

    #[test]
    #[serial]
    fn test_env_amx_path_prepended() {
        let temp_dir = TempDir::new().unwrap();
        let extra = env::join_paths(["/srv/a", "/srv/b"]).unwrap();
        env::set_var(ENV_AMX_PATH, &extra);

        let config = isolated_loader(&temp_dir)
            .load_from_directory(temp_dir.path())
            .unwrap();

        env::remove_var(ENV_AMX_PATH);

        assert_eq!(
            config.search_paths,
            vec![
                PathBuf::from("/srv/a"),
                PathBuf::from("/srv/b"),
                PathBuf::from("gamemodes"),
                PathBuf::from("filterscripts"),
            ]
        );
    }

    #[test]
    #[serial]
    fn test_env_trace_override() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(temp_dir.path(), "trace = \"n\"\n");
        env::set_var(ENV_TRACE, "f");

        let config = isolated_loader(&temp_dir)
            .load_from_directory(temp_dir.path())
            .unwrap();

        env::remove_var(ENV_TRACE);

        assert!(!config.trace.natives);
        assert!(config.trace.functions);
    }

    #[test]
    #[serial]
    fn test_env_trace_invalid() {
        let temp_dir = TempDir::new().unwrap();
        env::set_var(ENV_TRACE, "zz");

        let result = isolated_loader(&temp_dir).load_from_directory(temp_dir.path());

        env::remove_var(ENV_TRACE);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}

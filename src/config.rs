//! Runtime configuration from a TOML file and `MODSWAP_*` environment variables.
//!
//! Precedence is defaults, then the file named by `MODSWAP_CONFIG` (if any),
//! then the environment. Invalid environment values fall back to whatever the
//! file or the defaults said, without failing. A file that cannot be read or
//! parsed is an error, since it was asked for explicitly.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MODSWAP_CONFIG` | unset | Path to a TOML config file |
//! | `MODSWAP_ORPHAN_THRESHOLD` | 10 | Polls before an unloading context is orphaned |
//! | `MODSWAP_PLUGIN_DIR` | plugins | Directory searched for module sources |
//! | `MODSWAP_SOURCE_EXT` | rs | Source file extension |
//! | `MODSWAP_DEBUG_BUILD` | true | Compile modules with debug symbols |
//! | `MODSWAP_TICK_INTERVAL_MS` | 16 | Tick driver period (ms) |
//! | `MODSWAP_LOG_LEVEL` | info | Log filter directive |
//! | `MODSWAP_LOG_FORMAT` | pretty | `pretty` or `json` |
//! | `MODSWAP_LOG_FILE` | unset | Write logs to this file instead of stderr |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::lifecycle::DEFAULT_ORPHAN_THRESHOLD;
use crate::pipeline::PipelineConfig;
use crate::telemetry::{LogConfig, LogFormat};

pub const CONFIG_PATH_VAR: &str = "MODSWAP_CONFIG";

const DEFAULT_TICK_INTERVAL_MS: u64 = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Keys accepted in the config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub orphan_threshold: Option<u32>,
    pub plugin_dir: Option<PathBuf>,
    pub source_extension: Option<String>,
    pub debug_build: Option<bool>,
    pub tick_interval_ms: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub log_file: Option<PathBuf>,
}

impl FileConfig {
    pub fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &contents)
    }
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub config_file: Option<PathBuf>,
    pub orphan_threshold: u32,
    pub plugin_dir: PathBuf,
    pub source_extension: String,
    pub debug_build: bool,
    pub tick_interval_ms: u64,
    pub log_level: String,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
}

/// All runtime configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_file: Option<PathBuf>,
    pub orphan_threshold: u32,
    pub pipeline: PipelineConfig,
    pub tick_interval: Duration,
    pub log: LogConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            orphan_threshold: DEFAULT_ORPHAN_THRESHOLD,
            pipeline: PipelineConfig::default(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            log: LogConfig::default(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an env var, returning `current` on missing or invalid.
fn parse_env<T: std::str::FromStr>(key: &str, current: T) -> T {
    match env_string(key) {
        Some(val) => val.trim().parse::<T>().unwrap_or(current),
        None => current,
    }
}

fn parse_bool(key: &str, current: bool) -> bool {
    match env_string(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => current,
    }
}

impl EnvConfig {
    /// Layer a config file over the defaults.
    pub fn from_file_config(file: FileConfig) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = file.orphan_threshold {
            cfg.orphan_threshold = v;
        }
        if let Some(v) = file.plugin_dir {
            cfg.pipeline.plugin_dir = v;
        }
        if let Some(v) = file.source_extension {
            cfg.pipeline.source_extension = v;
        }
        if let Some(v) = file.debug_build {
            cfg.pipeline.debug = v;
        }
        if let Some(v) = file.tick_interval_ms {
            cfg.tick_interval = Duration::from_millis(v);
        }
        if let Some(v) = file.log_level {
            cfg.log.level = v;
        }
        if let Some(v) = file.log_format {
            cfg.log.format = v;
        }
        if file.log_file.is_some() {
            cfg.log.output_path = file.log_file;
        }
        cfg.clamp()
    }

    /// Layer the environment over `self`.
    pub fn with_env_overrides(mut self) -> Self {
        self.orphan_threshold = parse_env("MODSWAP_ORPHAN_THRESHOLD", self.orphan_threshold);
        if let Some(dir) = env_string("MODSWAP_PLUGIN_DIR") {
            self.pipeline.plugin_dir = PathBuf::from(dir);
        }
        if let Some(ext) = env_string("MODSWAP_SOURCE_EXT") {
            self.pipeline.source_extension = ext;
        }
        self.pipeline.debug = parse_bool("MODSWAP_DEBUG_BUILD", self.pipeline.debug);
        let tick_ms = parse_env("MODSWAP_TICK_INTERVAL_MS", self.tick_interval.as_millis() as u64);
        self.tick_interval = Duration::from_millis(tick_ms);
        if let Some(level) = env_string("MODSWAP_LOG_LEVEL") {
            self.log.level = level;
        }
        self.log.format = parse_env("MODSWAP_LOG_FORMAT", self.log.format);
        if let Some(file) = env_string("MODSWAP_LOG_FILE") {
            self.log.output_path = Some(PathBuf::from(file));
        }
        self.clamp()
    }

    fn clamp(mut self) -> Self {
        self.orphan_threshold = self.orphan_threshold.max(1);
        self.tick_interval = self.tick_interval.max(Duration::from_millis(1));
        let ext = self.pipeline.source_extension.trim().trim_start_matches('.');
        self.pipeline.source_extension = if ext.is_empty() { "rs".to_string() } else { ext.to_string() };
        self
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            config_file: self.config_file.clone(),
            orphan_threshold: self.orphan_threshold,
            plugin_dir: self.pipeline.plugin_dir.clone(),
            source_extension: self.pipeline.source_extension.clone(),
            debug_build: self.pipeline.debug,
            tick_interval_ms: self.tick_interval.as_millis() as u64,
            log_level: self.log.level.clone(),
            log_format: self.log.format,
            log_file: self.log.output_path.clone(),
        }
    }
}

/// Load configuration: defaults, then `file` if given, then the environment.
pub fn load_from(file: Option<&Path>) -> Result<EnvConfig, ConfigError> {
    let mut cfg = match file {
        Some(path) => EnvConfig::from_file_config(FileConfig::read(path)?),
        None => EnvConfig::default(),
    };
    cfg.config_file = file.map(Path::to_path_buf);
    Ok(cfg.with_env_overrides())
}

/// Load configuration using the file named by `MODSWAP_CONFIG`, if set.
pub fn load() -> Result<EnvConfig, ConfigError> {
    let file = env_string(CONFIG_PATH_VAR).map(PathBuf::from);
    load_from(file.as_deref())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests across the crate.
    pub(crate) static ENV_LOCK: Mutex<()> = Mutex::new(());

    pub(crate) const ENV_KEYS: &[&str] = &[
        "MODSWAP_CONFIG",
        "MODSWAP_ORPHAN_THRESHOLD",
        "MODSWAP_PLUGIN_DIR",
        "MODSWAP_SOURCE_EXT",
        "MODSWAP_DEBUG_BUILD",
        "MODSWAP_TICK_INTERVAL_MS",
        "MODSWAP_LOG_LEVEL",
        "MODSWAP_LOG_FORMAT",
        "MODSWAP_LOG_FILE",
    ];

    pub(crate) fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load().unwrap();
        assert_eq!(cfg.orphan_threshold, 10);
        assert_eq!(cfg.pipeline.plugin_dir, PathBuf::from("plugins"));
        assert_eq!(cfg.pipeline.source_extension, "rs");
        assert!(cfg.pipeline.debug);
        assert_eq!(cfg.tick_interval, Duration::from_millis(16));
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        assert!(cfg.config_file.is_none());
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MODSWAP_ORPHAN_THRESHOLD", "25");
        std::env::set_var("MODSWAP_PLUGIN_DIR", "/srv/mods");
        std::env::set_var("MODSWAP_SOURCE_EXT", ".script");
        std::env::set_var("MODSWAP_DEBUG_BUILD", "false");
        std::env::set_var("MODSWAP_LOG_FORMAT", "json");
        let cfg = load().unwrap();
        assert_eq!(cfg.orphan_threshold, 25);
        assert_eq!(cfg.pipeline.plugin_dir, PathBuf::from("/srv/mods"));
        assert_eq!(cfg.pipeline.source_extension, "script");
        assert!(!cfg.pipeline.debug);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_values_fall_back_and_floors_apply() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MODSWAP_ORPHAN_THRESHOLD", "0");
        std::env::set_var("MODSWAP_TICK_INTERVAL_MS", "not_a_number");
        std::env::set_var("MODSWAP_DEBUG_BUILD", "maybe");
        std::env::set_var("MODSWAP_LOG_FORMAT", "xml");
        let cfg = load().unwrap();
        assert_eq!(cfg.orphan_threshold, 1, "threshold has a floor of one poll");
        assert_eq!(cfg.tick_interval, Duration::from_millis(16));
        assert!(cfg.pipeline.debug);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_env_overrides_file() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modswap.toml");
        std::fs::write(
            &path,
            "orphan_threshold = 4\nplugin_dir = \"from-file\"\ntick_interval_ms = 50\nlog_format = \"json\"\n",
        )
        .unwrap();
        std::env::set_var(CONFIG_PATH_VAR, &path);
        std::env::set_var("MODSWAP_TICK_INTERVAL_MS", "5");

        let cfg = load().unwrap();
        assert_eq!(cfg.orphan_threshold, 4);
        assert_eq!(cfg.pipeline.plugin_dir, PathBuf::from("from-file"));
        assert_eq!(cfg.tick_interval, Duration::from_millis(5));
        assert_eq!(cfg.log.format, LogFormat::Json);
        assert_eq!(cfg.config_file.as_deref(), Some(path.as_path()));
        clear_env_vars();
    }

    #[test]
    fn test_bad_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modswap.toml");
        std::fs::write(&path, "orphan_treshold = 4\n").unwrap();
        assert!(matches!(load_from(Some(&path)), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            load_from(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_effective_config_serializes() {
        let cfg = EnvConfig::default().effective_config();
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["orphan_threshold"], 10);
        assert_eq!(json["log_format"], "pretty");
    }
}

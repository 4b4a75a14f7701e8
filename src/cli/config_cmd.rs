// Copyright 2024-2026 modswap Contributors
// SPDX-License-Identifier: Apache-2.0

//! Config CLI subcommands: show, defaults, validate.

use crate::config::{self, EffectiveConfig, EnvConfig};

use super::EXIT_CONFIG_ERROR;

/// Print effective config as key-value pairs, or JSON with `json`.
pub fn run_show(json: bool) -> i32 {
    match config::load() {
        Ok(env) => {
            print_config(&env.effective_config(), json);
            0
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            EXIT_CONFIG_ERROR
        }
    }
}

/// Print default config values (no file, no env overrides).
pub fn run_defaults(json: bool) {
    print_config(&EnvConfig::default().effective_config(), json);
}

/// Validate configuration for obvious misconfigurations.
///
/// Returns 0 if valid, 1 if any warnings are found, 2 if the config file is
/// unreadable.
pub fn run_validate() -> i32 {
    let env = match config::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };
    let warnings = validate(&env.effective_config());
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }

    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Problems worth flagging in an otherwise loadable configuration.
pub fn validate(cfg: &EffectiveConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !cfg.plugin_dir.is_dir() {
        warnings.push(format!(
            "MODSWAP_PLUGIN_DIR ({}) is not a directory; nothing will be discovered",
            cfg.plugin_dir.display()
        ));
    }

    if tracing_subscriber::EnvFilter::try_new(&cfg.log_level).is_err() {
        warnings.push(format!("MODSWAP_LOG_LEVEL ({}) is not a valid filter", cfg.log_level));
    }

    if cfg.source_extension.contains(['/', '\\']) {
        warnings.push(format!(
            "MODSWAP_SOURCE_EXT ({}) contains a path separator",
            cfg.source_extension
        ));
    }

    warnings
}

fn print_config(cfg: &EffectiveConfig, json: bool) {
    if json {
        match serde_json::to_string_pretty(cfg) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("ERROR: {}", e),
        }
        return;
    }

    if let Some(file) = &cfg.config_file {
        println!("MODSWAP_CONFIG={}", file.display());
    }
    println!("MODSWAP_ORPHAN_THRESHOLD={}", cfg.orphan_threshold);
    println!("MODSWAP_PLUGIN_DIR={}", cfg.plugin_dir.display());
    println!("MODSWAP_SOURCE_EXT={}", cfg.source_extension);
    println!("MODSWAP_DEBUG_BUILD={}", cfg.debug_build);
    println!("MODSWAP_TICK_INTERVAL_MS={}", cfg.tick_interval_ms);
    println!("MODSWAP_LOG_LEVEL={}", cfg.log_level);
    println!("MODSWAP_LOG_FORMAT={}", cfg.log_format);
    if let Some(file) = &cfg.log_file {
        println!("MODSWAP_LOG_FILE={}", file.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::{clear_env_vars, ENV_LOCK};

    #[test]
    fn test_validate_flags_missing_plugin_dir() {
        let mut cfg = EnvConfig::default().effective_config();
        cfg.plugin_dir = "/definitely/not/here".into();
        let warnings = validate(&cfg);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("MODSWAP_PLUGIN_DIR"));
    }

    #[test]
    fn test_validate_flags_bad_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = EnvConfig::default().effective_config();
        cfg.plugin_dir = dir.path().to_path_buf();
        cfg.log_level = "modswap=loud".into();
        assert_eq!(validate(&cfg).len(), 1);
    }

    #[test]
    fn test_validate_passes_with_existing_plugin_dir() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("MODSWAP_PLUGIN_DIR", dir.path());
        assert_eq!(run_validate(), 0);
        clear_env_vars();
    }

    #[test]
    fn test_unreadable_config_file_is_config_error() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("MODSWAP_CONFIG", "/definitely/not/here.toml");
        assert_eq!(run_validate(), EXIT_CONFIG_ERROR);
        assert_eq!(run_show(false), EXIT_CONFIG_ERROR);
        clear_env_vars();
    }
}

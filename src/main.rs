// Copyright 2024-2026 modswap Contributors
// SPDX-License-Identifier: Apache-2.0

//! modswap entry point.
//!
//! The lifecycle itself runs inside an embedding host; this binary is the
//! operator's view of it: configuration inspection and plugin directory scans.
//!
//! ## CLI Subcommands
//!
//! - `modswap config show|defaults|validate` - Configuration
//! - `modswap scan [DIR]` - Discovery report
//! - `modswap version` - Version information

use std::process::ExitCode;

use modswap::cli::{config_cmd, scan_cmd};
use modswap::config;
use modswap::telemetry::init_logging;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");
    let json = args.iter().skip(2).any(|a| a == "--json");

    init_logging_from_env();

    match command {
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" | "--json" => exit_code(config_cmd::run_show(json)),
                "defaults" => {
                    config_cmd::run_defaults(json);
                    ExitCode::SUCCESS
                }
                "validate" => exit_code(config_cmd::run_validate()),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "scan" => {
            let dir = args.iter().skip(2).map(|s| s.as_str()).find(|a| !a.starts_with("--"));
            exit_code(scan_cmd::run_scan(dir, json))
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("modswap {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(code.clamp(0, 255) as u8)
}

/// Logging problems are reported but never stop a CLI command.
fn init_logging_from_env() {
    let log = match config::load() {
        Ok(env) => env.log,
        Err(_) => config::EnvConfig::default().log,
    };
    if let Err(e) = init_logging(&log) {
        eprintln!("WARNING: logging disabled: {}", e);
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "modswap - Hot-swappable module lifecycle v{}

USAGE:
    modswap [COMMAND] [OPTIONS]

COMMANDS:
    config       Inspect configuration (show, defaults, validate)
    scan         Report what discovery finds in the plugin directory
    version      Show version information
    help         Show this help message

OPTIONS:
    -h, --help     Show help for command
    -V, --version  Show version information
    --json         JSON output (config show, config defaults, scan)

EXAMPLES:
    modswap config show              # Effective configuration
    modswap config validate          # Check configuration
    modswap scan                     # Scan the configured plugin directory
    modswap scan ./plugins --json    # Scan a directory, JSON output

ENVIRONMENT:
    MODSWAP_CONFIG            Path to a TOML config file
    MODSWAP_PLUGIN_DIR        Plugin directory (default: plugins)
    MODSWAP_SOURCE_EXT        Source file extension (default: rs)
    MODSWAP_ORPHAN_THRESHOLD  Polls before an unload is orphaned (default: 10)
    MODSWAP_LOG_LEVEL         Log filter (default: info)
    MODSWAP_LOG_FORMAT        pretty or json

EXIT CODES:
    0  Success
    1  Failure / validation warnings
    2  Configuration error
",
        version
    );
}

/// Print detailed help for a specific command.
fn print_command_help(command: &str) {
    match command {
        "config" => {
            eprintln!(
                "modswap config - Inspect configuration

USAGE:
    modswap config <SUBCOMMAND> [--json]

SUBCOMMANDS:
    show      Effective configuration: defaults, then MODSWAP_CONFIG, then env
    defaults  Built-in defaults only
    validate  Check the effective configuration

EXIT CODES:
    0  Valid
    1  Warnings found
    2  Config file unreadable or malformed

EXAMPLES:
    modswap config show
    modswap config show --json
    MODSWAP_CONFIG=modswap.toml modswap config validate
"
            );
        }
        "scan" => {
            eprintln!(
                "modswap scan - Discovery report

USAGE:
    modswap scan [DIR] [--json]

DESCRIPTION:
    Lists every input the load pipeline would consider in DIR (default:
    MODSWAP_PLUGIN_DIR): single source files first, then directories, then
    links. Each entry shows the assembly name it would compile to and how
    many source files it holds. Nothing is compiled or loaded.

EXAMPLES:
    modswap scan
    modswap scan ./plugins --json
"
            );
        }
        "version" => {
            eprintln!(
                "modswap version - Show version information

USAGE:
    modswap version
"
            );
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }
}

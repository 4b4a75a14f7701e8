// Copyright 2024-2026 modswap Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommands for the `modswap` binary.
//!
//! None of these touch a running host. They inspect configuration and the
//! plugin directory so a module layout can be checked before it is loaded.
//!
//! ## Usage
//!
//! ```bash
//! modswap config show       # Effective configuration
//! modswap config validate   # Check configuration, exit 1 on problems
//! modswap scan [DIR]        # Report what discovery would compile
//! ```

pub mod config_cmd;
pub mod scan_cmd;

pub use config_cmd::{run_defaults, run_show, run_validate};
pub use scan_cmd::{run_scan, scan, ScanEntry};

/// Exit code for configuration errors.
pub const EXIT_CONFIG_ERROR: i32 = 2;

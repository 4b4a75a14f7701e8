// Copyright 2024-2026 modswap Contributors
// SPDX-License-Identifier: Apache-2.0

//! `scan`: report what discovery finds without compiling anything.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config;
use crate::pipeline::{discover, find_sources, LinkResolver, SymlinkResolver};

use super::EXIT_CONFIG_ERROR;

/// One discovered input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanEntry {
    pub path: PathBuf,
    /// `None` when the input holds no matching sources.
    pub assembly_name: Option<String>,
    pub source_files: usize,
}

/// Discover inputs in `plugin_dir` and describe each one.
pub fn scan(plugin_dir: &Path, extension: &str, resolver: &dyn LinkResolver) -> std::io::Result<Vec<ScanEntry>> {
    discover(plugin_dir, extension, resolver)?
        .into_iter()
        .map(|path| -> std::io::Result<ScanEntry> {
            let sources = find_sources(&path, extension)?;
            Ok(ScanEntry {
                assembly_name: sources.as_ref().map(|s| s.assembly_name.clone()),
                source_files: sources.map(|s| s.files.len()).unwrap_or(0),
                path,
            })
        })
        .collect()
}

/// Scan `dir`, or the configured plugin directory when `dir` is `None`.
pub fn run_scan(dir: Option<&str>, json: bool) -> i32 {
    let env = match config::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            return EXIT_CONFIG_ERROR;
        }
    };
    let plugin_dir = dir.map(PathBuf::from).unwrap_or(env.pipeline.plugin_dir);
    let extension = env.pipeline.source_extension;

    let entries = match scan(&plugin_dir, &extension, &SymlinkResolver) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("ERROR: cannot scan {}: {}", plugin_dir.display(), e);
            return 1;
        }
    };

    if json {
        match serde_json::to_string_pretty(&entries) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("ERROR: {}", e);
                return 1;
            }
        }
        return 0;
    }

    println!("Scanning {} for *.{}", plugin_dir.display(), extension);
    if entries.is_empty() {
        println!("  (nothing found)");
    }
    for entry in &entries {
        match &entry.assembly_name {
            Some(name) => println!("  {:<24} {} file(s)  {}", name, entry.source_files, entry.path.display()),
            None => println!("  {:<24} skipped    {}", "-", entry.path.display()),
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::NoLinks;

    #[test]
    fn test_scan_reports_assemblies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Quick.rs"), "").unwrap();
        std::fs::create_dir(dir.path().join("Inventory")).unwrap();
        std::fs::write(dir.path().join("Inventory").join("lib.rs"), "").unwrap();
        std::fs::create_dir(dir.path().join("Empty")).unwrap();

        let entries = scan(dir.path(), "rs", &NoLinks).unwrap();
        let names: Vec<Option<&str>> = entries.iter().map(|e| e.assembly_name.as_deref()).collect();
        assert_eq!(names, vec![Some("Quick"), None, Some("Inventory")]);
        assert_eq!(entries[2].source_files, 1);
    }

    #[test]
    fn test_scan_missing_dir_fails() {
        assert_eq!(run_scan(Some("/definitely/not/here"), false), 1);
    }
}

//! Discovery of compile inputs in the plugin directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::link::LinkResolver;

/// Top-level inputs of `plugin_dir`, in this order: source files with
/// `extension`, directories, then resolved link targets. Each group is sorted.
pub fn discover(plugin_dir: &Path, extension: &str, resolver: &dyn LinkResolver) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();
    let mut links = Vec::new();

    for entry in fs::read_dir(plugin_dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            links.push(path);
        } else if file_type.is_dir() {
            dirs.push(path);
        } else if has_extension(&path, extension) {
            files.push(path);
        }
    }

    files.sort();
    dirs.sort();
    links.sort();

    let mut inputs = files;
    inputs.extend(dirs);
    for target in resolver.resolve_all(&links) {
        if !inputs.contains(&target) {
            inputs.push(target);
        }
    }
    Ok(inputs)
}

/// Sources making up one module, and the assembly name they compile to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSet {
    pub assembly_name: String,
    pub files: Vec<PathBuf>,
}

/// A single source file compiles to an assembly named after its stem; a
/// directory compiles every matching file beneath it under the directory's name.
pub fn find_sources(path: &Path, extension: &str) -> io::Result<Option<SourceSet>> {
    if path.is_file() {
        if !has_extension(path, extension) {
            return Ok(None);
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(None);
        };
        return Ok(Some(SourceSet {
            assembly_name: stem.to_string(),
            files: vec![path.to_path_buf()],
        }));
    }

    if !path.is_dir() {
        return Ok(None);
    }

    let mut files = Vec::new();
    collect_sources(path, extension, &mut files)?;
    if files.is_empty() {
        return Ok(None);
    }
    files.sort();

    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return Ok(None);
    };
    Ok(Some(SourceSet { assembly_name: name.to_string(), files }))
}

fn collect_sources(dir: &Path, extension: &str, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_sources(&path, extension, out)?;
        } else if has_extension(&path, extension) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension.trim_start_matches('.')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::link::NoLinks;

    #[test]
    fn test_discover_files_then_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.rs"), "").unwrap();
        fs::write(dir.path().join("a.rs"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::create_dir(dir.path().join("Inventory")).unwrap();

        let inputs = discover(dir.path(), "rs", &NoLinks).unwrap();
        assert_eq!(
            inputs,
            vec![dir.path().join("a.rs"), dir.path().join("b.rs"), dir.path().join("Inventory")]
        );
    }

    #[test]
    fn test_find_sources_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("Quick.rs");
        fs::write(&file, "").unwrap();

        let set = find_sources(&file, "rs").unwrap().unwrap();
        assert_eq!(set.assembly_name, "Quick");
        assert_eq!(set.files, vec![file]);
        assert!(find_sources(&dir.path().join("missing.rs"), "rs").unwrap().is_none());
    }

    #[test]
    fn test_find_sources_directory_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("Inventory");
        fs::create_dir_all(root.join("ui")).unwrap();
        fs::write(root.join("lib.rs"), "").unwrap();
        fs::write(root.join("ui").join("menu.rs"), "").unwrap();
        fs::write(root.join("README.md"), "").unwrap();

        let set = find_sources(&root, ".rs").unwrap().unwrap();
        assert_eq!(set.assembly_name, "Inventory");
        assert_eq!(set.files.len(), 2);
    }

    #[test]
    fn test_empty_directory_has_no_sources() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_sources(dir.path(), "rs").unwrap().is_none());
    }
}

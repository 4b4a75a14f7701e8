//! Link resolution for discovery inputs.

use std::path::{Path, PathBuf};

/// Turns a platform shortcut into the path it points at.
pub trait LinkResolver: Send + Sync {
    /// `None` for unsupported links and targets that do not exist.
    fn resolve(&self, link: &Path) -> Option<PathBuf>;

    /// Resolve each link, dropping failures and duplicates. Order is kept.
    fn resolve_all(&self, links: &[PathBuf]) -> Vec<PathBuf> {
        let mut targets: Vec<PathBuf> = Vec::new();
        for target in links.iter().filter_map(|link| self.resolve(link)) {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }
        targets
    }
}

/// Follows filesystem symbolic links one level.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymlinkResolver;

impl LinkResolver for SymlinkResolver {
    fn resolve(&self, link: &Path) -> Option<PathBuf> {
        let target = std::fs::read_link(link).ok()?;
        let target = if target.is_relative() {
            link.parent().map(|p| p.join(&target)).unwrap_or(target)
        } else {
            target
        };

        if target.exists() {
            Some(target)
        } else {
            tracing::debug!(link = %link.display(), target = %target.display(), "link target missing");
            None
        }
    }
}

/// Resolves nothing. For hosts without link support.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLinks;

impl LinkResolver for NoLinks {
    fn resolve(&self, _link: &Path) -> Option<PathBuf> {
        None
    }
}

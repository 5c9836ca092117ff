//! Source and header glob expansion
//!
//! Patterns are resolved relative to a package root and support `**`.
//! Source patterns yield regular files; header patterns yield the
//! directory containing each matched file (these become `-I` roots), or
//! the directory itself when a pattern matches one directly.

use crate::error::{BuildError, BuildResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Expand source patterns to absolute regular-file paths
pub fn collect_sources(root: &Path, patterns: &[String]) -> BuildResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        if Path::new(pattern).is_absolute() {
            // Absolute patterns are taken verbatim
            files.push(PathBuf::from(pattern));
            continue;
        }
        for path in expand(root, pattern)? {
            if path.is_file() {
                files.push(path);
            }
        }
    }
    Ok(files)
}

/// Expand header patterns to a deduplicated, sorted set of include
/// directories
pub fn collect_include_dirs(root: &Path, patterns: &[String]) -> BuildResult<Vec<PathBuf>> {
    let mut dirs = BTreeSet::new();
    for pattern in patterns {
        if Path::new(pattern).is_absolute() {
            dirs.insert(PathBuf::from(pattern));
            continue;
        }
        for path in expand(root, pattern)? {
            if path.is_dir() {
                dirs.insert(path);
            } else if let Some(parent) = path.parent() {
                dirs.insert(parent.to_path_buf());
            }
        }
    }
    Ok(dirs.into_iter().collect())
}

/// Run one glob pattern rooted at the package directory
fn expand(root: &Path, pattern: &str) -> BuildResult<Vec<PathBuf>> {
    let full = root.join(pattern);
    let full = full
        .to_str()
        .ok_or_else(|| BuildError::glob(pattern, "pattern is not valid UTF-8"))?;

    let paths = glob::glob(full).map_err(|e| BuildError::glob(pattern, e))?;

    let mut matches = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| BuildError::glob(pattern, e))?;
        matches.push(path);
    }
    Ok(matches)
}

//! Compiler discovery
//!
//! Consults the `CC`/`CXX` environment variables first (either one
//! stands in for the other when only one is set), then falls back to a
//! fixed search list probed against `PATH`.

use crate::error::{BuildError, BuildResult};
use std::env;
use std::path::PathBuf;

const COMMON_C_COMPILERS: &[&str] = &["clang", "gcc", "icx", "icc", "tcc", "cl"];
const COMMON_CXX_COMPILERS: &[&str] = &[
    "clang++", "g++", "clang", "gcc", "icpx", "icx", "icpc", "icc", "cl",
];

/// The C and C++ drivers chosen for this build
#[derive(Debug, Clone, Default)]
pub struct Toolchain {
    pub cc: Option<String>,
    pub cxx: Option<String>,
}

impl Toolchain {
    /// Discover the host toolchain
    pub fn detect() -> Self {
        Self {
            cc: find_compiler(false),
            cxx: find_compiler(true),
        }
    }

    /// The driver for a source language; errors when none was found
    pub fn for_source(&self, cxx: bool) -> BuildResult<String> {
        let chosen = if cxx { &self.cxx } else { &self.cc };
        chosen
            .clone()
            .ok_or(BuildError::NoCompiler { cxx })
    }
}

/// Find a suitable C or C++ compiler on the system
pub fn find_compiler(need_cxx: bool) -> Option<String> {
    let cc = env::var("CC").ok().filter(|s| !s.is_empty());
    let cxx = env::var("CXX").ok().filter(|s| !s.is_empty());

    if need_cxx {
        if let Some(cxx) = cxx.clone() {
            return Some(cxx);
        }
    } else if let Some(cc) = cc.clone() {
        return Some(cc);
    }
    if let Some(cxx) = cxx {
        return Some(cxx);
    }
    if let Some(cc) = cc {
        return Some(cc);
    }

    let candidates = if need_cxx {
        COMMON_CXX_COMPILERS
    } else {
        COMMON_C_COMPILERS
    };
    for candidate in candidates {
        if let Some(path) = lookup_path(candidate) {
            return Some(path);
        }
    }

    None
}

/// Search `PATH` for an executable by name
fn lookup_path(name: &str) -> Option<String> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate.to_string_lossy().into_owned());
        }
        if cfg!(windows) {
            let candidate = dir.join(format!("{name}.exe"));
            if is_executable(&candidate) {
                return Some(candidate.to_string_lossy().into_owned());
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &PathBuf) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &PathBuf) -> bool {
    path.is_file()
}

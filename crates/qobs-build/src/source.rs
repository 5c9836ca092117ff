//! Dependency source strings
//!
//! A dependency source is resolved in order: the `git:` prefix (or a
//! `.git` suffix), a hosting shortcut (`gh:`, `gl:`, `bb:`, `sr:`,
//! `cb:`), a URL with a scheme and host (an archive, optionally carrying
//! an `#MD5=<hex>` suffix), and finally a filesystem path. Git URLs may
//! carry `@<branch>` and `#<commit-or-tag>` suffixes, in that order from
//! the base URL.
//!
//! Parsing lives here; materialisation is behind the [`Fetcher`] trait
//! so network backends stay out of the build engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Hosting shortcuts accepted in dependency strings
fn shortcuts() -> &'static BTreeMap<&'static str, &'static str> {
    static SHORTCUTS: OnceLock<BTreeMap<&'static str, &'static str>> = OnceLock::new();
    SHORTCUTS.get_or_init(|| {
        BTreeMap::from([
            ("gh:", "https://github.com/"),
            ("gl:", "https://gitlab.com/"),
            ("bb:", "https://bitbucket.org/"),
            ("sr:", "https://sr.ht/"),
            ("cb:", "https://codeberg.org/"),
        ])
    })
}

/// A parsed dependency source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySource {
    /// A git remote to clone
    Git {
        /// Clean clone URL, always ending in `.git`
        url: String,
        /// Branch from an `@<branch>` suffix
        branch: Option<String>,
        /// Commit or tag from a `#<rev>` suffix; forces a full clone
        /// followed by a detached checkout
        reference: Option<String>,
    },
    /// An archive to download and extract
    Archive {
        url: String,
        /// Expected MD5 from an `#MD5=<hex>` suffix
        md5: Option<String>,
    },
    /// A local directory used in place
    Path(PathBuf),
}

impl DependencySource {
    /// Parse a dependency source string
    pub fn parse(dep: &str) -> Result<Self, FetchError> {
        if dep.is_empty() {
            return Err(FetchError::new("empty or illegal dependency string"));
        }

        const GIT_PREFIX: &str = "git:";
        if let Some(rest) = dep.strip_prefix(GIT_PREFIX) {
            return Ok(parse_git_url(rest));
        }
        if dep.ends_with(".git") {
            return Ok(parse_git_url(dep));
        }

        for (shortcut, base) in shortcuts() {
            if let Some(rest) = dep.strip_prefix(shortcut) {
                return Ok(parse_git_url(&format!("{base}{rest}")));
            }
        }

        if is_url(dep) {
            let (url, md5) = match dep.split_once("#MD5=") {
                Some((url, md5)) => (url.to_string(), Some(md5.to_string())),
                None => (dep.to_string(), None),
            };
            return Ok(DependencySource::Archive { url, md5 });
        }

        Ok(DependencySource::Path(PathBuf::from(dep)))
    }

    /// Whether this source resolves in place, with no fetch step
    pub fn is_local(&self) -> bool {
        matches!(self, DependencySource::Path(_))
    }
}

/// `someone/something@branch#rev`: the `#rev` suffix is split off first,
/// then `@branch`; `.git` is appended to the base URL if missing
fn parse_git_url(raw: &str) -> DependencySource {
    let (base, reference) = match raw.split_once('#') {
        Some((base, rev)) => (base, Some(rev.to_string())),
        None => (raw, None),
    };
    let (mut url, branch) = match base.split_once('@') {
        Some((url, branch)) => (url.to_string(), Some(branch.to_string())),
        None => (base.to_string(), None),
    };

    if !url.ends_with(".git") {
        url.push_str(".git");
    }

    DependencySource::Git {
        url,
        branch,
        reference,
    }
}

/// A URL for our purposes has a scheme and a non-empty host
fn is_url(s: &str) -> bool {
    let Some((scheme, rest)) = s.split_once("://") else {
        return false;
    };
    !scheme.is_empty()
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
        && !rest.is_empty()
        && !rest.starts_with('/')
}

/// Fetcher failure, carrying a human-readable cause
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    message: String,
}

impl FetchError {
    /// Create a fetch error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Materialises a dependency source into a directory.
///
/// The build engine calls this as an opaque callback for git and archive
/// sources; path sources are used in place and never reach the fetcher.
pub trait Fetcher {
    fn fetch(&self, source: &DependencySource, dest: &Path) -> Result<(), FetchError>;
}

/// A fetcher with no network backends wired in.
///
/// Remote sources fail with an explanatory error; useful for offline
/// builds where all dependencies are local paths or already fetched
/// under `build/_deps`.
pub struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    fn fetch(&self, source: &DependencySource, _dest: &Path) -> Result<(), FetchError> {
        let kind = match source {
            DependencySource::Git { .. } => "git",
            DependencySource::Archive { .. } => "archive",
            DependencySource::Path(_) => return Ok(()),
        };
        Err(FetchError::new(format!(
            "no fetch backend available for {kind} sources"
        )))
    }
}

//! Typed manifest sections (Qobs.toml)

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Merge a conditional sub-section into its base.
///
/// Field rules: sequences append, maps insert with overwrite on key
/// collision, booleans disjoin, scalars overwrite when the source is
/// non-zero. Each section implements this next to its declaration.
pub trait Merge {
    fn merge(&mut self, src: Self);
}

impl<V> Merge for BTreeMap<String, V> {
    fn merge(&mut self, src: Self) {
        for (key, value) in src {
            self.insert(key, value);
        }
    }
}

/// The `[package]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PackageSection {
    pub name: String,
    pub description: String,
    pub authors: Vec<String>,
    /// Build-script expression, run as a predicate at plan time
    pub build: Option<String>,
}

impl Merge for PackageSection {
    fn merge(&mut self, src: Self) {
        if !src.name.is_empty() {
            self.name = src.name;
        }
        if !src.description.is_empty() {
            self.description = src.description;
        }
        self.authors.extend(src.authors);
        if src.build.is_some() {
            self.build = src.build;
        }
    }
}

/// The `[target]` section
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TargetSection {
    /// Build a static library instead of an executable
    pub lib: bool,
    /// Contribute headers only; no artifact is produced
    pub header_only: bool,
    /// Source glob patterns, relative to the package root
    pub sources: Vec<String>,
    /// Header glob patterns; matched files contribute their directory
    pub headers: Vec<String>,
    /// Compile defines; an empty value means "defined, no value"
    pub defines: BTreeMap<String, String>,
    /// Libraries to link (`-l` names)
    pub links: Vec<String>,
    /// Extra compile flags
    pub cflags: Vec<String>,
}

impl Merge for TargetSection {
    fn merge(&mut self, src: Self) {
        self.lib |= src.lib;
        self.header_only |= src.header_only;
        self.sources.extend(src.sources);
        self.headers.extend(src.headers);
        self.defines.merge(src.defines);
        self.links.extend(src.links);
        self.cflags.extend(src.cflags);
    }
}

/// Optimisation level: an integer 0-3 or a string, where the empty
/// string means "no -O flag"
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OptLevel {
    Level(i64),
    Text(String),
}

impl Default for OptLevel {
    fn default() -> Self {
        OptLevel::Text(String::new())
    }
}

impl OptLevel {
    /// The `-O<level>` compile flag, if any
    pub fn flag(&self) -> Option<String> {
        match self {
            OptLevel::Level(n) => Some(format!("-O{n}")),
            OptLevel::Text(s) if s.is_empty() => None,
            OptLevel::Text(s) => Some(format!("-O{s}")),
        }
    }
}

/// A `[profile.<name>]` entry
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProfileSection {
    pub opt_level: OptLevel,
}

/// The built-in profiles: `release` at -O3, `debug` with no -O flag
pub fn default_profiles() -> BTreeMap<String, ProfileSection> {
    let mut profiles = BTreeMap::new();
    profiles.insert(
        "release".to_string(),
        ProfileSection {
            opt_level: OptLevel::Level(3),
        },
    );
    profiles.insert(
        "debug".to_string(),
        ProfileSection {
            opt_level: OptLevel::Text(String::new()),
        },
    );
    profiles
}

/// A `[dependencies]` entry: either a bare source string or a table
/// with per-dependency feature selection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    /// `foo = "gh:owner/repo"`
    Source(String),
    /// `foo = { dep = "gh:owner/repo", default-features = false, features = ["x"] }`
    Detailed {
        dep: String,
        #[serde(default = "default_true", rename = "default-features")]
        default_features: bool,
        #[serde(default)]
        features: Vec<String>,
    },
}

fn default_true() -> bool {
    true
}

impl DependencySpec {
    /// The dependency source string
    pub fn source(&self) -> &str {
        match self {
            DependencySpec::Source(s) => s,
            DependencySpec::Detailed { dep, .. } => dep,
        }
    }

    /// Whether the dependency's default features are requested
    pub fn default_features(&self) -> bool {
        match self {
            DependencySpec::Source(_) => true,
            DependencySpec::Detailed {
                default_features, ..
            } => *default_features,
        }
    }

    /// Explicitly requested features
    pub fn features(&self) -> &[String] {
        match self {
            DependencySpec::Source(_) => &[],
            DependencySpec::Detailed { features, .. } => features,
        }
    }
}

/// A fully loaded manifest: typed sections after interpolation and
/// conditional merging, plus the resolved feature state
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub package: PackageSection,
    pub target: TargetSection,
    pub dependencies: BTreeMap<String, DependencySpec>,
    pub profile: BTreeMap<String, ProfileSection>,
    /// Feature graph: feature name -> sub-features or `dep/feature` requests
    pub features: BTreeMap<String, Vec<String>>,
    /// Own features enabled for this load
    pub enabled_features: BTreeSet<String>,
    /// Feature requests aimed at each dependency, from the enabled closure
    pub dep_features: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    /// Known profile names, sorted
    pub fn profiles(&self) -> Vec<String> {
        self.profile.keys().cloned().collect()
    }
}

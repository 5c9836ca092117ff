//! Qobs manifest model and loader
//!
//! Parses `Qobs.toml` manifests: typed sections, `{{ ... }}` string
//! interpolation, conditional sub-sections gated by expressions, and the
//! feature resolver that turns a requested feature list into the enabled
//! closure plus per-dependency feature requests.

pub mod error;
pub mod features;
pub mod loader;
pub mod manifest;

pub use error::{ConfigError, ConfigResult};
pub use features::{resolve_features, FeatureResolution};
pub use loader::{load_manifest, parse_manifest, MANIFEST_NAME};
pub use manifest::{
    DependencySpec, Manifest, Merge, OptLevel, PackageSection, ProfileSection, TargetSection,
};

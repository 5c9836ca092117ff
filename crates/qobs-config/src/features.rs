//! Feature resolution
//!
//! Computes the closure of enabled own-features and the per-dependency
//! feature requests from a requested feature list and the package's
//! feature graph. An entry `"x"` enables feature `x` (and, transitively,
//! whatever `features.x` lists); an entry `"a/b"` requests feature `b`
//! on dependency `a` and is not expanded locally.

use std::collections::{BTreeMap, BTreeSet};

/// Result of resolving a feature request against a feature graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureResolution {
    /// Enabled own-features
    pub enabled: BTreeSet<String>,
    /// Dependency name -> features requested on it
    pub dep_features: BTreeMap<String, Vec<String>>,
}

/// Resolve the requested features to a fixed point over the graph.
///
/// With `default_features`, the entries of the reserved `default`
/// feature seed the worklist alongside the explicit requests.
pub fn resolve_features(
    graph: &BTreeMap<String, Vec<String>>,
    requested: &[String],
    default_features: bool,
) -> FeatureResolution {
    let mut resolution = FeatureResolution::default();
    let mut worklist: Vec<String> = requested.to_vec();

    if default_features {
        if let Some(defaults) = graph.get("default") {
            worklist.extend(defaults.iter().cloned());
        }
    }

    while let Some(item) = worklist.pop() {
        if let Some((dep, feature)) = item.split_once('/') {
            let list = resolution.dep_features.entry(dep.to_string()).or_default();
            if !list.iter().any(|f| f == feature) {
                list.push(feature.to_string());
            }
            continue;
        }

        if !resolution.enabled.insert(item.clone()) {
            continue; // already enabled
        }
        if let Some(entries) = graph.get(&item) {
            worklist.extend(entries.iter().cloned());
        }
    }

    resolution
}

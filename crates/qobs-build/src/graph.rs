//! Dependency graph resolution
//!
//! Packages are held by name in a map owned by the graph; edges are
//! stored by name, never by pointer. Resolution runs in two passes: a
//! breadth-first fetch-and-parse that discovers the transitive
//! dependency set, then a fixpoint that unifies the feature requests
//! every parent aims at each package, reloading manifests as the
//! requests grow.

use crate::error::{BuildError, BuildResult};
use crate::msg;
use crate::source::{DependencySource, Fetcher};
use qobs_config::{load_manifest, DependencySpec, Manifest, MANIFEST_NAME};
use qobs_expr::Env;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

/// A single component (root package or dependency) in the build graph
#[derive(Debug, Clone)]
pub struct Package {
    /// Graph key: the name parents refer to this package by
    pub name: String,
    /// Absolute package root directory
    pub root: PathBuf,
    /// Manifest loaded under the final feature environment
    pub manifest: Manifest,
    /// Marks the user-invoked package
    pub is_root: bool,
}

impl Package {
    /// The artifact file name for this package (`my_app.exe`, `libmy_lib.a`, ...)
    pub fn artifact_name(&self) -> String {
        if self.manifest.target.lib {
            if cfg!(windows) {
                format!("{}.lib", self.name)
            } else {
                format!("lib{}.a", self.name)
            }
        } else if cfg!(windows) {
            format!("{}.exe", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// The resolved package graph
#[derive(Debug)]
pub struct PackageGraph {
    /// Packages by name
    pub packages: BTreeMap<String, Package>,
    root_name: String,
}

impl PackageGraph {
    /// The user-invoked package
    pub fn root(&self) -> &Package {
        &self.packages[&self.root_name]
    }
}

/// Resolve the transitive dependency graph rooted at `root`.
///
/// Remote dependencies are materialised under `deps_dir` through the
/// fetcher; path dependencies resolve in place, relative to the package
/// that first declared them.
pub fn resolve_graph(
    root: Package,
    env: &Env,
    deps_dir: &Path,
    fetcher: &dyn Fetcher,
) -> BuildResult<PackageGraph> {
    let root_name = root.name.clone();
    let mut packages = BTreeMap::new();
    let mut dep_specs: BTreeMap<String, (DependencySpec, PathBuf)> = BTreeMap::new();
    let mut queue = VecDeque::new();

    for (name, spec) in &root.manifest.dependencies {
        dep_specs.insert(name.clone(), (spec.clone(), root.root.clone()));
        queue.push_back(name.clone());
    }
    packages.insert(root_name.clone(), root);

    // Pass 1: fetch and parse every package once, with no features
    // requested and default features disabled, to discover the graph.
    while let Some(name) = queue.pop_front() {
        if packages.contains_key(&name) {
            continue;
        }

        let (spec, declared_in) = dep_specs
            .get(&name)
            .cloned()
            .ok_or_else(|| BuildError::MissingDependency { name: name.clone() })?;

        let pkg_root = materialise(&name, &spec, &declared_in, deps_dir, fetcher)?;
        let manifest = load_manifest(&pkg_root.join(MANIFEST_NAME), env, &[], false)?;

        if manifest.package.name != name {
            msg::warn(format!(
                "dependency {:?} has a mismatched package name: {:?}",
                name, manifest.package.name
            ));
        }

        for (child, child_spec) in &manifest.dependencies {
            match dep_specs.get(child) {
                Some((existing, _)) if existing.source() != child_spec.source() => {
                    msg::warn(format!(
                        "conflicting sources for dependency {:?}: using {:?}, ignoring {:?}",
                        child,
                        existing.source(),
                        child_spec.source()
                    ));
                }
                Some(_) => {}
                None => {
                    dep_specs.insert(child.clone(), (child_spec.clone(), pkg_root.clone()));
                }
            }
            queue.push_back(child.clone());
        }

        packages.insert(
            name.clone(),
            Package {
                name,
                root: pkg_root,
                manifest,
                is_root: false,
            },
        );
    }

    // Pass 2: unify feature requests to a fixed point. Each round
    // recomputes, for every non-root package, the union of requests its
    // parents aim at it; a change reloads the manifest so new closures
    // propagate to grandchildren on the next round.
    let mut final_features: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    final_features.insert(
        root_name.clone(),
        packages[&root_name].manifest.enabled_features.clone(),
    );

    let total_features: usize = packages
        .values()
        .map(|p| p.manifest.features.len())
        .sum();
    let max_rounds = (total_features + 2) * packages.len().max(1);
    let names: Vec<String> = packages.keys().cloned().collect();

    let mut rounds = 0;
    loop {
        let mut changed_package = None;

        for name in &names {
            if *name == root_name {
                continue;
            }

            let mut requested = BTreeSet::new();
            let mut use_defaults = false;
            for parent in packages.values() {
                if let Some(spec) = parent.manifest.dependencies.get(name) {
                    if spec.default_features() {
                        use_defaults = true;
                    }
                    requested.extend(spec.features().iter().cloned());
                    if let Some(from_closure) = parent.manifest.dep_features.get(name) {
                        requested.extend(from_closure.iter().cloned());
                    }
                }
            }

            // A package with no stored set yet always reloads, so the
            // defaults flag from its parents takes effect.
            if final_features.get(name) != Some(&requested) {
                changed_package = Some(name.clone());
                let request_list: Vec<String> = requested.iter().cloned().collect();
                final_features.insert(name.clone(), requested);

                let pkg = packages.get_mut(name).expect("package in graph");
                pkg.manifest = load_manifest(
                    &pkg.root.join(MANIFEST_NAME),
                    env,
                    &request_list,
                    use_defaults,
                )?;
            }
        }

        let Some(package) = changed_package else {
            break;
        };
        rounds += 1;
        if rounds > max_rounds {
            return Err(BuildError::FeatureFixpoint { package });
        }
    }

    Ok(PackageGraph {
        packages,
        root_name,
    })
}

/// Resolve a dependency spec to a package root directory, fetching it
/// under `deps_dir` when it is remote and not yet present
fn materialise(
    name: &str,
    spec: &DependencySpec,
    declared_in: &Path,
    deps_dir: &Path,
    fetcher: &dyn Fetcher,
) -> BuildResult<PathBuf> {
    let source = DependencySource::parse(spec.source()).map_err(|e| BuildError::Fetch {
        name: name.to_string(),
        source: e,
    })?;

    if let DependencySource::Path(path) = &source {
        let resolved = if path.is_absolute() {
            path.clone()
        } else {
            declared_in.join(path)
        };
        return fs::canonicalize(&resolved).map_err(|e| BuildError::io(resolved, e));
    }

    let dest = deps_dir.join(name);
    if !dest.is_dir() {
        fs::create_dir_all(&dest).map_err(|e| BuildError::io(&dest, e))?;
        fetcher.fetch(&source, &dest).map_err(|e| BuildError::Fetch {
            name: name.to_string(),
            source: e,
        })?;
    }
    Ok(dest)
}

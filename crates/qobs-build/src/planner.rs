//! Build planning
//!
//! Turns the resolved package graph into normalised build units (flags,
//! sources, object paths), orders them topologically, and classifies the
//! compile and link jobs a build actually needs based on the recorded
//! incremental state.

use crate::cc::Toolchain;
use crate::error::{BuildError, BuildResult};
use crate::globber;
use crate::graph::PackageGraph;
use crate::msg;
use crate::state::{HashCache, StateStore, TargetState};
use qobs_expr::Env;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

/// Directory under the build dir that holds object files
pub const OBJ_DIR: &str = "QobsFiles";

/// A source file and its object file path
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute source path
    pub src: PathBuf,
    /// Object path, relative to the build directory
    pub obj: PathBuf,
    /// C++ translation unit (selected by extension)
    pub is_cxx: bool,
}

/// A normalised build unit: one library or executable target
#[derive(Debug, Clone)]
pub struct BuildUnit {
    /// Target name
    pub name: String,
    /// Artifact file name inside the build directory
    pub artifact: String,
    /// Package root the sources were collected from
    pub base_dir: PathBuf,
    pub sources: Vec<SourceFile>,
    /// Names of library targets this unit links against (direct deps)
    pub dependencies: Vec<String>,
    pub is_lib: bool,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

/// A single compilation job
#[derive(Debug, Clone)]
pub struct CompileJob {
    pub src: PathBuf,
    /// Absolute object path
    pub obj: PathBuf,
    pub cflags: Vec<String>,
    pub compiler: String,
}

/// A single link (or archive) job
#[derive(Debug, Clone)]
pub struct LinkJob {
    pub target: String,
    pub out: PathBuf,
    pub objects: Vec<PathBuf>,
    /// Library artifacts of the dependency closure, linked into executables
    pub dep_artifacts: Vec<PathBuf>,
    pub ldflags: Vec<String>,
    pub is_lib: bool,
    /// Link driver; `ar` for libraries, the C or C++ compiler otherwise
    pub driver: String,
}

/// Whether a source file is C++ (else it is treated as C)
pub fn is_cxx_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("cc" | "cpp" | "cxx" | "c++")
    )
}

/// Derive build units for every non-header-only package in the graph.
///
/// Compile flags concatenate the profile flags, the target's extra
/// flags, `-I` for own and dependency include directories, and `-D`
/// defines. Link flags collect the target's own `-l` entries followed by
/// a depth-first walk of its library dependencies, first occurrence
/// winning. Build-script predicates run here, at plan time.
pub fn derive_units(
    graph: &PackageGraph,
    global_cflags: &[String],
    env: &Env,
) -> BuildResult<BTreeMap<String, BuildUnit>> {
    let mut units = BTreeMap::new();

    for pkg in graph.packages.values() {
        let target = &pkg.manifest.target;

        run_build_script(pkg, env)?;

        let mut cflags = global_cflags.to_vec();
        cflags.extend(target.cflags.iter().cloned());

        for dir in globber::collect_include_dirs(&pkg.root, &target.headers)? {
            cflags.push(format!("-I{}", dir.display()));
        }

        let mut dependencies = Vec::new();
        for dep_name in pkg.manifest.dependencies.keys() {
            let dep = graph.packages.get(dep_name).ok_or_else(|| {
                BuildError::internal(format!(
                    "resolved dependency {dep_name:?} not found in package map"
                ))
            })?;

            for dir in globber::collect_include_dirs(&dep.root, &dep.manifest.target.headers)? {
                cflags.push(format!("-I{}", dir.display()));
            }

            // Header-only dependencies contribute includes but no link
            if dep.manifest.target.header_only {
                continue;
            }
            if !dep.manifest.target.lib {
                return Err(BuildError::TargetKind {
                    package: pkg.name.clone(),
                    dependency: dep.name.clone(),
                });
            }
            dependencies.push(dep_name.clone());
        }

        for (define, value) in &target.defines {
            if value.is_empty() {
                cflags.push(format!("-D{define}"));
            } else {
                cflags.push(format!("-D{define}={value}"));
            }
        }

        let ldflags = collect_ldflags(graph, pkg.name.as_str(), &target.links);

        if target.header_only {
            continue;
        }

        let mut sources = Vec::new();
        for src in globber::collect_sources(&pkg.root, &target.sources)? {
            let rel = match src.strip_prefix(&pkg.root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => {
                    msg::warn(format!(
                        "source file {} is outside of base directory {}",
                        src.display(),
                        pkg.root.display()
                    ));
                    PathBuf::from(src.file_name().unwrap_or_default())
                }
            };
            let obj = Path::new(OBJ_DIR)
                .join(format!("{}.dir", pkg.name))
                .join(format!("{}.obj", rel.display()));
            let is_cxx = is_cxx_source(&src);
            sources.push(SourceFile { src, obj, is_cxx });
        }

        units.insert(
            pkg.name.clone(),
            BuildUnit {
                name: pkg.name.clone(),
                artifact: pkg.artifact_name(),
                base_dir: pkg.root.clone(),
                sources,
                dependencies,
                is_lib: target.lib,
                cflags,
                ldflags,
            },
        );
    }

    Ok(units)
}

/// Run a package's build-script expression as a predicate; anything
/// other than boolean `true` aborts the build
fn run_build_script(pkg: &crate::graph::Package, env: &Env) -> BuildResult<()> {
    let Some(script) = pkg.manifest.package.build.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(());
    };

    let script_env = env
        .clone()
        .with_features(pkg.manifest.enabled_features.iter().cloned().collect());

    let program = qobs_expr::compile(script, &script_env).map_err(|e| BuildError::Expression {
        expression: script.to_string(),
        source: e,
    })?;
    let result = program.run(&script_env).map_err(|e| BuildError::Expression {
        expression: script.to_string(),
        source: e,
    })?;

    if result.as_bool() != Some(true) {
        return Err(BuildError::BuildScript {
            package: pkg.name.clone(),
            expression: script.to_string(),
        });
    }
    Ok(())
}

/// Own `-l` flags first, then a depth-first walk over library
/// dependencies; duplicates collapse to their first occurrence
fn collect_ldflags(graph: &PackageGraph, name: &str, own_links: &[String]) -> Vec<String> {
    let mut ldflags = Vec::new();
    let mut seen_libs = BTreeSet::new();
    for lib in own_links {
        if seen_libs.insert(lib.clone()) {
            ldflags.push(format!("-l{lib}"));
        }
    }

    let mut visited = BTreeSet::new();
    visited.insert(name.to_string());
    let Some(pkg) = graph.packages.get(name) else {
        return ldflags;
    };
    for dep in pkg.manifest.dependencies.keys() {
        collect_dep_links(graph, dep, &mut visited, &mut seen_libs, &mut ldflags);
    }
    ldflags
}

fn collect_dep_links(
    graph: &PackageGraph,
    name: &str,
    visited: &mut BTreeSet<String>,
    seen_libs: &mut BTreeSet<String>,
    ldflags: &mut Vec<String>,
) {
    if !visited.insert(name.to_string()) {
        return;
    }
    let Some(pkg) = graph.packages.get(name) else {
        return;
    };
    for lib in &pkg.manifest.target.links {
        if seen_libs.insert(lib.clone()) {
            ldflags.push(format!("-l{lib}"));
        }
    }
    for child in pkg.manifest.dependencies.keys() {
        collect_dep_links(graph, child, visited, seen_libs, ldflags);
    }
}

/// Topologically order the build units with Kahn's algorithm.
///
/// Ties break lexicographically: the ready queue stays sorted and each
/// node's out-edges are relaxed in name order. A cycle fails with the
/// sorted list of implicated targets.
pub fn topological_order(units: &BTreeMap<String, BuildUnit>) -> BuildResult<Vec<String>> {
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

    for name in units.keys() {
        dependents.entry(name).or_default();
        in_degree.insert(name, 0);
    }
    for (name, unit) in units {
        for dep in &unit.dependencies {
            if !units.contains_key(dep) {
                return Err(BuildError::internal(format!(
                    "target {name:?} lists a non-existent dependency: {dep:?}"
                )));
            }
            dependents.entry(dep).or_default().push(name);
            *in_degree.get_mut(name.as_str()).expect("known target") += 1;
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(n, _)| *n)
        .collect();
    let mut order = Vec::with_capacity(units.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        let mut targets = dependents.get(name).cloned().unwrap_or_default();
        targets.sort_unstable();
        for dependent in targets {
            let degree = in_degree.get_mut(dependent).expect("known target");
            *degree -= 1;
            if *degree == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() != units.len() {
        // The undrained residue also holds targets that merely depend on
        // a cycle; peel those off so the error names the cycle itself.
        let mut residue: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(n, _)| *n)
            .collect();
        loop {
            let peel: Vec<&str> = residue
                .iter()
                .filter(|n| {
                    dependents
                        .get(*n)
                        .is_none_or(|ds| ds.iter().all(|d| !residue.contains(d)))
                })
                .copied()
                .collect();
            if peel.is_empty() {
                break;
            }
            for name in peel {
                residue.remove(name);
            }
        }

        let names = residue.into_iter().map(str::to_string).collect();
        return Err(BuildError::Cycle { names });
    }

    Ok(order)
}

/// Decide which compile and link jobs this build needs.
///
/// A source is dirty when its object file is missing, no prior state
/// exists, or its content hash changed. A target relinks when its
/// artifact is missing, its flags changed, an upstream library was
/// rebuilt this run or its recorded artifact hash no longer matches, or
/// any of its sources was dirty.
pub fn plan(
    units: &BTreeMap<String, BuildUnit>,
    order: &[String],
    state: &StateStore,
    cache: &mut HashCache,
    build_dir: &Path,
    toolchain: &Toolchain,
) -> BuildResult<(Vec<CompileJob>, Vec<LinkJob>)> {
    let mut compile_jobs = Vec::new();
    let mut link_jobs = Vec::new();
    let mut rebuilt: BTreeSet<&str> = BTreeSet::new();
    let mut cxx_memo = BTreeMap::new();

    for name in order {
        let unit = &units[name];
        let old_state = state.get(name);
        let mut needs_relink = false;

        if !build_dir.join(&unit.artifact).exists() {
            needs_relink = true;
        }

        if let Some(old) = old_state {
            if old.cflags != unit.cflags || old.ldflags != unit.ldflags {
                needs_relink = true;
            }
        }

        for dep in &unit.dependencies {
            if rebuilt.contains(dep.as_str()) {
                needs_relink = true;
                break;
            }
            let dep_artifact = build_dir.join(&units[dep].artifact);
            match cache.file_hash(&dep_artifact) {
                Ok(hash) => {
                    let recorded = old_state.and_then(|o| o.dependencies.get(dep));
                    if recorded != Some(&hash) {
                        needs_relink = true;
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    needs_relink = true;
                    break;
                }
                Err(e) => return Err(BuildError::io(dep_artifact, e)),
            }
        }

        let mut target_compile_jobs = Vec::new();
        for src in &unit.sources {
            let obj = build_dir.join(&src.obj);
            if is_source_dirty(src, &obj, old_state, cache)? {
                target_compile_jobs.push(CompileJob {
                    src: src.src.clone(),
                    obj,
                    cflags: unit.cflags.clone(),
                    compiler: toolchain.for_source(src.is_cxx)?,
                });
            }
        }

        if !target_compile_jobs.is_empty() {
            compile_jobs.extend(target_compile_jobs);
            needs_relink = true;
        }

        if needs_relink {
            rebuilt.insert(name.as_str());
            link_jobs.push(make_link_job(unit, units, build_dir, toolchain, &mut cxx_memo)?);
        }
    }

    Ok((compile_jobs, link_jobs))
}

fn is_source_dirty(
    src: &SourceFile,
    obj: &Path,
    state: Option<&TargetState>,
    cache: &mut HashCache,
) -> BuildResult<bool> {
    if !obj.exists() {
        return Ok(true);
    }
    let Some(state) = state else {
        return Ok(true);
    };

    let hash = cache
        .file_hash(&src.src)
        .map_err(|e| BuildError::io(&src.src, e))?;
    Ok(state.sources.get(&source_key(&src.src)) != Some(&hash))
}

fn make_link_job(
    unit: &BuildUnit,
    units: &BTreeMap<String, BuildUnit>,
    build_dir: &Path,
    toolchain: &Toolchain,
    cxx_memo: &mut BTreeMap<String, bool>,
) -> BuildResult<LinkJob> {
    let objects = unit
        .sources
        .iter()
        .map(|s| build_dir.join(&s.obj))
        .collect();

    // Library artifacts of the whole dependency closure, first
    // occurrence winning, so executables link transitively.
    let mut dep_artifacts = Vec::new();
    let mut visited = BTreeSet::new();
    collect_dep_artifacts(unit, units, build_dir, &mut visited, &mut dep_artifacts);

    let is_cxx = target_has_cxx(&unit.name, units, cxx_memo);
    let driver = if unit.is_lib {
        "ar".to_string()
    } else {
        toolchain.for_source(is_cxx)?
    };

    Ok(LinkJob {
        target: unit.name.clone(),
        out: build_dir.join(&unit.artifact),
        objects,
        dep_artifacts,
        ldflags: unit.ldflags.clone(),
        is_lib: unit.is_lib,
        driver,
    })
}

pub(crate) fn collect_dep_artifacts(
    unit: &BuildUnit,
    units: &BTreeMap<String, BuildUnit>,
    build_dir: &Path,
    visited: &mut BTreeSet<String>,
    out: &mut Vec<PathBuf>,
) {
    for dep in &unit.dependencies {
        if !visited.insert(dep.clone()) {
            continue;
        }
        if let Some(dep_unit) = units.get(dep) {
            out.push(build_dir.join(&dep_unit.artifact));
            collect_dep_artifacts(dep_unit, units, build_dir, visited, out);
        }
    }
}

/// Whether a target or any library in its dependency closure has a C++
/// translation unit; decides the link driver for executables
pub(crate) fn target_has_cxx(
    name: &str,
    units: &BTreeMap<String, BuildUnit>,
    memo: &mut BTreeMap<String, bool>,
) -> bool {
    if let Some(known) = memo.get(name) {
        return *known;
    }
    // Seed against cycles; the planner rejects them separately
    memo.insert(name.to_string(), false);

    let result = units.get(name).is_some_and(|unit| {
        unit.sources.iter().any(|s| s.is_cxx)
            || unit
                .dependencies
                .iter()
                .any(|dep| target_has_cxx(dep, units, memo))
    });
    memo.insert(name.to_string(), result);
    result
}

/// Rebuild a target's incremental record after a successful link.
///
/// Sources are rehashed (the per-run memo makes this cheap); an upstream
/// artifact that cannot be hashed is omitted with a warning so the next
/// run treats it as changed.
pub fn record_state(
    unit: &BuildUnit,
    units: &BTreeMap<String, BuildUnit>,
    build_dir: &Path,
    cache: &mut HashCache,
) -> BuildResult<TargetState> {
    let mut state = TargetState {
        cflags: unit.cflags.clone(),
        ldflags: unit.ldflags.clone(),
        ..Default::default()
    };

    for src in &unit.sources {
        let hash = cache
            .file_hash(&src.src)
            .map_err(|e| BuildError::io(&src.src, e))?;
        state.sources.insert(source_key(&src.src), hash);
    }

    for dep in &unit.dependencies {
        let Some(dep_unit) = units.get(dep) else {
            continue;
        };
        let artifact = build_dir.join(&dep_unit.artifact);
        match cache.file_hash(&artifact) {
            Ok(hash) => {
                state.dependencies.insert(dep.clone(), hash);
            }
            Err(e) => {
                msg::warn(format!(
                    "could not hash dependency {} for state update: {e}",
                    artifact.display()
                ));
            }
        }
    }

    Ok(state)
}

/// Canonical string key for a source path in the state file
pub fn source_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

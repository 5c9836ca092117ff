//! Build orchestration
//!
//! The [`Builder`] ties the pieces together: it loads the root manifest,
//! resolves the dependency graph, derives build units for the selected
//! profile, and hands them either to the in-process scheduler (the
//! `qobs` generator) or to the ninja back end.

use crate::cc::Toolchain;
use crate::error::{BuildError, BuildResult};
use crate::graph::{self, Package, PackageGraph};
use crate::msg;
use crate::ninja;
use crate::planner::{self, BuildUnit};
use crate::scheduler;
use crate::source::Fetcher;
use crate::state::{HashCache, StateStore};
use qobs_config::{load_manifest, Manifest, MANIFEST_NAME};
use qobs_expr::Env;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::str::FromStr;

/// Back end that executes the planned target list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Generator {
    /// The in-process incremental scheduler
    #[default]
    Qobs,
    /// Emit `build.ninja` and delegate to an external ninja
    Ninja,
}

impl Generator {
    /// Generator identifier as used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Generator::Qobs => "qobs",
            Generator::Ninja => "ninja",
        }
    }
}

impl FromStr for Generator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qobs" => Ok(Generator::Qobs),
            "ninja" => Ok(Generator::Ninja),
            other => Err(format!("unknown generator {other:?} (expected qobs or ninja)")),
        }
    }
}

impl std::fmt::Display for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives a build of the package rooted at a directory
pub struct Builder {
    manifest: Manifest,
    base_dir: PathBuf,
    env: Env,
    jobs: usize,
}

impl Builder {
    /// Create a builder for the package at the given path, loading its
    /// manifest under the requested feature set
    pub fn new(
        path: impl AsRef<Path>,
        features: &[String],
        default_features: bool,
    ) -> BuildResult<Self> {
        let base_dir = fs::canonicalize(path.as_ref())
            .map_err(|e| BuildError::io(path.as_ref(), e))?;
        let env = Env::host();
        let manifest = load_manifest(
            &base_dir.join(MANIFEST_NAME),
            &env,
            features,
            default_features,
        )?;

        Ok(Self {
            manifest,
            base_dir,
            env,
            jobs: num_cpus::get(),
        })
    }

    /// Bound the compile-job concurrency (zero keeps the default)
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        if jobs > 0 {
            self.jobs = jobs;
        }
        self
    }

    /// The root manifest
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The package root directory
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The build directory for this package
    pub fn build_dir(&self) -> PathBuf {
        self.base_dir.join("build")
    }

    /// Resolve the graph and build with the selected profile and back end
    pub fn build(
        &self,
        profile: &str,
        generator: Generator,
        fetcher: &dyn Fetcher,
    ) -> BuildResult<()> {
        let build_dir = self.build_dir();
        let deps_dir = build_dir.join("_deps");
        fs::create_dir_all(&deps_dir).map_err(|e| BuildError::io(&deps_dir, e))?;

        let global_cflags = self.profile_cflags(profile)?;

        let root = Package {
            name: self.manifest.package.name.clone(),
            root: self.base_dir.clone(),
            manifest: self.manifest.clone(),
            is_root: true,
        };
        let graph = graph::resolve_graph(root, &self.env, &deps_dir, fetcher)?;

        let units = planner::derive_units(&graph, &global_cflags, &self.env)?;
        let toolchain = Toolchain::detect();

        match generator {
            Generator::Qobs => self.invoke_scheduler(&units, &build_dir, &toolchain),
            Generator::Ninja => {
                let text = ninja::generate(&units, &toolchain)?;
                let build_file = build_dir.join(ninja::NINJA_FILE);
                fs::write(&build_file, text).map_err(|e| BuildError::io(&build_file, e))?;
                ninja::invoke(&build_dir)
            }
        }
    }

    /// Build, then execute the resulting binary with pass-through
    /// arguments and inherited stdio
    pub fn build_and_run(
        &self,
        args: &[String],
        profile: &str,
        generator: Generator,
        fetcher: &dyn Fetcher,
    ) -> BuildResult<ExitStatus> {
        if self.manifest.target.lib {
            return Err(BuildError::CantRunLib);
        }

        self.build(profile, generator, fetcher)?;

        let exe = self.build_dir().join(self.executable_name());
        Command::new(&exe)
            .args(args)
            .status()
            .map_err(|e| BuildError::io(exe, e))
    }

    /// Remove the build directory and everything in it
    pub fn clean(&self) -> BuildResult<()> {
        let build_dir = self.build_dir();
        if build_dir.exists() {
            fs::remove_dir_all(&build_dir).map_err(|e| BuildError::io(&build_dir, e))?;
        }
        Ok(())
    }

    fn profile_cflags(&self, profile: &str) -> BuildResult<Vec<String>> {
        match self.manifest.profile.get(profile) {
            Some(section) => Ok(section.opt_level.flag().into_iter().collect()),
            None => Err(BuildError::UnknownProfile {
                profile: profile.to_string(),
                known: self.manifest.profiles(),
            }),
        }
    }

    fn executable_name(&self) -> String {
        let name = &self.manifest.package.name;
        if cfg!(windows) {
            format!("{name}.exe")
        } else {
            name.clone()
        }
    }

    /// Plan against the recorded state and run the compile and link
    /// phases; state records are rewritten after each successful link
    fn invoke_scheduler(
        &self,
        units: &BTreeMap<String, BuildUnit>,
        build_dir: &Path,
        toolchain: &Toolchain,
    ) -> BuildResult<()> {
        let mut store = StateStore::load(build_dir);
        let mut cache = HashCache::new();

        let order = planner::topological_order(units)?;
        let (compile_jobs, link_jobs) =
            planner::plan(units, &order, &store, &mut cache, build_dir, toolchain)?;

        if compile_jobs.is_empty() && link_jobs.is_empty() {
            println!("qobs: no work to do.");
            return Ok(());
        }

        scheduler::run_compile_phase(&compile_jobs, self.jobs)?;
        scheduler::run_link_phase(&link_jobs)?;

        // Post-link bookkeeping is single-threaded so the on-disk record
        // stays consistent.
        for job in &link_jobs {
            let unit = &units[&job.target];
            match planner::record_state(unit, units, build_dir, &mut cache) {
                Ok(state) => store.set(unit.name.clone(), state),
                Err(e) => msg::warn(format!(
                    "failed to update build state for target {}: {e}",
                    unit.name
                )),
            }
        }
        store.save();

        Ok(())
    }
}

/// Expose the resolved graph and derived units for tooling and tests
pub fn resolve_units(
    builder: &Builder,
    profile: &str,
    fetcher: &dyn Fetcher,
) -> BuildResult<(PackageGraph, BTreeMap<String, BuildUnit>)> {
    let build_dir = builder.build_dir();
    let deps_dir = build_dir.join("_deps");
    fs::create_dir_all(&deps_dir).map_err(|e| BuildError::io(&deps_dir, e))?;

    let global_cflags = builder.profile_cflags(profile)?;
    let root = Package {
        name: builder.manifest.package.name.clone(),
        root: builder.base_dir.clone(),
        manifest: builder.manifest.clone(),
        is_root: true,
    };
    let graph = graph::resolve_graph(root, &builder.env, &deps_dir, fetcher)?;
    let units = planner::derive_units(&graph, &global_cflags, &builder.env)?;
    Ok((graph, units))
}

//! Qobs build engine
//!
//! The core of the Qobs build system for C and C++ projects:
//! - Transitive dependency resolution with feature unification
//! - Source globbing and per-target flag derivation
//! - A parallel, content-hashed, incremental compile/link scheduler
//! - An incremental state store for correct minimal rebuilds
//! - A ninja back end emitting the same normalised target list

pub mod builder;
pub mod cc;
pub mod error;
pub mod globber;
pub mod graph;
pub mod msg;
pub mod ninja;
pub mod planner;
pub mod scheduler;
pub mod source;
pub mod state;

pub use builder::{resolve_units, Builder, Generator};
pub use cc::{find_compiler, Toolchain};
pub use error::{BuildError, BuildResult};
pub use graph::{resolve_graph, Package, PackageGraph};
pub use planner::{BuildUnit, CompileJob, LinkJob, SourceFile};
pub use source::{DependencySource, FetchError, Fetcher, OfflineFetcher};
pub use state::{HashCache, StateStore, TargetState, STATE_FILE};

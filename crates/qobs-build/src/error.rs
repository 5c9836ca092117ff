//! Build error types

use qobs_config::ConfigError;
use qobs_expr::ExprError;
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown profile {profile:?}, known profiles: {}", .known.join(", "))]
    UnknownProfile {
        profile: String,
        known: Vec<String>,
    },

    #[error("failed to fetch dependency {name:?}: {source}")]
    Fetch {
        name: String,
        source: crate::source::FetchError,
    },

    #[error("dependency {name:?} is referenced but has no source spec")]
    MissingDependency { name: String },

    #[error("dependency cycle detected involving targets: {}", .names.join(", "))]
    Cycle { names: Vec<String> },

    #[error("package {package:?} depends on {dependency:?}, which is not a library (target.lib is false)")]
    TargetKind {
        package: String,
        dependency: String,
    },

    #[error("glob pattern {pattern:?} failed: {message}")]
    Glob { pattern: String, message: String },

    #[error("compile command failed: {command}")]
    Compile { command: String },

    #[error("link command failed: {command}")]
    Link { command: String },

    #[error("generator command failed: {command}")]
    Generator { command: String },

    #[error("build script for package {package:?} returned false\n{expression}")]
    BuildScript {
        package: String,
        expression: String,
    },

    #[error("in build script expression `{expression}`: {source}")]
    Expression {
        expression: String,
        source: ExprError,
    },

    #[error("feature resolution did not converge for package {package:?}; conflicting default-features requests?")]
    FeatureFixpoint { package: String },

    #[error("no {} compiler found; set {} or install one", if *.cxx { "C++" } else { "C" }, if *.cxx { "CXX" } else { "CC" })]
    NoCompiler { cxx: bool },

    #[error("can't run a library target (target.lib is true)")]
    CantRunLib,

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl BuildError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a glob error
    pub fn glob(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::Glob {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Create an internal invariant violation
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

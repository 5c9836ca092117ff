//! Typed evaluation environment
//!
//! The environment carries the host identity (`target_os`,
//! `target_arch`), a snapshot of the process environment (`environ`),
//! the set of enabled features for the current package, and a registry
//! of native functions. `feature(..)` is registered by default; build
//! hosts can expose further functions through [`Env::register_function`].

use crate::error::{ExprError, ExprResult};
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// A native function callable from expressions
pub type NativeFn = fn(&Env, &[Value]) -> ExprResult<Value>;

/// Evaluation environment for manifest expressions
#[derive(Clone)]
pub struct Env {
    target_os: String,
    target_arch: String,
    environ: HashMap<String, String>,
    features: HashSet<String>,
    functions: HashMap<String, NativeFn>,
}

impl Env {
    /// Create an environment describing the host, with a snapshot of the
    /// process environment and no features enabled
    pub fn host() -> Self {
        Self::new(
            host_os_name(),
            host_arch_name(),
            std::env::vars().collect(),
        )
    }

    /// Create an environment with explicit platform identity and environ
    pub fn new(
        target_os: impl Into<String>,
        target_arch: impl Into<String>,
        environ: HashMap<String, String>,
    ) -> Self {
        let mut env = Self {
            target_os: target_os.into(),
            target_arch: target_arch.into(),
            environ,
            features: HashSet::new(),
            functions: HashMap::new(),
        };
        env.register_function("feature", builtin_feature);
        env
    }

    /// Replace the enabled feature set
    pub fn with_features(mut self, features: HashSet<String>) -> Self {
        self.features = features;
        self
    }

    /// Register a native function under the given name
    pub fn register_function(&mut self, name: impl Into<String>, function: NativeFn) {
        self.functions.insert(name.into(), function);
    }

    /// The host operating system name (`linux`, `darwin`, `windows`, ...)
    pub fn target_os(&self) -> &str {
        &self.target_os
    }

    /// The host architecture name (`amd64`, `arm64`, ...)
    pub fn target_arch(&self) -> &str {
        &self.target_arch
    }

    /// The enabled feature set
    pub fn features(&self) -> &HashSet<String> {
        &self.features
    }

    /// Whether the environment declares the given identifier
    pub fn declares(&self, name: &str) -> bool {
        matches!(name, "target_os" | "target_arch" | "environ")
    }

    /// Whether the environment declares the given function
    pub fn declares_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Look up an identifier's value
    pub fn lookup(&self, name: &str) -> Option<Value> {
        match name {
            "target_os" => Some(Value::Str(self.target_os.clone())),
            "target_arch" => Some(Value::Str(self.target_arch.clone())),
            "environ" => Some(Value::Map(self.environ.clone())),
            _ => None,
        }
    }

    /// Call a registered native function
    pub fn call(&self, name: &str, args: &[Value]) -> ExprResult<Value> {
        match self.functions.get(name) {
            Some(function) => function(self, args),
            None => Err(ExprError::UnknownFunction {
                name: name.to_string(),
                offset: 0,
            }),
        }
    }
}

/// `feature(name, ...)` is true iff every named feature is enabled
fn builtin_feature(env: &Env, args: &[Value]) -> ExprResult<Value> {
    if args.is_empty() {
        return Err(ExprError::Argument {
            function: "feature".to_string(),
            message: "expected at least one feature name".to_string(),
        });
    }

    for arg in args {
        let name = match arg {
            Value::Str(s) => s,
            other => {
                return Err(ExprError::Argument {
                    function: "feature".to_string(),
                    message: format!("expected string argument, got {}", other.type_name()),
                })
            }
        };
        if !env.features.contains(name.as_str()) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

/// Map the Rust OS constant onto the vocabulary manifests use
fn host_os_name() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// Map the Rust architecture constant onto the vocabulary manifests use
fn host_arch_name() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        other => other,
    }
}

//! Manifest loading
//!
//! Loading happens in passes: decode the TOML into a raw value tree,
//! resolve features (so the expression environment carries the enabled
//! set before anything else is looked at), interpolate `{{ ... }}` in
//! every string, then unmarshal each recognised section.
//!
//! Within `package`, `dependencies`, `profile` and `target`, a key whose
//! value is a table and whose text compiles as an expression marks a
//! conditional sub-section: it is evaluated and, when it yields boolean
//! `true`, merged into the section base. Truthy sub-sections merge in
//! lexicographic order of their key text so colliding map keys resolve
//! deterministically.

use crate::error::{ConfigError, ConfigResult};
use crate::features::resolve_features;
use crate::manifest::{default_profiles, Manifest, Merge};
use qobs_expr::{Env, Program};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Manifest file name at every package root
pub const MANIFEST_NAME: &str = "Qobs.toml";

/// Load and parse a manifest file.
///
/// `requested` and `default_features` drive feature resolution; the env
/// provides the platform identity and environ snapshot (its feature set
/// is replaced by the resolved closure).
pub fn load_manifest(
    path: &Path,
    env: &Env,
    requested: &[String],
    default_features: bool,
) -> ConfigResult<Manifest> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_manifest(&text, env, requested, default_features)
}

/// Parse manifest text. See [`load_manifest`].
pub fn parse_manifest(
    text: &str,
    env: &Env,
    requested: &[String],
    default_features: bool,
) -> ConfigResult<Manifest> {
    let root: toml::Table = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    // Features come first so the env used for everything else already
    // carries the enabled set.
    let feature_graph = match root.get("features") {
        Some(value) => value
            .clone()
            .try_into()
            .map_err(|e| ConfigError::section("features", e))?,
        None => Default::default(),
    };
    let resolution = resolve_features(&feature_graph, requested, default_features);
    let env = env
        .clone()
        .with_features(resolution.enabled.iter().cloned().collect());

    let mut tree = toml::Value::Table(root);
    interpolate_value(&mut tree, &env)?;
    let toml::Value::Table(root) = tree else {
        unreachable!("interpolation preserves the value shape")
    };

    let mut manifest = Manifest {
        profile: default_profiles(),
        features: feature_graph,
        enabled_features: resolution.enabled,
        dep_features: resolution.dep_features,
        ..Default::default()
    };

    load_section(&root, "package", &mut manifest.package, &env)?;
    load_section(&root, "dependencies", &mut manifest.dependencies, &env)?;
    load_section(&root, "profile", &mut manifest.profile, &env)?;
    load_section(&root, "target", &mut manifest.target, &env)?;

    Ok(manifest)
}

/// Split a section into its base and conditional sub-sections, decode
/// the base, then evaluate and merge each truthy sub-section
fn load_section<T>(root: &toml::Table, name: &str, dst: &mut T, env: &Env) -> ConfigResult<()>
where
    T: serde::de::DeserializeOwned + Merge,
{
    let Some(section) = root.get(name) else {
        return Ok(());
    };
    let toml::Value::Table(section) = section else {
        return Err(ConfigError::section(name, "expected a table"));
    };

    let mut base = toml::Table::new();
    let mut conditionals: Vec<(&str, Program, &toml::Table)> = Vec::new();

    for (key, value) in section {
        // Conditional detection is by trial compile: a table-valued key
        // that compiles against the env is a gate, anything else is data.
        if let toml::Value::Table(sub) = value {
            if let Ok(program) = qobs_expr::compile(key, env) {
                conditionals.push((key.as_str(), program, sub));
                continue;
            }
        }
        base.insert(key.clone(), value.clone());
    }

    if !base.is_empty() {
        let parsed: T = toml::Value::Table(base)
            .try_into()
            .map_err(|e| ConfigError::section(name, e))?;
        dst.merge(parsed);
    }

    conditionals.sort_by(|a, b| a.0.cmp(b.0));
    for (key, program, sub) in conditionals {
        let result = program
            .run(env)
            .map_err(|e| ConfigError::expression(key, e))?;
        // Only boolean true merges; any other result leaves the base alone
        if result.as_bool() != Some(true) {
            continue;
        }

        let parsed: T = toml::Value::Table(sub.clone())
            .try_into()
            .map_err(|e| ConfigError::section(name, e))?;
        dst.merge(parsed);
    }

    Ok(())
}

fn interpolation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(.+?)\}\}").expect("interpolation regex"))
}

/// Walk the value tree depth-first and interpolate every string
fn interpolate_value(value: &mut toml::Value, env: &Env) -> ConfigResult<()> {
    match value {
        toml::Value::String(s) => {
            *s = interpolate_string(s, env)?;
        }
        toml::Value::Array(items) => {
            for item in items {
                interpolate_value(item, env)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                interpolate_value(item, env)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Evaluate all `{{ expr }}` occurrences in a string and substitute
/// their printed values
fn interpolate_string(s: &str, env: &Env) -> ConfigResult<String> {
    let regex = interpolation_regex();
    if !regex.is_match(s) {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;
    for captures in regex.captures_iter(s) {
        let whole = captures.get(0).expect("match group 0");
        let expression = captures.get(1).expect("match group 1").as_str().trim();

        out.push_str(&s[last..whole.start()]);
        let value =
            qobs_expr::eval(expression, env).map_err(|e| ConfigError::expression(expression, e))?;
        out.push_str(&value.to_string());
        last = whole.end();
    }
    out.push_str(&s[last..]);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{DependencySpec, OptLevel};
    use std::collections::HashMap;

    fn env(os: &str) -> Env {
        let mut environ = HashMap::new();
        environ.insert("USER".to_string(), "qobs".to_string());
        Env::new(os, "amd64", environ)
    }

    fn parse(text: &str, os: &str) -> Manifest {
        parse_manifest(text, &env(os), &[], true).unwrap()
    }

    #[test]
    fn test_minimal_manifest() {
        let manifest = parse(
            r#"
            [package]
            name = "hello"

            [target]
            sources = ["src/main.c"]
            "#,
            "linux",
        );

        assert_eq!(manifest.package.name, "hello");
        assert_eq!(manifest.target.sources, vec!["src/main.c"]);
        assert!(!manifest.target.lib);
    }

    #[test]
    fn test_default_profiles_present() {
        let manifest = parse("[package]\nname = \"x\"", "linux");
        assert_eq!(manifest.profiles(), vec!["debug", "release"]);
        assert_eq!(manifest.profile["release"].opt_level, OptLevel::Level(3));
    }

    #[test]
    fn test_profile_override() {
        let manifest = parse(
            r#"
            [profile.release]
            opt-level = 2

            [profile.tiny]
            opt-level = "s"
            "#,
            "linux",
        );
        assert_eq!(manifest.profile["release"].opt_level, OptLevel::Level(2));
        assert_eq!(manifest.profile["tiny"].opt_level.flag(), Some("-Os".to_string()));
        assert_eq!(manifest.profile["debug"].opt_level.flag(), None);
    }

    #[test]
    fn test_conditional_target_section() {
        let text = r#"
            [target]
            sources = ["src/*.c"]
            defines = { GRAPHICS = "1" }

            [target.'target_os == "linux"']
            defines = { LINUX = "1" }
            links = ["m"]
            "#;

        let on_linux = parse(text, "linux");
        assert_eq!(on_linux.target.defines["GRAPHICS"], "1");
        assert_eq!(on_linux.target.defines["LINUX"], "1");
        assert_eq!(on_linux.target.links, vec!["m"]);

        let on_windows = parse(text, "windows");
        assert_eq!(on_windows.target.defines["GRAPHICS"], "1");
        assert!(!on_windows.target.defines.contains_key("LINUX"));
        assert!(on_windows.target.links.is_empty());
    }

    #[test]
    fn test_conditional_dependencies() {
        let text = r#"
            [dependencies]
            zlib = "gh:madler/zlib"

            [dependencies.'target_os == "windows"']
            winpthreads = "gh:mirror/winpthreads"
            "#;

        let on_linux = parse(text, "linux");
        assert_eq!(on_linux.dependencies.len(), 1);

        let on_windows = parse(text, "windows");
        assert_eq!(on_windows.dependencies.len(), 2);
        assert!(matches!(
            on_windows.dependencies["winpthreads"],
            DependencySpec::Source(_)
        ));
    }

    #[test]
    fn test_detailed_dependency_is_not_conditional() {
        // A table-valued dependency entry whose key is a plain name must
        // land in the base, not be mistaken for a gate.
        let manifest = parse(
            r#"
            [dependencies]
            mylib = { dep = "./libs/mylib", features = ["fast"], default-features = false }
            "#,
            "linux",
        );

        let spec = &manifest.dependencies["mylib"];
        assert_eq!(spec.source(), "./libs/mylib");
        assert_eq!(spec.features(), ["fast"]);
        assert!(!spec.default_features());
    }

    #[test]
    fn test_string_interpolation() {
        let manifest = parse(
            r#"
            [package]
            name = "tool-{{ target_os }}"
            description = "built by {{ environ.USER }} for {{ target_arch }}"
            "#,
            "linux",
        );
        assert_eq!(manifest.package.name, "tool-linux");
        assert_eq!(manifest.package.description, "built by qobs for amd64");
    }

    #[test]
    fn test_interpolation_error_names_expression() {
        let err = parse_manifest(
            "[package]\nname = \"{{ bogus }}\"",
            &env("linux"),
            &[],
            true,
        )
        .unwrap_err();

        match err {
            ConfigError::Expression { expression, .. } => assert_eq!(expression, "bogus"),
            other => panic!("expected expression error, got {other}"),
        }
    }

    #[test]
    fn test_features_seen_by_conditional_sections() {
        let text = r#"
            [features]
            default = ["fast"]
            fast = ["sse"]

            [target]
            sources = ["src/*.c"]

            [target.'feature("sse")']
            cflags = ["-msse"]
            "#;

        let with_defaults = parse_manifest(text, &env("linux"), &[], true).unwrap();
        assert_eq!(with_defaults.target.cflags, vec!["-msse"]);
        assert!(with_defaults.enabled_features.contains("sse"));

        let without = parse_manifest(text, &env("linux"), &[], false).unwrap();
        assert!(without.target.cflags.is_empty());
        assert!(without.enabled_features.is_empty());
    }

    #[test]
    fn test_dep_features_forwarded() {
        let manifest = parse_manifest(
            r#"
            [features]
            default = ["gui"]
            gui = ["zlib/compress"]
            "#,
            &env("linux"),
            &[],
            true,
        )
        .unwrap();

        assert_eq!(manifest.dep_features["zlib"], vec!["compress"]);
    }

    #[test]
    fn test_merge_order_is_lexicographic_on_collision() {
        // Both gates are true; 'a ...' sorts before 'b ...' so the b-side
        // value wins the DEF collision regardless of table order.
        let text = r#"
            [target.'target_os != "b"']
            defines = { DEF = "from-not-b" }

            [target.'target_os != "a"']
            defines = { DEF = "from-not-a" }
            "#;
        let manifest = parse(text, "linux");
        // 'target_os != "a"' < 'target_os != "b"' lexicographically, so
        // the "b" sub-section merges second and wins.
        assert_eq!(manifest.target.defines["DEF"], "from-not-b");
    }

    #[test]
    fn test_non_boolean_gate_is_skipped() {
        let manifest = parse(
            r#"
            [target.'target_os']
            links = ["never"]
            "#,
            "linux",
        );
        assert!(manifest.target.links.is_empty());
    }

    #[test]
    fn test_malformed_toml() {
        let err = parse_manifest("not toml [", &env("linux"), &[], true).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_top_level_tables_ignored() {
        let manifest = parse(
            r#"
            [package]
            name = "x"

            [unknown]
            whatever = 1
            "#,
            "linux",
        );
        assert_eq!(manifest.package.name, "x");
    }

    #[test]
    fn test_merge_commutes_on_disjoint_keys() {
        let forward = parse(
            r#"
            [target.'target_arch == "amd64"']
            defines = { A = "1" }
            [target.'target_os == "linux"']
            defines = { B = "2" }
            "#,
            "linux",
        );
        let reversed = parse(
            r#"
            [target.'target_os == "linux"']
            defines = { B = "2" }
            [target.'target_arch == "amd64"']
            defines = { A = "1" }
            "#,
            "linux",
        );
        assert_eq!(forward.target.defines, reversed.target.defines);
    }
}

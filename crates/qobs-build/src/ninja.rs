//! Ninja back end
//!
//! Emits a `build.ninja` for the same normalised target list the
//! in-process scheduler consumes, then hands execution to an external
//! `ninja` process. Flags are attached per build statement so targets
//! keep their own cflags and ldflags.

use crate::cc::Toolchain;
use crate::error::{BuildError, BuildResult};
use crate::planner::{self, BuildUnit};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::process::Command;

/// Emitted build file name
pub const NINJA_FILE: &str = "build.ninja";

/// Generate ninja build text for the given units
pub fn generate(units: &BTreeMap<String, BuildUnit>, toolchain: &Toolchain) -> BuildResult<String> {
    let needs_c = units
        .values()
        .any(|u| u.sources.iter().any(|s| !s.is_cxx));
    let needs_cxx = units.values().any(|u| u.sources.iter().any(|s| s.is_cxx));

    let cc = if needs_c {
        toolchain.for_source(false)?
    } else {
        toolchain.cc.clone().unwrap_or_default()
    };
    let cxx = if needs_cxx {
        toolchain.for_source(true)?
    } else {
        toolchain.cxx.clone().unwrap_or_default()
    };

    let mut out = String::new();
    let _ = writeln!(out, "ninja_required_version = 1.1");
    let _ = writeln!(out, "cc = {cc}");
    let _ = writeln!(out, "cxx = {cxx}");
    let _ = writeln!(out);

    out.push_str(
        "rule cc\n  command = $cc $cflags -c $in -o $out\n  description = CC $out\n\n\
         rule cxx\n  command = $cxx $cflags -c $in -o $out\n  description = CXX $out\n\n\
         rule link\n  command = $linker $ldflags -o $out $in\n  description = LINK $out\n\n\
         rule ar\n  command = ar rcs $out $in\n  description = AR $out\n\n",
    );

    // Object files
    for unit in units.values() {
        let cflags = unit.cflags.join(" ");
        for source in &unit.sources {
            let rule = if source.is_cxx { "cxx" } else { "cc" };
            let _ = writeln!(
                out,
                "build {}: {} {}",
                escape(&source.obj.to_string_lossy()),
                rule,
                escape(&source.src.to_string_lossy())
            );
            if !cflags.is_empty() {
                let _ = writeln!(out, "  cflags = {cflags}");
            }
        }
    }
    let _ = writeln!(out);

    // Archive and link statements
    let mut cxx_memo = BTreeMap::new();
    for unit in units.values() {
        let mut inputs: Vec<String> = unit
            .sources
            .iter()
            .map(|s| escape(&s.obj.to_string_lossy()))
            .collect();

        if unit.is_lib {
            let _ = writeln!(out, "build {}: ar {}", escape(&unit.artifact), inputs.join(" "));
        } else {
            // Executables also take the library artifacts of their
            // dependency closure as inputs.
            let mut visited = Default::default();
            let mut artifacts = Vec::new();
            planner::collect_dep_artifacts(unit, units, Path::new(""), &mut visited, &mut artifacts);
            inputs.extend(artifacts.iter().map(|a| escape(&a.to_string_lossy())));

            let _ = writeln!(
                out,
                "build {}: link {}",
                escape(&unit.artifact),
                inputs.join(" ")
            );
            let linker = if planner::target_has_cxx(&unit.name, units, &mut cxx_memo) {
                "$cxx"
            } else {
                "$cc"
            };
            let _ = writeln!(out, "  linker = {linker}");
            if !unit.ldflags.is_empty() {
                let _ = writeln!(out, "  ldflags = {}", unit.ldflags.join(" "));
            }
        }
    }

    Ok(out)
}

/// Run `ninja -C <build_dir>`
pub fn invoke(build_dir: &Path) -> BuildResult<()> {
    let mut cmd = Command::new("ninja");
    cmd.arg("-C").arg(build_dir);

    let rendered = crate::scheduler::render_command(&cmd);
    let status = cmd.status().map_err(|e| BuildError::Generator {
        command: format!("{rendered}: {e}"),
    })?;
    if !status.success() {
        return Err(BuildError::Generator { command: rendered });
    }
    Ok(())
}

/// Escape a path for use in a ninja build statement
fn escape(s: &str) -> String {
    s.replace('$', "$$").replace(':', "$:").replace(' ', "$ ")
}

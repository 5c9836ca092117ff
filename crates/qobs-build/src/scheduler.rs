//! Job execution
//!
//! Compile jobs run on one bounded-concurrency pool shared across all
//! targets; the topological order constrains linking, not compilation.
//! On the first compile failure no new jobs start, in-flight jobs drain,
//! and the phase returns the first error in job order. Link jobs run
//! sequentially in topological order, which trivially satisfies the
//! happens-after guarantees between a target and its upstream libraries.

use crate::error::{BuildError, BuildResult};
use crate::planner::{CompileJob, LinkJob};
use rayon::prelude::*;
use std::fs;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};

/// Run all compile jobs with at most `jobs` running concurrently
pub fn run_compile_phase(compile_jobs: &[CompileJob], jobs: usize) -> BuildResult<()> {
    if compile_jobs.is_empty() {
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|e| BuildError::internal(format!("failed to build thread pool: {e}")))?;

    let failed = AtomicBool::new(false);
    let results: Vec<Option<BuildError>> = pool.install(|| {
        compile_jobs
            .par_iter()
            .map(|job| {
                if failed.load(Ordering::Relaxed) {
                    return None; // a job already failed; don't start new work
                }
                match run_compile_job(job) {
                    Ok(()) => None,
                    Err(e) => {
                        failed.store(true, Ordering::Relaxed);
                        Some(e)
                    }
                }
            })
            .collect()
    });

    match results.into_iter().flatten().next() {
        Some(first_error) => Err(first_error),
        None => Ok(()),
    }
}

/// Run link jobs in the given (topological) order, stopping on the
/// first failure
pub fn run_link_phase(link_jobs: &[LinkJob]) -> BuildResult<()> {
    for job in link_jobs {
        run_link_job(job)?;
    }
    Ok(())
}

fn run_compile_job(job: &CompileJob) -> BuildResult<()> {
    if let Some(parent) = job.obj.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }

    let mut cmd = Command::new(&job.compiler);
    cmd.args(&job.cflags)
        .arg("-c")
        .arg(&job.src)
        .arg("-o")
        .arg(&job.obj);

    println!("CC {}", job.src.display());
    run_command(cmd, |command| BuildError::Compile { command })
}

fn run_link_job(job: &LinkJob) -> BuildResult<()> {
    let mut cmd;
    if job.is_lib {
        cmd = Command::new("ar");
        cmd.arg("rcs").arg(&job.out).args(&job.objects);
        println!("AR {}", job.out.display());
    } else {
        cmd = Command::new(&job.driver);
        cmd.arg("-o")
            .arg(&job.out)
            .args(&job.objects)
            .args(&job.dep_artifacts)
            .args(&job.ldflags);
        println!("LINK {}", job.out.display());
    }

    run_command(cmd, |command| BuildError::Link { command })
}

/// Run a child process with inherited stdio; a spawn failure or non-zero
/// exit maps to an error carrying the command line
fn run_command(mut cmd: Command, to_error: impl Fn(String) -> BuildError) -> BuildResult<()> {
    let rendered = render_command(&cmd);
    let status = cmd
        .status()
        .map_err(|e| to_error(format!("{rendered}: {e}")))?;
    if !status.success() {
        return Err(to_error(rendered));
    }
    Ok(())
}

/// Render a command line for error messages
pub fn render_command(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

use crate::BuildFlags;
use anyhow::{anyhow, Result};
use qobs_build::{Builder, Generator, OfflineFetcher};
use std::path::Path;

pub fn run(path: &Path, args: &[String], flags: &BuildFlags) -> Result<()> {
    let generator: Generator = flags.generator.parse().map_err(|e: String| anyhow!(e))?;

    let mut builder = Builder::new(path, &flags.features, !flags.no_default_features)?;
    if let Some(jobs) = flags.jobs {
        builder = builder.with_jobs(jobs);
    }

    let status = builder.build_and_run(args, &flags.profile, generator, &OfflineFetcher)?;
    if !status.success() {
        // Propagate the program's exit code
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}

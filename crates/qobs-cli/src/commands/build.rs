use crate::BuildFlags;
use anyhow::{anyhow, Result};
use qobs_build::{Builder, Generator, OfflineFetcher};
use std::path::Path;

pub fn run(path: &Path, flags: &BuildFlags) -> Result<()> {
    let generator: Generator = flags.generator.parse().map_err(|e: String| anyhow!(e))?;

    let mut builder = Builder::new(path, &flags.features, !flags.no_default_features)?;
    if let Some(jobs) = flags.jobs {
        builder = builder.with_jobs(jobs);
    }

    builder.build(&flags.profile, generator, &OfflineFetcher)?;
    Ok(())
}

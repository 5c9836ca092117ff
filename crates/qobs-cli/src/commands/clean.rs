use anyhow::Result;
use qobs_build::Builder;
use std::path::Path;

pub fn run(path: &Path) -> Result<()> {
    let builder = Builder::new(path, &[], true)?;
    builder.clean()?;
    Ok(())
}

pub mod info;
pub mod invoke;
pub mod runtimes;

use std::path::Path;

use anyhow::Context;
use clrloader::{Runtime, RuntimeOptions};

/// Read runtime options from `path` and start the runtime they describe.
pub fn start_runtime(path: &Path) -> anyhow::Result<Runtime> {
    let options = RuntimeOptions::from_file(path)
        .with_context(|| format!("failed to read runtime options: {}", path.display()))?;
    let kind = options.kind();
    Runtime::new(options).with_context(|| format!("failed to start the {kind} runtime"))
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use clrloader::locate::{find_dotnet_root, find_hostfxr, find_runtimes};
use serde::Serialize;

use crate::{
    app::GlobalOptions,
    output::{print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct RuntimeEntry {
    name: String,
    version: String,
    path: PathBuf,
}

#[derive(Debug, Serialize)]
struct RuntimesOutput {
    dotnet_root: PathBuf,
    hostfxr: Option<PathBuf>,
    runtimes: Vec<RuntimeEntry>,
}

pub fn run(dotnet_root: Option<&Path>, opts: &GlobalOptions) -> anyhow::Result<()> {
    let root = match dotnet_root {
        Some(root) => root.to_path_buf(),
        None => find_dotnet_root().context("no .NET installation found")?,
    };

    let hostfxr = find_hostfxr(&root)
        .ok()
        .and_then(|candidates| candidates.into_iter().next());
    let runtimes = find_runtimes(&root)
        .with_context(|| format!("failed to scan {}", root.display()))?
        .into_iter()
        .map(|spec| RuntimeEntry {
            name: spec.name,
            version: spec.version,
            path: spec.path,
        })
        .collect();

    let output = RuntimesOutput {
        dotnet_root: root,
        hostfxr,
        runtimes,
    };

    print_output(&output, opts, |out| {
        println!("Root:     {}", out.dotnet_root.display());
        match &out.hostfxr {
            Some(path) => println!("hostfxr:  {}", path.display()),
            None => println!("hostfxr:  (not found)"),
        }
        println!();

        if out.runtimes.is_empty() {
            println!("No shared runtimes installed.");
            return;
        }

        println!("Shared runtimes ({} entries):", out.runtimes.len());
        let mut tw = TabWriter::new(&[
            ("Name", Align::Left),
            ("Version", Align::Right),
            ("Path", Align::Left),
        ])
        .indent("  ");
        for entry in &out.runtimes {
            tw.row(vec![
                entry.name.clone(),
                entry.version.clone(),
                entry.path.display().to_string(),
            ]);
        }
        tw.print();
    })
}

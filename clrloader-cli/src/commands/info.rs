use std::path::Path;

use crate::{
    app::GlobalOptions,
    commands::start_runtime,
    output::{print_output, Align, TabWriter},
};

pub fn run(options: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let runtime = start_runtime(options)?;
    let info = runtime.info();

    print_output(&info, opts, |info| {
        println!("Backend:      {}", info.kind);
        println!(
            "Version:      {}",
            info.version.as_deref().unwrap_or("(unknown)")
        );
        println!(
            "State:        {}",
            if info.initialized {
                "running"
            } else {
                "configured, not started"
            }
        );

        if !info.properties.is_empty() {
            println!();
            println!("Properties ({} entries):", info.properties.len());
            let mut tw =
                TabWriter::new(&[("Name", Align::Left), ("Value", Align::Left)]).indent("  ");
            for (name, value) in &info.properties {
                tw.row(vec![name.clone(), value.clone()]);
            }
            tw.print();
        }
    })
}

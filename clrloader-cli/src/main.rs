mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // Show clrloader info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("clrloader", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::Runtimes { dotnet_root } => {
            commands::runtimes::run(dotnet_root.as_deref(), &cli.global)
        }
        Command::Info { options } => commands::info::run(options, &cli.global),
        Command::Invoke {
            options,
            assembly,
            name,
            method,
            input,
            hex,
            separator,
            show_buffer,
        } => commands::invoke::run(
            options,
            &commands::invoke::InvokeOptions {
                assembly,
                name,
                method: method.as_deref(),
                input: input.as_deref(),
                hex: hex.as_deref(),
                separator: *separator,
                show_buffer: *show_buffer,
                global: &cli.global,
            },
        ),
    }
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// clrloader - start Mono, .NET or the .NET Framework and call into managed assemblies
#[derive(Debug, Parser)]
#[command(name = "clrloader", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List the shared .NET runtimes of an installation.
    Runtimes {
        /// Root of the .NET installation (default: DOTNET_ROOT, then the usual locations).
        #[arg(long, value_name = "DIR")]
        dotnet_root: Option<PathBuf>,
    },

    /// Start the runtime described by an options file and show what it reports.
    Info {
        /// JSON runtime options, e.g. {"backend": "mono"}.
        #[arg(value_name = "OPTIONS")]
        options: PathBuf,
    },

    /// Resolve a static int (IntPtr, int) method and call it with a buffer.
    Invoke {
        /// JSON runtime options, e.g. {"backend": "mono"}.
        #[arg(value_name = "OPTIONS")]
        options: PathBuf,

        /// Path to the managed assembly.
        #[arg(value_name = "ASSEMBLY")]
        assembly: PathBuf,

        /// Type name, or Type.Method when --method is not given.
        #[arg(value_name = "NAME")]
        name: String,

        /// Method name; NAME is then the full type name.
        #[arg(long)]
        method: Option<String>,

        /// Read the buffer from a file.
        #[arg(long, value_name = "FILE", conflicts_with = "hex")]
        input: Option<PathBuf>,

        /// Buffer as hex bytes, e.g. 68656c6c6f.
        #[arg(long, value_name = "HEX")]
        hex: Option<String>,

        /// Separator between type and method in NAME.
        #[arg(long, default_value_t = '.')]
        separator: char,

        /// Print the buffer contents after the call.
        #[arg(long)]
        show_buffer: bool,
    },
}

// src/cli.rs
//
// CLI surface (spec §6, out of core but still the outer shell): clap
// derive subcommands mirroring the teacher's `Cli`/`Mode` split in
// main.rs, generalized from the teacher's single enforcement mode to
// cadence's five subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cadence", version, about = "Detects likely AI-generated content in repositories and web pages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit the report as JSON instead of a human-readable summary.
    #[arg(long, global = true)]
    pub json: bool,

    /// Write the report to this path instead of stdout.
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a local git repository.
    Analyze {
        path: PathBuf,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long = "exclude-files", value_delimiter = ',')]
        exclude_files: Vec<String>,
    },
    /// Analyze a single web page.
    Web { url: String },
    /// Run the webhook + streaming HTTP server.
    Webhook {
        #[arg(long, default_value_t = 8000)]
        port: u16,
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },
    /// Print the effective configuration.
    Config,
    /// Print version information.
    Version,
}

mod commands;
mod output;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use fleetform_config::{Manifest, find_manifest_file};
use fleetform_core::{Lifecycle, Mode, parse_override};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetform")]
#[command(about = "Converge declared cloud infrastructure, in dependency order", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Manifest to load (default: search the current directory, ./.fleetform/ and ~/.config/fleetform/)
    #[arg(short, long, global = true)]
    manifest: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changes an apply would make, without making them
    Plan(RunArgs),
    /// Converge the cloud to the manifest
    Apply(RunArgs),
    /// Check the manifest and print the execution order
    Validate,
    /// Show version information
    Version,
}

#[derive(Args)]
pub struct RunArgs {
    /// Maximum number of tasks running at once
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Stop starting new tasks after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub deadline: Option<u64>,

    /// Force a lifecycle onto every task of a kind (repeatable)
    #[arg(long = "lifecycle-override", value_name = "KIND=POLICY", value_parser = parse_lifecycle_override)]
    pub lifecycle_overrides: Vec<(String, Lifecycle)>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_lifecycle_override(s: &str) -> Result<(String, Lifecycle), String> {
    parse_override(s).map_err(|e| e.to_string())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Finds and loads the manifest, exiting with a readable message on failure
fn load_manifest(explicit: Option<&Path>) -> (PathBuf, Manifest) {
    let result = find_manifest_file(explicit)
        .and_then(|path| Manifest::load(&path).map(|manifest| (path, manifest)));

    match result {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", "✗ Could not load manifest".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let success = match cli.command {
        Commands::Version => {
            println!("fleetform {}", env!("CARGO_PKG_VERSION"));
            true
        }
        Commands::Validate => {
            let (path, manifest) = load_manifest(cli.manifest.as_deref());
            commands::validate::handle(&path, &manifest)
        }
        Commands::Plan(args) => {
            let (path, manifest) = load_manifest(cli.manifest.as_deref());
            commands::run::handle(&path, &manifest, &args, Mode::DryRun).await?
        }
        Commands::Apply(args) => {
            let (path, manifest) = load_manifest(cli.manifest.as_deref());
            commands::run::handle(&path, &manifest, &args, Mode::Apply).await?
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

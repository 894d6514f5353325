//! PiCanvas CLI - Main Entry Point
//!
//! Runs the SharePoint Workbench harness against the PiCanvas web part,
//! manages the local dev server and collects extension logs.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use picanvas_common::config::DEFAULT_CONFIG_FILE;
use picanvas_common::HarnessConfig;

mod commands;
mod output;

use commands::{logs, serve, tenants, test};

/// PiCanvas workbench harness
#[derive(Parser)]
#[command(name = "picanvas")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Harness configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "PICANVAS_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workbench tests
    Test(test::TestArgs),

    /// List available tests
    ListTests,

    /// List configured tenants
    Tenants,

    /// Run the local dev server until interrupted
    Serve(serve::ServeArgs),

    /// Extension log collection
    #[command(subcommand)]
    Logs(logs::LogsCommands),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let config = HarnessConfig::load(&cli.config)?;

    match cli.command {
        Commands::Test(args) => {
            let passed = test::execute(args, &config, cli.format).await?;
            if !passed {
                std::process::exit(1);
            }
        }
        Commands::ListTests => test::list(cli.format),
        Commands::Tenants => tenants::execute(&config, cli.format),
        Commands::Serve(args) => serve::execute(args, &config).await?,
        Commands::Logs(cmd) => logs::execute(cmd, &config, cli.format).await?,
        Commands::Version => {
            println!("PiCanvas harness v{}", picanvas_common::VERSION);
            println!("Config: {}", cli.config.display());
        }
    }

    Ok(())
}

// Copyright 2026 Tagharvest Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tagharvest::cli;
use tagharvest::error::HarvestError;

#[derive(Parser)]
#[command(
    name = "tagharvest",
    about = "Tagharvest: resilient collector for tag-search feeds",
    version,
    after_help = "Run 'tagharvest <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// TOML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest every configured topic and checkpoint after each one
    Run {
        /// Topic to harvest (repeatable; replaces the configured list)
        #[arg(long = "topic", short = 't')]
        topics: Vec<String>,
        /// Stop a topic once this many units are collected
        #[arg(long)]
        max: Option<usize>,
        /// Accept a stalled topic once this many units are collected
        #[arg(long)]
        min: Option<usize>,
        /// Checkpoint file (JSON lines)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Run Chromium headless
        #[arg(long)]
        headless: bool,
        /// Persistent browser profile holding the signed-in session
        #[arg(long)]
        profile_dir: Option<PathBuf>,
        /// Replay a recorded JSON feed instead of launching a browser
        #[arg(long)]
        replay: Option<PathBuf>,
    },
    /// Launch the browser and verify the session is signed in
    Check {
        /// Run Chromium headless
        #[arg(long)]
        headless: bool,
        /// Persistent browser profile holding the signed-in session
        #[arg(long)]
        profile_dir: Option<PathBuf>,
    },
    /// Summarize the checkpoint file
    Status {
        /// Checkpoint file (defaults to the configured one)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Number of tags to list
        #[arg(long, default_value = "10")]
        top: usize,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("TAGHARVEST_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("TAGHARVEST_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("TAGHARVEST_VERBOSE", "1");
    }
    cli::output::init_tracing();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Run {
            topics,
            max,
            min,
            checkpoint,
            headless,
            profile_dir,
            replay,
        } => {
            let opts = cli::run_cmd::RunOptions {
                topics,
                max,
                min,
                checkpoint,
                headless,
                profile_dir,
                replay,
            };
            cli::run_cmd::run(config, opts).await
        }
        Commands::Check {
            headless,
            profile_dir,
        } => cli::check_cmd::run(config, headless, profile_dir).await,
        Commands::Status { checkpoint, top } => cli::status_cmd::run(config, checkpoint, top).await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tagharvest", &mut std::io::stdout());
            Ok(())
        }
    };

    // Exit codes: 0=success, 1=error, 2=session not authenticated
    if let Err(e) = &result {
        if !cli::output::is_quiet() && !cli::output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        let code = match e.downcast_ref::<HarvestError>() {
            Some(HarvestError::Authentication(_)) => 2,
            _ => 1,
        };
        std::process::exit(code);
    }

    result
}

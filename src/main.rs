//! rbpack - Ruby application build pipeline
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use rbpack::cli::{Cli, Commands};
use rbpack::config::{Config, ConfigManager};
use rbpack::error::RbpackResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            } else if !e.is_user_error() {
                eprintln!("{} Rerun with -vv for details", style("Hint:").yellow());
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> RbpackResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    // The build config decides the log format, so it is read before logging starts
    let config = match cli.command {
        Commands::Build(ref args) if cli.config.is_none() => {
            manager.load_for_build(Some(&args.build_dir)).await?
        }
        Commands::Build(_) => manager.load_from_file(manager.path()).await?,
        _ => Config::default(),
    };
    init_logging(cli.verbose, &config.general.log_format);
    rbpack::ui::init_theme();
    debug!("Config path: {}", manager.path().display());

    match cli.command {
        Commands::Detect(args) => rbpack::cli::commands::detect(args).await,
        Commands::Build(args) => rbpack::cli::commands::build(args, config).await,
        Commands::Cache(args) => rbpack::cli::commands::cache(args).await,
        Commands::Config(args) => rbpack::cli::commands::config(args, &manager).await,
        Commands::Completions { shell } => rbpack::cli::commands::completions(shell),
    }
}

/// 0 = warn, 1 = info (stage lines), 2+ = debug. `RUST_LOG` wins when set.
/// Logs go to stderr so `build --json` keeps stdout parseable.
fn init_logging(verbose: u8, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("rbpack=warn"),
        1 => EnvFilter::new("rbpack=info"),
        _ => EnvFilter::new("rbpack=debug"),
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if format == "json" {
        builder.json().init();
    } else {
        builder.with_target(false).without_time().init();
    }
}

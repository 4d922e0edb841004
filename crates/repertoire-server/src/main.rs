//! Repertoire - a Composer repository server.
//!
//! Serves hosted, proxy and group Composer repositories over HTTP.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

mod cli;
mod commands;
mod http;
mod registry;

use clap::Parser;
use cli::{Cli, Commands, LogFormat, ServeArgs};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 if cli.quiet => Level::ERROR,
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to create runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run_command(&cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Some(Commands::Serve(args)) => commands::serve::run(cli, args).await,
        Some(Commands::Rebuild(args)) => commands::rebuild::run(cli, args).await,
        None => commands::serve::run(cli, &ServeArgs::default()).await,
    }
}

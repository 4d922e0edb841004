//! Command implementations.

pub mod rebuild;
pub mod serve;

use crate::cli::Cli;
use repertoire_config::{ConfigLoader, Overrides, ServerConfig};

/// Effective configuration: file, then `REPERTOIRE_*`, then `cli_overrides`.
pub fn load_config(cli: &Cli, cli_overrides: &Overrides) -> anyhow::Result<ServerConfig> {
    let loader = cli
        .config
        .as_ref()
        .map_or_else(ConfigLoader::default, ConfigLoader::new);
    Ok(loader.resolve(&Overrides::from_env(), cli_overrides)?)
}

/// Token cancelled on Ctrl-C.
pub fn shutdown_token() -> tokio_util::sync::CancellationToken {
    let token = tokio_util::sync::CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, shutting down");
                child.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for interrupts"),
        }
    });
    token
}

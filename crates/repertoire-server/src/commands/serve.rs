//! Serve command.

use crate::cli::{Cli, ServeArgs};
use crate::http;
use crate::registry::RepositoryRegistry;
use anyhow::Context as _;
use repertoire_config::ServerConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the serve command.
pub async fn run(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    let config = super::load_config(cli, &args.to_overrides())?;
    let cancel = super::shutdown_token();
    serve(config, cancel).await
}

/// Serve `config` until `cancel` fires.
pub async fn serve(config: ServerConfig, cancel: CancellationToken) -> anyhow::Result<()> {
    let (registry, config) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let registry = RepositoryRegistry::from_config(&config)?;
        registry.warm_indexes(&CancellationToken::new());
        Ok((registry, config))
    })
    .await
    .context("repository setup task failed")??;

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!(public_url = %config.public_url()?, "serving repositories");

    http::serve(listener, Arc::new(registry), cancel)
        .await
        .context("server error")
}

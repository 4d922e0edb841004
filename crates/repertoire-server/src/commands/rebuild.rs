//! Rebuild command.

use crate::cli::{Cli, RebuildArgs};
use crate::registry::RepositoryRegistry;
use anyhow::{Context as _, bail};
use repertoire_config::ServerConfig;
use repertoire_repository::RebuildSummary;
use tokio_util::sync::CancellationToken;

/// Run the rebuild command.
pub async fn run(cli: &Cli, args: &RebuildArgs) -> anyhow::Result<()> {
    let config = super::load_config(cli, &args.overrides.to_overrides())?;
    let cancel = super::shutdown_token();
    let summary = rebuild(config, args.repository.clone(), args.full, cancel).await?;

    println!(
        "{}: {} indexed, {} skipped{}",
        args.repository,
        summary.processed,
        summary.skipped,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    if summary.cancelled {
        bail!("rebuild of '{}' was interrupted", args.repository);
    }
    Ok(())
}

/// Rebuild the metadata index of hosted repository `name`.
///
/// The index snapshot is saved to the repository's store, where a running or
/// later `serve` picks it up on startup.
pub async fn rebuild(
    config: ServerConfig,
    name: String,
    full: bool,
    cancel: CancellationToken,
) -> anyhow::Result<RebuildSummary> {
    tokio::task::spawn_blocking(move || {
        let registry = RepositoryRegistry::from_config(&config)?;
        let Some(hosted) = registry.hosted(&name) else {
            bail!("'{name}' is not a hosted repository");
        };
        Ok(hosted.rebuild(full, &cancel)?)
    })
    .await
    .context("rebuild task failed")?
}

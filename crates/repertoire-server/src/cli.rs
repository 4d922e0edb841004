//! Command line interface.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use repertoire_config::Overrides;
use std::path::PathBuf;

/// Repertoire - a Composer repository server
#[derive(Parser, Debug)]
#[command(name = "repertoire")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Config file (defaults to ./repertoire.json when present)
    #[arg(short, long, global = true, env = "REPERTOIRE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve all configured repositories over HTTP (default)
    Serve(ServeArgs),
    /// Rebuild the metadata index of a hosted repository
    Rebuild(RebuildArgs),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per event
    Json,
}

/// Settings that override the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Storage root directory (implies filesystem storage)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Externally visible base URL
    #[arg(long)]
    pub public_url: Option<String>,
}

/// Arguments of `serve`.
#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long)]
    pub listen: Option<String>,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Arguments of `rebuild`.
#[derive(Args, Debug, Clone)]
pub struct RebuildArgs {
    /// Hosted repository to rebuild
    #[arg(short, long)]
    pub repository: String,

    /// Clear the index before rebuilding
    #[arg(long)]
    pub full: bool,

    #[command(flatten)]
    pub overrides: OverrideArgs,
}

impl ServeArgs {
    /// Command line overrides.
    #[must_use]
    pub fn to_overrides(&self) -> Overrides {
        Overrides {
            listen: self.listen.clone(),
            ..self.overrides.to_overrides()
        }
    }
}

impl OverrideArgs {
    /// Command line overrides.
    #[must_use]
    pub fn to_overrides(&self) -> Overrides {
        Overrides {
            listen: None,
            storage_dir: self.storage_dir.clone(),
            public_url: self.public_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_optional() {
        let cli = Cli::try_parse_from(["repertoire", "-vv"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn serve_overrides() {
        let cli = Cli::try_parse_from([
            "repertoire",
            "serve",
            "--listen",
            "0.0.0.0:9000",
            "--storage-dir",
            "/data",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        let Some(Commands::Serve(args)) = cli.command else {
            panic!("expected serve");
        };
        let overrides = args.to_overrides();
        assert_eq!(overrides.listen.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(overrides.storage_dir, Some(PathBuf::from("/data")));
        assert!(overrides.public_url.is_none());
    }

    #[test]
    fn rebuild_requires_repository() {
        assert!(Cli::try_parse_from(["repertoire", "rebuild"]).is_err());
        let cli =
            Cli::try_parse_from(["repertoire", "rebuild", "--repository", "hosted", "--full"])
                .unwrap();
        let Some(Commands::Rebuild(args)) = cli.command else {
            panic!("expected rebuild");
        };
        assert_eq!(args.repository, "hosted");
        assert!(args.full);
    }
}

//! The `depkit` command: launch programs, watch for running ones and exercise
//! the command-line codec.

pub mod codec_cmd;
pub mod config;
pub mod launch_cmd;
pub mod watch_cmd;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::codec_cmd::JoinCommand;
use crate::codec_cmd::SplitCommand;
use crate::launch_cmd::LaunchCommand;
use crate::watch_cmd::WatchCommand;

/// Deployment process toolkit
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "depkit")]
pub struct Cli {
    /// Config file to use instead of `$DEPKIT_HOME/config.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Start a program and exit with its exit code.
    Launch(LaunchCommand),

    /// Report running processes that match a watch list.
    Watch(WatchCommand),

    /// Split a command line into its arguments.
    Split(SplitCommand),

    /// Render arguments as a single command line.
    Join(JoinCommand),
}

/// Logs to stderr, filtered by `RUST_LOG` (default `error`).
pub fn init_tracing() {
    let default_level = "error";
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);
    let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
}

/// Runs a parsed command line and returns the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = config::DepkitConfig::load(cli.config.as_deref())?;
    match cli.subcommand {
        Subcommand::Launch(command) => launch_cmd::run_launch(command, &config.launch).await,
        Subcommand::Watch(command) => watch_cmd::run_watch(command, &config.watch)
            .await
            .map(|()| 0),
        Subcommand::Split(command) => codec_cmd::run_split(command).map(|()| 0),
        Subcommand::Join(command) => codec_cmd::run_join(command).map(|()| 0),
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
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["depkit", "--config", "x.toml", "split", "a b"])
            .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.subcommand, Subcommand::Split(_)));

        let cli = Cli::try_parse_from(["depkit", "watch", "--once", "winword"]).expect("parse");
        let Subcommand::Watch(watch) = cli.subcommand else {
            panic!("expected watch");
        };
        assert!(watch.once);
        assert_eq!(watch.names, vec!["winword".to_string()]);

        assert!(Cli::try_parse_from(["depkit", "launch"]).is_err());
    }
}

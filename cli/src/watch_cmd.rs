use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use depkit_running_processes::ProcessDefinition;
use depkit_running_processes::RunningProcessService;
use depkit_running_processes::SysinfoProcessTable;
use depkit_running_processes::match_processes;
use tokio::sync::broadcast::error::RecvError;

use crate::config::WatchConfig;

#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Image names or full paths to watch, added to the configured list.
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,

    /// Print the current matches once and exit.
    #[arg(long)]
    pub once: bool,

    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,
}

impl WatchCommand {
    pub fn definitions(&self, config: &WatchConfig) -> Vec<ProcessDefinition> {
        config
            .process
            .iter()
            .cloned()
            .chain(self.names.iter().map(ProcessDefinition::new))
            .collect()
    }

    pub fn poll_interval(&self, config: &WatchConfig) -> Duration {
        self.interval_ms
            .map_or_else(|| config.poll_interval(), Duration::from_millis)
    }
}

/// Prints matches as JSON lines: every match with `--once`, otherwise one
/// line per change of the processes to close until interrupted.
pub async fn run_watch(command: WatchCommand, config: &WatchConfig) -> anyhow::Result<()> {
    let definitions = command.definitions(config);
    if definitions.is_empty() {
        anyhow::bail!("nothing to watch; name a process or add [[watch.process]] to the config");
    }

    if command.once {
        let running = tokio::task::spawn_blocking(move || {
            match_processes(&definitions, &SysinfoProcessTable::new())
        })
        .await??;
        for info in running {
            println!("{}", serde_json::to_string(&info)?);
        }
        return Ok(());
    }

    let service = RunningProcessService::with_table(
        definitions,
        Arc::new(SysinfoProcessTable::new()),
        command.poll_interval(config),
    )?;
    let mut changes = service.subscribe();
    service.start().await?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(change) => println!("{}", serde_json::to_string(&change.processes)?),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "fell behind on process changes");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    service.stop().await.context("failed to stop watching")?;
    service.shutdown().await;
    Ok(())
}

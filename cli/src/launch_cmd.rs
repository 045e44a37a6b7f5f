use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use clap::ValueEnum;
use depkit_launcher::LaunchRequest;
use depkit_launcher::LaunchResult;
use depkit_launcher::PriorityClass;
use depkit_launcher::WindowStyle;
use tokio_util::sync::CancellationToken;

use crate::config::LaunchDefaults;

#[derive(Debug, Args)]
pub struct LaunchCommand {
    /// Program or document to start.
    #[arg(value_name = "FILE", required_unless_present = "request")]
    pub file_path: Option<String>,

    /// Arguments passed to the program. A single argument is passed through as
    /// a pre-rendered argument string.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub arguments: Vec<String>,

    /// Read the whole request from a JSON file. Other flags override it.
    #[arg(long, value_name = "PATH", conflicts_with = "file_path")]
    pub request: Option<PathBuf>,

    #[arg(long, short = 'd', value_name = "DIR")]
    pub working_directory: Option<String>,

    /// Hand the file to the shell instead of creating the process directly.
    #[arg(long)]
    pub shell: bool,

    /// Shell verb, such as `open` or `runas`. Implies `--shell`.
    #[arg(long)]
    pub verb: Option<String>,

    /// Start without a window and capture console output.
    #[arg(long)]
    pub no_window: bool,

    #[arg(long, value_enum)]
    pub window_style: Option<WindowStyleArg>,

    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,

    /// Expand `%VAR%` references in the path, arguments and directory.
    #[arg(long)]
    pub expand_env: bool,

    /// Line written to the program's standard input. Repeatable.
    #[arg(long = "stdin", value_name = "LINE")]
    pub standard_input: Vec<String>,

    /// WHATWG label used to decode captured output.
    #[arg(long, value_name = "LABEL")]
    pub encoding: Option<String>,

    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Stop waiting at the deadline but leave the process running.
    #[arg(long)]
    pub no_terminate_on_timeout: bool,

    /// Wait until every process in the job has exited.
    #[arg(long)]
    pub wait_for_children: bool,

    /// Terminate remaining child processes once the program exits.
    #[arg(long)]
    pub kill_children: bool,

    /// Print the result as JSON instead of replaying the captured output.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum WindowStyleArg {
    Normal,
    Hidden,
    Minimized,
    Maximized,
}

impl From<WindowStyleArg> for WindowStyle {
    fn from(value: WindowStyleArg) -> Self {
        match value {
            WindowStyleArg::Normal => WindowStyle::Normal,
            WindowStyleArg::Hidden => WindowStyle::Hidden,
            WindowStyleArg::Minimized => WindowStyle::Minimized,
            WindowStyleArg::Maximized => WindowStyle::Maximized,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PriorityArg {
    Idle,
    BelowNormal,
    Normal,
    AboveNormal,
    High,
    RealTime,
}

impl From<PriorityArg> for PriorityClass {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Idle => PriorityClass::Idle,
            PriorityArg::BelowNormal => PriorityClass::BelowNormal,
            PriorityArg::Normal => PriorityClass::Normal,
            PriorityArg::AboveNormal => PriorityClass::AboveNormal,
            PriorityArg::High => PriorityClass::High,
            PriorityArg::RealTime => PriorityClass::RealTime,
        }
    }
}

impl LaunchCommand {
    /// Builds the request from the request file, config defaults and flags,
    /// in increasing order of precedence.
    pub fn to_request(&self, defaults: &LaunchDefaults) -> anyhow::Result<LaunchRequest> {
        let mut request = match &self.request {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("failed to parse {}", path.display()))?
            }
            None => LaunchRequest::default(),
        };
        if request.stream_encoding.is_none() {
            request.stream_encoding.clone_from(&defaults.stream_encoding);
        }
        if request.timeout_ms.is_none() {
            request.timeout_ms = defaults.timeout_ms;
        }

        if let Some(file_path) = &self.file_path {
            request.file_path.clone_from(file_path);
        }
        if !self.arguments.is_empty() {
            request.arguments.clone_from(&self.arguments);
        }
        if self.working_directory.is_some() {
            request.working_directory.clone_from(&self.working_directory);
        }
        if self.verb.is_some() {
            request.verb.clone_from(&self.verb);
        }
        request.use_shell_execute |= self.shell || self.verb.is_some();
        request.create_no_window |= self.no_window;
        if let Some(style) = self.window_style {
            request.window_style = Some(style.into());
        }
        if let Some(priority) = self.priority {
            request.priority_class = Some(priority.into());
        }
        request.expand_environment_variables |= self.expand_env;
        if !self.standard_input.is_empty() {
            request.standard_input.clone_from(&self.standard_input);
        }
        if self.encoding.is_some() {
            request.stream_encoding.clone_from(&self.encoding);
        }
        if self.timeout_ms.is_some() {
            request.timeout_ms = self.timeout_ms;
        }
        request.no_terminate_on_timeout |= self.no_terminate_on_timeout;
        request.wait_for_child_processes |= self.wait_for_children;
        request.kill_child_processes_with_parent |= self.kill_children;
        Ok(request)
    }
}

/// Runs the launch and returns the exit code to report.
pub async fn run_launch(command: LaunchCommand, defaults: &LaunchDefaults) -> anyhow::Result<i32> {
    let request = command.to_request(defaults)?;
    let cancel = CancellationToken::new();
    let handle = depkit_launcher::launch_with_cancellation(request, cancel.clone())
        .context("failed to launch")?;
    let Some(handle) = handle else {
        tracing::info!("the shell completed the request without starting a process");
        return Ok(0);
    };
    tracing::info!(
        pid = handle.pid(),
        command_line = handle.command_line(),
        "launched"
    );

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let result = handle.wait().await.context("failed to wait for the process");
    ctrl_c.abort();
    let result = result?;

    if command.json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        replay(&result);
    }
    Ok(result.exit_code)
}

fn replay(result: &LaunchResult) {
    for line in &result.stdout {
        println!("{line}");
    }
    for line in &result.stderr {
        eprintln!("{line}");
    }
}

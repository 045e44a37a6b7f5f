use clap::Args;
use depkit_command_line::ParseMode;
use depkit_command_line::argv_to_command_line_with_mode;
use depkit_command_line::command_line_to_argv_with_mode;

#[derive(Debug, Args)]
pub struct SplitCommand {
    /// Command line to split into arguments.
    #[arg(value_name = "COMMAND_LINE", allow_hyphen_values = true)]
    pub command_line: String,

    /// Apply plain msvcrt rules without the installer heuristics.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Debug, Args)]
pub struct JoinCommand {
    /// Arguments to render as one command line.
    #[arg(
        value_name = "ARGS",
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub arguments: Vec<String>,

    /// Apply plain msvcrt rules without the installer heuristics.
    #[arg(long)]
    pub strict: bool,
}

fn mode(strict: bool) -> ParseMode {
    if strict {
        ParseMode::Strict
    } else {
        ParseMode::Compatible
    }
}

/// Prints the argument vector as a JSON array.
pub fn run_split(command: SplitCommand) -> anyhow::Result<()> {
    let argv = command_line_to_argv_with_mode(&command.command_line, mode(command.strict))?;
    println!("{}", serde_json::to_string(&argv)?);
    Ok(())
}

/// Prints the rendered command line; nothing when every argument is empty.
pub fn run_join(command: JoinCommand) -> anyhow::Result<()> {
    if let Some(line) = argv_to_command_line_with_mode(&command.arguments, mode(command.strict)) {
        println!("{line}");
    }
    Ok(())
}

use depkit_command_line::CommandLine;

use crate::LaunchError;
use crate::LaunchRequest;
use crate::env::Environment;
use crate::request::is_rooted;
use crate::request::render_arguments;

/// A request with its variables expanded, ready to hand to the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedCommand {
    pub(crate) file_path: String,
    pub(crate) arguments: Vec<String>,
    pub(crate) rendered_arguments: Option<String>,
    pub(crate) working_directory: Option<String>,
    pub(crate) command_line: CommandLine,
}

/// Expands `%NAME%` references against `env`, the environment the process
/// will run with. `account` names the owner of that environment in errors.
pub(crate) fn resolve_command(
    request: &LaunchRequest,
    env: &Environment,
    account: &str,
) -> Result<ResolvedCommand, LaunchError> {
    let expand_all = request.expand_environment_variables;
    let raw_path = request.normalized_file_path();
    let file_path = if expand_all || raw_path.starts_with('%') {
        env.expand(raw_path, account)?
    } else {
        raw_path.to_string()
    };
    if !request.use_shell_execute && !is_rooted(&file_path) {
        return Err(LaunchError::RelativeFilePath { path: file_path });
    }

    let arguments = if expand_all {
        request
            .arguments
            .iter()
            .map(|argument| env.expand(argument, account))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        request.arguments.clone()
    };
    let working_directory = match request.normalized_working_directory() {
        Some(dir) if expand_all => Some(env.expand(dir, account)?),
        Some(dir) => Some(dir.to_string()),
        None => None,
    };

    let rendered_arguments = render_arguments(&arguments);
    let command_line = CommandLine::for_executable(&file_path, rendered_arguments.as_deref());
    Ok(ResolvedCommand {
        file_path,
        arguments,
        rendered_arguments,
        working_directory,
        command_line,
    })
}

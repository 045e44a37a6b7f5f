//! Windows command-line codec.
//!
//! [`command_line_to_argv`] splits a flat command line into its argument
//! vector and [`argv_to_command_line`] renders an argument vector back into a
//! command line that splits to the same arguments. Both follow the msvcrt
//! backslash/quote conventions, extended with the heuristics installers rely
//! on: literal standalone quotes, `\"...\"` spans, and unquoted paths that
//! contain spaces.

mod command_line;
mod compose;
mod parse;
mod path;

pub use command_line::CommandLine;
pub use compose::argv_to_command_line;
pub use compose::argv_to_command_line_with_mode;
pub use compose::quote_argument;
pub use parse::command_line_to_argv;
pub use parse::command_line_to_argv_with_mode;

/// Selects how much of the heuristic behaviour is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// msvcrt rules plus literal-quote, `\"` span and unquoted-path handling.
    #[default]
    Compatible,
    /// Plain msvcrt rules only.
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandLineError {
    #[error("the command line is empty")]
    EmptyInput,
}

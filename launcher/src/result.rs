use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::LaunchRequest;
use crate::output::CapturedOutput;

/// Exit code reported when a process was terminated because its deadline
/// passed or the launch was cancelled.
pub const TIMEOUT_EXIT_CODE: i32 = -443_991_205;

/// Outcome of a finished launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchResult {
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Arc<LaunchRequest>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_line: Option<String>,
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
    #[serde(default)]
    pub interleaved: Vec<String>,
}

impl LaunchResult {
    /// A result with only an exit code, for outcomes decided without a process.
    pub fn from_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub(crate) fn completed(
        exit_code: i32,
        request: Arc<LaunchRequest>,
        command_line: String,
        output: CapturedOutput,
    ) -> Self {
        Self {
            exit_code,
            request: Some(request),
            command_line: Some(command_line),
            stdout: output.stdout,
            stderr: output.stderr,
            interleaved: output.interleaved,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn synthesized_results_carry_only_the_code() {
        let result = LaunchResult::from_exit_code(TIMEOUT_EXIT_CODE);
        assert!(result.timed_out());
        assert_eq!(result.request, None);
        assert!(result.interleaved.is_empty());
        assert_eq!(
            serde_json::to_value(&result).expect("serialize"),
            serde_json::json!({
                "exit_code": -443991205,
                "stdout": [],
                "stderr": [],
                "interleaved": [],
            })
        );
    }
}

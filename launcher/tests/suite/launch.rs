use std::time::Duration;
use std::time::Instant;

use depkit_launcher::LaunchError;
use depkit_launcher::LaunchHandle;
use depkit_launcher::LaunchRequest;
use depkit_launcher::LaunchResult;
use depkit_launcher::TIMEOUT_EXIT_CODE;
use depkit_launcher::launch;
use depkit_launcher::launch_with_cancellation;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

const SH: &str = "/bin/sh";

fn quiet_sh(arguments: &[&str]) -> LaunchRequest {
    LaunchRequest {
        arguments: arguments.iter().map(|arg| (*arg).to_string()).collect(),
        create_no_window: true,
        ..LaunchRequest::new(SH)
    }
}

fn started(request: LaunchRequest) -> LaunchHandle {
    launch(request)
        .expect("launch succeeds")
        .expect("direct launches produce a handle")
}

async fn finish(handle: LaunchHandle) -> LaunchResult {
    tokio::time::timeout(Duration::from_secs(20), handle.wait())
        .await
        .expect("process finished in time")
        .expect("waiter reported a result")
}

#[tokio::test]
async fn captures_output_and_exit_code() {
    let handle = started(quiet_sh(&["-c", "echo out; echo err 1>&2; exit 3"]));
    assert!(handle.pid() > 0);
    assert_eq!(
        handle.command_line(),
        "\"/bin/sh\" -c \"echo out; echo err 1>&2; exit 3\""
    );
    assert_eq!(
        handle.module_path(),
        std::fs::canonicalize(SH).expect("sh exists")
    );

    let result = finish(handle).await;
    assert_eq!(result.exit_code, 3);
    assert_eq!(result.stdout, vec!["out"]);
    assert_eq!(result.stderr, vec!["err"]);
    let mut interleaved = result.interleaved.clone();
    interleaved.sort();
    assert_eq!(interleaved, vec!["err", "out"]);
    assert_eq!(
        result.command_line.as_deref(),
        Some("\"/bin/sh\" -c \"echo out; echo err 1>&2; exit 3\"")
    );
    assert!(result.request.is_some());
}

#[tokio::test]
async fn single_argument_strings_are_split_like_a_command_line() {
    let result = finish(started(quiet_sh(&["-c \"echo one   two\""]))).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, vec!["one two"]);
}

#[tokio::test]
async fn standard_input_lines_are_written_then_closed() {
    let request = LaunchRequest {
        standard_input: vec!["first".to_string(), "second".to_string()],
        ..quiet_sh(&["-c", "read a; read b; echo \"$b-$a\"; cat"])
    };
    let result = finish(started(request)).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, vec!["second-first"]);
}

#[tokio::test]
async fn deadline_terminates_with_the_reserved_code() {
    let request = LaunchRequest {
        timeout_ms: Some(200),
        ..quiet_sh(&["-c", "sleep 10"])
    };
    let begun = Instant::now();
    let result = finish(started(request)).await;
    assert_eq!(result.exit_code, TIMEOUT_EXIT_CODE);
    assert!(result.timed_out());
    assert!(begun.elapsed() < Duration::from_secs(8));
}

#[tokio::test]
async fn cancellation_acts_like_the_deadline() {
    let cancel = CancellationToken::new();
    let handle = launch_with_cancellation(quiet_sh(&["-c", "sleep 10"]), cancel.clone())
        .expect("launch succeeds")
        .expect("handle");
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    assert_eq!(finish(handle).await.exit_code, TIMEOUT_EXIT_CODE);
}

#[tokio::test]
async fn no_terminate_waits_for_the_natural_exit() {
    let request = LaunchRequest {
        timeout_ms: Some(50),
        no_terminate_on_timeout: true,
        ..quiet_sh(&["-c", "sleep 0.4; exit 4"])
    };
    assert_eq!(finish(started(request)).await.exit_code, 4);
}

#[tokio::test]
async fn waits_for_children_when_asked() {
    let request = LaunchRequest {
        wait_for_child_processes: true,
        ..quiet_sh(&["-c", "(sleep 0.3; echo late) & echo early"])
    };
    let result = finish(started(request)).await;
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, vec!["early", "late"]);
}

#[tokio::test]
async fn children_are_killed_with_the_parent() {
    let request = LaunchRequest {
        kill_child_processes_with_parent: true,
        ..quiet_sh(&["-c", "sleep 30 & echo started"])
    };
    let begun = Instant::now();
    let result = finish(started(request)).await;
    assert_eq!(result.stdout, vec!["started"]);
    assert!(begun.elapsed() < Duration::from_secs(20));
}

#[tokio::test]
async fn environment_variables_expand_per_argument() {
    let path = std::env::var("PATH").expect("PATH is set for tests");
    let request = LaunchRequest {
        expand_environment_variables: true,
        ..quiet_sh(&["-c", "printf '%s\\n' \"$0\"", "%PATH%"])
    };
    let result = finish(started(request)).await;
    assert_eq!(result.stdout, vec![path]);
}

#[test]
fn undefined_variables_fail_before_starting() {
    let request = LaunchRequest {
        expand_environment_variables: true,
        ..quiet_sh(&["-c", "echo %DEPKIT_TEST_SURELY_UNDEFINED%"])
    };
    let err = launch(request).expect_err("variable is undefined");
    assert!(matches!(
        err,
        LaunchError::UndefinedEnvironmentVariable { ref variable, .. }
            if variable == "DEPKIT_TEST_SURELY_UNDEFINED"
    ));
}

#[test]
fn relative_paths_are_rejected() {
    assert!(matches!(
        launch(LaunchRequest::new("sh")),
        Err(LaunchError::RelativeFilePath { .. })
    ));
}

#[test]
fn missing_executables_fail_to_spawn() {
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("missing-tool");
    let err = launch(LaunchRequest::new(missing.to_string_lossy())).expect_err("no such file");
    assert!(matches!(err, LaunchError::Spawn { .. }), "{err}");
}

#[test]
fn shell_verbs_are_windows_only() {
    let request = LaunchRequest {
        use_shell_execute: true,
        verb: Some("open".to_string()),
        ..LaunchRequest::new(SH)
    };
    assert!(matches!(launch(request), Err(LaunchError::Unsupported(_))));
}

#[tokio::test]
async fn unelevated_requests_launch_for_root_and_regular_users() {
    let request = LaunchRequest {
        use_unelevated_token: true,
        ..quiet_sh(&["-c", "exit 0"])
    };
    let result = finish(started(request)).await;
    assert_eq!(result.exit_code, 0);
}

use std::process::Child;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use depkit_running_processes::ProcessDefinition;
use depkit_running_processes::RunningProcessService;
use depkit_running_processes::SysinfoProcessTable;
use depkit_running_processes::match_processes;
use pretty_assertions::assert_eq;

fn sleeper() -> Child {
    Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep")
}

fn this_sleeper(child: &Child) -> ProcessDefinition {
    let pid = child.id();
    ProcessDefinition::new("sleep")
        .with_description("Test sleeper")
        .with_filter(move |info| info.pid == pid)
}

#[test]
fn finds_a_child_process_with_its_arguments() {
    let mut child = sleeper();
    let table = SysinfoProcessTable::new();

    let matches = match_processes(&[this_sleeper(&child)], &table).expect("match");

    child.kill().expect("kill");
    child.wait().expect("reap");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].pid, child.id());
    assert_eq!(matches[0].description, "Test sleeper");
    assert_eq!(matches[0].arguments, vec!["30".to_string()]);
    assert!(
        matches[0].file_path.starts_with('/'),
        "resolved path: {}",
        matches[0].file_path
    );
}

#[tokio::test]
async fn service_reports_when_the_process_goes_away() {
    let mut child = sleeper();
    let service = RunningProcessService::with_table(
        vec![this_sleeper(&child)],
        Arc::new(SysinfoProcessTable::new()),
        Duration::from_millis(50),
    )
    .expect("service");
    let mut changes = service.subscribe();
    service.start().await.expect("start");

    let appeared = tokio::time::timeout(Duration::from_secs(10), changes.recv())
        .await
        .expect("change in time")
        .expect("channel open");
    assert_eq!(appeared.processes.len(), 1);
    assert_eq!(appeared.processes[0].description(), "Test sleeper");

    child.kill().expect("kill");
    child.wait().expect("reap");
    let gone = tokio::time::timeout(Duration::from_secs(10), changes.recv())
        .await
        .expect("change in time")
        .expect("channel open");
    assert!(gone.processes.is_empty());

    service.stop().await.expect("stop");
    service.shutdown().await;
}

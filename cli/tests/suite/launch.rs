use anyhow::Result;
use predicates::str::contains;
use tempfile::TempDir;

fn depkit(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_depkit"));
    cmd.env("DEPKIT_HOME", home.path());
    cmd
}

#[test]
fn launch_exits_with_the_child_code_and_replays_output() -> Result<()> {
    let home = TempDir::new()?;
    depkit(&home)
        .args([
            "launch",
            "--no-window",
            "/bin/sh",
            "--",
            "-c",
            "echo hello; echo oops 1>&2; exit 7",
        ])
        .assert()
        .code(7)
        .stdout(contains("hello"))
        .stderr(contains("oops"));
    Ok(())
}

#[test]
fn launch_json_reports_the_result() -> Result<()> {
    let home = TempDir::new()?;
    let output = depkit(&home)
        .args(["launch", "--no-window", "--json", "/bin/sh", "--", "-c", "echo hi"])
        .output()?;
    assert_eq!(output.status.code(), Some(0));
    let result: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(result["exit_code"], 0);
    assert_eq!(result["stdout"], serde_json::json!(["hi"]));
    Ok(())
}

#[test]
fn config_timeout_applies_to_launches() -> Result<()> {
    let home = TempDir::new()?;
    std::fs::write(
        home.path().join("config.toml"),
        "[launch]\ntimeout_ms = 200\n",
    )?;
    depkit(&home)
        .args(["launch", "--no-window", "/bin/sh", "--", "-c", "sleep 30"])
        .assert()
        .code(depkit_launcher::TIMEOUT_EXIT_CODE & 0xff);
    Ok(())
}

#[test]
fn relative_paths_are_rejected() -> Result<()> {
    let home = TempDir::new()?;
    depkit(&home)
        .args(["launch", "sh"])
        .assert()
        .failure()
        .stderr(contains("is not rooted"));
    Ok(())
}

#[test]
fn broken_config_is_reported() -> Result<()> {
    let home = TempDir::new()?;
    std::fs::write(home.path().join("config.toml"), "[launch\n")?;
    depkit(&home)
        .args(["split", "a"])
        .assert()
        .failure()
        .stderr(contains("failed to parse"));
    Ok(())
}

#[test]
fn watch_once_finds_a_child() -> Result<()> {
    let home = TempDir::new()?;
    let mut child = std::process::Command::new("sleep").arg("31").spawn()?;
    let output = depkit(&home).args(["watch", "--once", "sleep"]).output();
    child.kill()?;
    child.wait()?;
    let output = output?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let pid = child.id();
    assert!(
        stdout
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .any(|info| info["pid"] == pid && info["arguments"] == serde_json::json!(["31"])),
        "missing pid {pid} in {stdout}"
    );
    Ok(())
}

use anyhow::Result;
use predicates::str::diff;
use tempfile::TempDir;

fn depkit(home: &TempDir) -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(env!("CARGO_BIN_EXE_depkit"));
    cmd.env("DEPKIT_HOME", home.path());
    cmd
}

#[test]
fn split_prints_a_json_array() -> Result<()> {
    let home = TempDir::new()?;
    depkit(&home)
        .args(["split", r#""C:\Program Files\App\app.exe" /quiet"#])
        .assert()
        .success()
        .stdout(diff(
            "[\"C:\\\\Program Files\\\\App\\\\app.exe\",\"/quiet\"]\n",
        ));
    Ok(())
}

#[test]
fn split_rejects_blank_input() -> Result<()> {
    let home = TempDir::new()?;
    depkit(&home)
        .args(["split", "   "])
        .assert()
        .failure()
        .stderr(predicates::str::contains("the command line is empty"));
    Ok(())
}

#[test]
fn join_quotes_what_needs_quoting() -> Result<()> {
    let home = TempDir::new()?;
    depkit(&home)
        .args(["join", "--", "setup.exe", "/log", "C:\\My Logs\\", "-q"])
        .assert()
        .success()
        .stdout(diff("setup.exe /log \"C:\\My Logs\\\\\" -q\n"));
    Ok(())
}

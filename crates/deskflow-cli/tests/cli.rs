use std::path::Path;
use std::process::{Command, Output, Stdio};

fn deskflow(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_deskflow"))
        .args(args)
        .arg("--config")
        .arg(dir.join("settings.json"))
        .env("DESKFLOW_STORE_PATH", dir.join("store.json"))
        .env("DESKFLOW_DEFAULT_DELAY_MS", "0")
        .env_remove("DESKFLOW_API_PORT")
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

#[test]
fn test_run_prints_summary() {
    let dir = tempfile::tempdir().unwrap();
    let flow = dir.path().join("flow.json");
    std::fs::write(
        &flow,
        r#"[
            {"type": "set_var", "name": "greeting", "value": "hello {{who}}"},
            {"type": "loop", "count": 2, "body_steps": [{"type": "delay", "ms": 1}]}
        ]"#,
    )
    .unwrap();

    let output = deskflow(
        dir.path(),
        &["run", flow.to_str().unwrap(), "--var", "who=world", "-v"],
    );
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "{stdout}");
    assert!(stdout.contains("Execution Summary:"));
    assert!(stdout.contains("hello world"));
    assert!(stdout.contains("Errors:   0"));
}

#[test]
fn test_run_rejects_malformed_flow() {
    let dir = tempfile::tempdir().unwrap();
    let flow = dir.path().join("flow.json");
    std::fs::write(&flow, r#"{"type": "#).unwrap();

    let output = deskflow(dir.path(), &["run", flow.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("parsing"));
}

#[test]
fn test_script_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.lua");

    let output = deskflow(dir.path(), &["script", missing.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("file not found"));
}

#[test]
fn test_script_host_reports_lua_errors() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.lua");
    let bad = dir.path().join("bad.lua");
    std::fs::write(&good, "local total = 1 + 2\nprint(total)\n").unwrap();
    std::fs::write(&bad, "error('boom')\n").unwrap();

    let output = deskflow(dir.path(), &["script-host", good.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "3");

    let output = deskflow(dir.path(), &["script-host", bad.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("boom"));
}

#[test]
fn test_malformed_settings_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("settings.json"), "not json").unwrap();
    let flow = dir.path().join("flow.json");
    std::fs::write(&flow, "[]").unwrap();

    let output = deskflow(dir.path(), &["run", flow.to_str().unwrap()]);
    assert!(!output.status.success());
}

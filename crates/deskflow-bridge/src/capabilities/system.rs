use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use serde_json::Value;

use crate::error::{BridgeError, Result};
use crate::registry::MethodRegistry;
use crate::runner::{hide_console, wait_with_deadline};

const RUN_TIMEOUT: Duration = Duration::from_secs(30);

/// `cmd` wrapped for the platform shell: `cmd /C`, `powershell -Command`
/// or `sh -c`.
pub fn shell_command(cmd: &str, shell_type: &str) -> Command {
    let mut command = if cfg!(windows) {
        if shell_type == "powershell" {
            let mut c = Command::new("powershell");
            c.args(["-NoProfile", "-Command", cmd]);
            c
        } else {
            let mut c = Command::new("cmd");
            c.args(["/C", cmd]);
            c
        }
    } else {
        let mut c = Command::new("sh");
        c.args(["-c", cmd]);
        c
    };
    hide_console(&mut command);
    command
}

/// Runs `cmd` through the shell and returns its stdout. The child is killed
/// once `timeout` elapses.
pub fn run_shell(cmd: &str, shell_type: &str, timeout: Duration) -> Result<String> {
    let mut child = shell_command(cmd, shell_type)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| BridgeError::Command(format!("{cmd}: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::Command("stdout not captured".into()))?;
    let reader = thread::spawn(move || {
        let mut bytes = Vec::new();
        let _ = stdout.read_to_end(&mut bytes);
        bytes
    });

    if wait_with_deadline(&mut child, timeout)?.is_none() {
        let _ = child.kill();
        let _ = child.wait();
        return Err(BridgeError::Command(format!(
            "'{cmd}' timed out after {}s",
            timeout.as_secs()
        )));
    }

    let bytes = reader
        .join()
        .map_err(|_| BridgeError::Command("output reader panicked".into()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub fn register(registry: &mut MethodRegistry) {
    registry.register("system.env", |p| {
        Ok(Value::String(
            std::env::var(p.str_or("name", "")?).unwrap_or_default(),
        ))
    });

    registry.register("system.run", |p| {
        let output = run_shell(p.str("cmd")?, p.str_or("shell_type", "cmd")?, RUN_TIMEOUT)?;
        Ok(Value::String(output))
    });

    registry.register("system.open", |p| {
        let path = p.str("path")?;
        open::that(path).map_err(|e| BridgeError::Command(format!("open {path}: {e}")))?;
        Ok(Value::Bool(true))
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_run_shell_returns_stdout() {
        let out = run_shell("echo hello; echo oops >&2", "cmd", RUN_TIMEOUT).unwrap();
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_run_shell_is_bounded() {
        let started = std::time::Instant::now();
        let result = run_shell("sleep 5", "cmd", Duration::from_millis(300));
        assert!(matches!(result, Err(BridgeError::Command(_))));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}

//! Runs user scripts in a separate interpreter process that can reach the
//! host only through the RPC port handed to it in the environment.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, bounded};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::protocol::API_PORT_ENV;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const READER_GRACE: Duration = Duration::from_secs(2);
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Receives each output line as it is read. Stderr lines carry a
/// `[stderr] ` prefix.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// `-1` on timeout or launch failure.
    pub returncode: i32,
}

impl ScriptResult {
    fn failure(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            returncode: -1,
        }
    }
}

/// How script files are executed: `program args.. <file>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interpreter {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extension given to temporary files holding inline code.
    pub extension: String,
    /// Prepended to inline code; binds the SDK before the user's body runs.
    pub preamble: String,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            program: PathBuf::from("deskflow"),
            args: vec!["script-host".to_string()],
            extension: "lua".to_string(),
            preamble: "local ctx = deskflow.connect()\n".to_string(),
        }
    }
}

pub struct ScriptRunner {
    interpreter: Interpreter,
    api_port: u16,
}

impl ScriptRunner {
    pub const fn new(interpreter: Interpreter, api_port: u16) -> Self {
        Self {
            interpreter,
            api_port,
        }
    }

    pub const fn api_port(&self) -> u16 {
        self.api_port
    }

    /// Runs inline `code` after the interpreter's preamble.
    pub fn run(&self, code: &str, timeout_secs: u64, on_output: Option<OutputSink>) -> ScriptResult {
        let file = tempfile::Builder::new()
            .prefix("deskflow-script-")
            .suffix(&format!(".{}", self.interpreter.extension))
            .tempfile()
            .and_then(|mut file| {
                file.write_all(self.interpreter.preamble.as_bytes())?;
                file.write_all(code.as_bytes())?;
                file.write_all(b"\n")?;
                file.flush()?;
                Ok(file)
            });

        match file {
            Ok(file) => self.execute(file.path(), timeout_secs, on_output),
            Err(e) => ScriptResult::failure(format!("cannot write script: {e}")),
        }
    }

    pub fn run_file(
        &self,
        path: &Path,
        timeout_secs: u64,
        on_output: Option<OutputSink>,
    ) -> ScriptResult {
        if !path.is_file() {
            return ScriptResult::failure(format!("file not found: {}", path.display()));
        }
        self.execute(path, timeout_secs, on_output)
    }

    fn execute(&self, script: &Path, timeout_secs: u64, on_output: Option<OutputSink>) -> ScriptResult {
        let mut command = Command::new(&self.interpreter.program);
        command
            .args(&self.interpreter.args)
            .arg(script)
            .env(API_PORT_ENV, self.api_port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console(&mut command);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::warn!(
                    "cannot start {}: {e}",
                    self.interpreter.program.display()
                );
                return ScriptResult::failure(e.to_string());
            }
        };

        let stdout = Arc::new(Mutex::new(String::new()));
        let stderr = Arc::new(Mutex::new(String::new()));
        let readers = [
            child.stdout.take().map(|pipe| {
                spawn_reader(pipe, "", Arc::clone(&stdout), on_output.clone())
            }),
            child.stderr.take().map(|pipe| {
                spawn_reader(pipe, "[stderr] ", Arc::clone(&stderr), on_output.clone())
            }),
        ];

        let timeout = Duration::from_secs(timeout_secs);
        let status = match wait_with_deadline(&mut child, timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                log::warn!("script timed out after {timeout_secs}s");
                let stderr = format!("script timed out ({timeout_secs}s)\n{}", stderr.lock());
                return ScriptResult {
                    success: false,
                    stdout: stdout.lock().clone(),
                    stderr,
                    returncode: -1,
                };
            }
            Err(e) => {
                let _ = child.kill();
                return ScriptResult::failure(e.to_string());
            }
        };

        // A grandchild holding the pipes open must not stall the result.
        for done in readers.iter().flatten() {
            let _ = done.recv_timeout(READER_GRACE);
        }

        result_from(status, stdout.lock().clone(), stderr.lock().clone())
    }
}

fn result_from(status: ExitStatus, stdout: String, stderr: String) -> ScriptResult {
    ScriptResult {
        success: status.success(),
        stdout,
        stderr,
        returncode: status.code().unwrap_or(-1),
    }
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: R,
    prefix: &'static str,
    buffer: Arc<Mutex<String>>,
    sink: Option<OutputSink>,
) -> Receiver<()> {
    let (done_tx, done_rx) = bounded(1);
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw);
                    buffer.lock().push_str(&line);
                    if let Some(sink) = &sink {
                        sink(&format!("{prefix}{line}"));
                    }
                }
            }
        }
        let _ = done_tx.send(());
    });
    done_rx
}

/// Polls `child` until it exits or `timeout` passes. `None` means it is
/// still running.
pub(crate) fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(windows)]
pub(crate) fn hide_console(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    command.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
pub(crate) const fn hide_console(_command: &mut Command) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_runner() -> ScriptRunner {
        ScriptRunner::new(
            Interpreter {
                program: PathBuf::from("sh"),
                args: Vec::new(),
                extension: "sh".to_string(),
                preamble: String::new(),
            },
            4242,
        )
    }

    #[test]
    fn test_inline_code_sees_port_and_streams_output() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink_lines = Arc::clone(&lines);
        let sink: OutputSink = Arc::new(move |line: &str| sink_lines.lock().push(line.to_string()));

        let result = sh_runner().run(
            "echo \"port=$DESKFLOW_API_PORT\"\necho warn >&2",
            5,
            Some(sink),
        );

        assert!(result.success);
        assert_eq!(result.returncode, 0);
        assert_eq!(result.stdout, "port=4242\n");
        assert_eq!(result.stderr, "warn\n");
        let mut seen = lines.lock().clone();
        seen.sort();
        assert_eq!(seen, vec!["[stderr] warn\n", "port=4242\n"]);
    }

    #[test]
    fn test_exit_status_is_reported() {
        let result = sh_runner().run("exit 3", 5, None);
        assert!(!result.success);
        assert_eq!(result.returncode, 3);
    }

    #[test]
    fn test_timeout_kills_and_keeps_output() {
        let started = Instant::now();
        let result = sh_runner().run("echo started\nwhile true; do :; done", 1, None);

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(!result.success);
        assert_eq!(result.returncode, -1);
        assert!(result.stderr.starts_with("script timed out (1s)\n"));
        assert_eq!(result.stdout, "started\n");
    }

    #[test]
    fn test_missing_file_is_a_failed_result() {
        let result = sh_runner().run_file(Path::new("/nonexistent/script.sh"), 5, None);
        assert!(!result.success);
        assert_eq!(result.returncode, -1);
        assert!(result.stderr.contains("file not found"));
    }

    #[test]
    fn test_launch_failure_is_a_failed_result() {
        let runner = ScriptRunner::new(
            Interpreter {
                program: PathBuf::from("/nonexistent/interpreter"),
                ..Interpreter::default()
            },
            1,
        );
        let result = runner.run("print(1)", 5, None);
        assert!(!result.success);
        assert_eq!(result.returncode, -1);
        assert!(!result.stderr.is_empty());
    }
}

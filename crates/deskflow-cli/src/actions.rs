use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use deskflow_bridge::{OutputSink, ScriptRunner, UiBridge, UiPrompt, shell_command};
use deskflow_core::{ActionDispatcher, CancelToken, CoreError, Result, Step};
use deskflow_platform::{Platform, WindowCommand};

fn action_error(what: &str, error: impl std::fmt::Display) -> CoreError {
    CoreError::Action(format!("{what}: {error}"))
}

/// Performs the primitive steps of a flow against the real desktop.
pub struct HostActions {
    platform: Platform,
    ui: UiBridge,
    runner: Arc<ScriptRunner>,
}

impl HostActions {
    pub const fn new(platform: Platform, ui: UiBridge, runner: Arc<ScriptRunner>) -> Self {
        Self {
            platform,
            ui,
            runner,
        }
    }

    fn launch(target: &str, args: &str) -> Result<()> {
        if args.trim().is_empty() {
            return open::that_detached(target).map_err(|e| action_error(target, e));
        }
        Command::new(target)
            .args(args.split_whitespace())
            .stdin(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(|e| action_error(target, e))
    }

    fn run_script(&self, code: &str, file: &str, timeout: u64) -> Result<()> {
        let sink: OutputSink = Arc::new(|line: &str| tracing::info!("script: {}", line.trim_end()));
        let result = if file.is_empty() {
            self.runner.run(code, timeout, Some(sink))
        } else {
            self.runner.run_file(Path::new(file), timeout, Some(sink))
        };

        if result.success {
            return Ok(());
        }
        let reason = result
            .stderr
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("no output")
            .to_string();
        Err(CoreError::Action(format!(
            "script exited with {}: {reason}",
            result.returncode
        )))
    }
}

impl ActionDispatcher for HostActions {
    fn dispatch(&self, step: &Step, _cancel: &CancelToken) -> Result<()> {
        match step {
            Step::App { target, args } if !target.is_empty() => Self::launch(target, args),
            Step::File { target } | Step::Folder { target } | Step::Url { target }
                if !target.is_empty() =>
            {
                open::that_detached(target).map_err(|e| action_error(target, e))
            }
            Step::Shell { target, shell_type } if !target.is_empty() => {
                shell_command(target, shell_type)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()
                    .map(drop)
                    .map_err(|e| action_error(target, e))
            }
            Step::Snippet { target } if !target.is_empty() => self
                .platform
                .desktop
                .set_clipboard_text(target)
                .map_err(CoreError::from),
            Step::Keys { target, .. } if !target.is_empty() => {
                self.platform.send_combo(target).map_err(CoreError::from)
            }
            Step::TypeText { text } if !text.is_empty() => {
                self.platform.input.type_text(text).map_err(CoreError::from)
            }
            Step::Toast { message } => {
                if self
                    .ui
                    .show(UiPrompt::Toast {
                        message: message.clone(),
                        duration_ms: 1500,
                    })
                    .is_err()
                {
                    tracing::info!("toast: {message}");
                }
                Ok(())
            }
            Step::WindowActivate { title } if !title.is_empty() => self
                .platform
                .command_window(title, WindowCommand::Activate)
                .map(drop)
                .map_err(CoreError::from),
            Step::Script {
                code,
                file,
                timeout,
            } if !code.trim().is_empty() || !file.is_empty() => {
                self.run_script(code, file, *timeout)
            }
            step if step.is_action() => {
                tracing::debug!("{} step with empty target skipped", step.kind());
                Ok(())
            }
            other => Err(CoreError::Action(format!(
                "{} is not a primitive action",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::Receiver;
    use deskflow_bridge::{Interpreter, UiRequest};
    use deskflow_platform::fake::{FakeBackend, InputCall};
    use deskflow_platform::{DesktopBackend, WindowInfo};

    fn actions() -> (Arc<FakeBackend>, HostActions, Receiver<UiRequest>) {
        let fake = Arc::new(FakeBackend::new());
        let (ui, ui_rx) = UiBridge::new();
        let runner = Arc::new(ScriptRunner::new(Interpreter::default(), 0));
        let platform = Platform::new(fake.clone(), fake.clone());
        (fake, HostActions::new(platform, ui, runner), ui_rx)
    }

    #[test]
    fn test_input_actions() {
        let (fake, actions, _ui) = actions();
        let cancel = CancelToken::new();
        actions
            .dispatch(
                &Step::Keys {
                    target: "ctrl+a".into(),
                    label: String::new(),
                },
                &cancel,
            )
            .unwrap();
        actions
            .dispatch(&Step::TypeText { text: "abc".into() }, &cancel)
            .unwrap();
        actions
            .dispatch(&Step::Snippet { target: "clip".into() }, &cancel)
            .unwrap();

        assert_eq!(
            fake.input_calls(),
            vec![
                InputCall::Keys(vec![0x11, 0x41]),
                InputCall::Text("abc".into())
            ]
        );
        assert_eq!(fake.clipboard_text().unwrap(), "clip");
    }

    #[test]
    fn test_empty_targets_are_skipped() {
        let (fake, actions, _ui) = actions();
        let cancel = CancelToken::new();
        for step in [
            Step::App {
                target: String::new(),
                args: String::new(),
            },
            Step::Keys {
                target: String::new(),
                label: String::new(),
            },
            Step::WindowActivate {
                title: String::new(),
            },
        ] {
            actions.dispatch(&step, &cancel).unwrap();
        }
        assert!(fake.input_calls().is_empty());
    }

    #[test]
    fn test_window_activate_reports_missing_window() {
        let (fake, actions, _ui) = actions();
        let cancel = CancelToken::new();
        let step = Step::WindowActivate {
            title: "notepad".into(),
        };
        assert!(matches!(
            actions.dispatch(&step, &cancel),
            Err(CoreError::Host(_))
        ));

        fake.add_window(
            WindowInfo {
                handle: 3,
                title: "Untitled - Notepad".into(),
                ..WindowInfo::default()
            },
            "notepad.exe",
        );
        actions.dispatch(&step, &cancel).unwrap();
        assert_eq!(fake.window_commands(), vec![(3, WindowCommand::Activate)]);
    }

    #[test]
    fn test_toast_goes_to_ui() {
        let (_fake, actions, ui) = actions();
        actions
            .dispatch(
                &Step::Toast {
                    message: "done".into(),
                },
                &CancelToken::new(),
            )
            .unwrap();
        let request = ui.try_recv().unwrap();
        assert!(matches!(&request.prompt, UiPrompt::Toast { message, .. } if message == "done"));
    }

    #[test]
    fn test_control_flow_steps_are_rejected() {
        let (_fake, actions, _ui) = actions();
        let result = actions.dispatch(&Step::Delay { ms: 5 }, &CancelToken::new());
        assert!(matches!(result, Err(CoreError::Action(_))));
    }
}

//! Terminal stand-in for the host's prompt windows. Prompts raised by
//! scripts are printed; the next stdin line answers them.

use std::io::{self, BufRead, Write};
use std::thread;

use crossbeam::channel::{Receiver, never, select, unbounded};
use deskflow_bridge::ui::PROMPT_TIMEOUT;
use deskflow_bridge::{UiAnswer, UiPrompt, UiRequest};
use deskflow_core::LogEntry;

use crate::runtime::HostRuntime;

/// Lines typed on stdin, read on a background thread. The channel closes at
/// end of input.
pub fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("deskflow-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("console input unavailable: {e}");
    }
    rx
}

/// Interprets a typed line as the answer to `prompt`. `None` means input
/// ended before the user answered.
pub fn answer(prompt: &UiPrompt, line: Option<&str>) -> UiAnswer {
    let Some(line) = line.map(str::trim) else {
        return UiAnswer::Cancelled;
    };

    match prompt {
        UiPrompt::Input { default, .. } if line.is_empty() => UiAnswer::Text(default.clone()),
        UiPrompt::Input { .. } => UiAnswer::Text(line.to_owned()),
        UiPrompt::Confirm { .. } => {
            UiAnswer::Confirmed(matches!(line.to_lowercase().as_str(), "y" | "yes"))
        }
        UiPrompt::Select { options, .. } => {
            let by_index = line
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| options.get(i));
            by_index
                .or_else(|| options.iter().find(|o| o.eq_ignore_ascii_case(line)))
                .map_or(UiAnswer::Cancelled, |o| UiAnswer::Selected(o.clone()))
        }
        UiPrompt::Toast { .. } | UiPrompt::Notify { .. } => UiAnswer::Cancelled,
    }
}

fn format_entry(entry: &LogEntry) -> String {
    format!(
        "{} {} [{}] {}: {}",
        entry.run_id.as_deref().unwrap_or("-"),
        entry.timestamp,
        entry.level.as_str(),
        entry.activity.as_str(),
        entry.message
    )
}

fn render(prompt: &UiPrompt) -> String {
    match prompt {
        UiPrompt::Toast { message, .. } => format!("[toast] {message}\n"),
        UiPrompt::Notify { title, message } => format!("[{title}] {message}\n"),
        UiPrompt::Input { title, default } if default.is_empty() => format!("{title}: "),
        UiPrompt::Input { title, default } => format!("{title} [{default}]: "),
        UiPrompt::Confirm { title, message } => format!("{title}: {message} [y/N] "),
        UiPrompt::Select { title, options } => {
            let mut text = format!("{title}\n");
            for (i, option) in options.iter().enumerate() {
                text.push_str(&format!("  {}) {option}\n", i + 1));
            }
            text.push_str(&format!("choose 1-{}: ", options.len()));
            text
        }
    }
}

/// Shows one request and, if it wants an answer, waits for the next line.
/// Without input every question is cancelled at once.
pub fn handle_request(request: UiRequest, lines: Option<&Receiver<String>>) {
    print!("{}", render(&request.prompt));
    let _ = io::stdout().flush();

    if !request.prompt.expects_answer() {
        return;
    }
    let line = lines.and_then(|lines| lines.recv_timeout(PROMPT_TIMEOUT).ok());
    if line.is_none() {
        println!();
    }
    let answer = answer(&request.prompt, line.as_deref());
    request.respond(answer);
}

/// Serves prompts until every [`deskflow_bridge::UiBridge`] is gone.
pub fn serve_prompts(ui_rx: &Receiver<UiRequest>, lines: &Receiver<String>) {
    for request in ui_rx {
        handle_request(request, Some(lines));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleCommand {
    Status,
    Log,
    Stop,
    Quit,
    Help,
}

impl ConsoleCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "status" => Some(Self::Status),
            "log" => Some(Self::Log),
            "stop" => Some(Self::Stop),
            "quit" | "exit" => Some(Self::Quit),
            "help" | "?" => Some(Self::Help),
            _ => None,
        }
    }
}

enum ConsoleEvent {
    Prompt(UiRequest),
    Line(String),
    InputClosed,
    UiClosed,
}

const HELP: &str = "commands: status, log (recent flow output), stop (cancel running flows), quit";

/// Interactive loop of `deskflow serve`. Returns on `quit`. Once stdin
/// closes only prompts are served and every question counts as cancelled.
pub fn run_console(runtime: &HostRuntime, ui_rx: &Receiver<UiRequest>, lines: Receiver<String>) {
    let idle = never();
    let mut input = Some(lines);
    println!("{HELP}");

    loop {
        let event = select! {
            recv(ui_rx) -> request => request.map_or(ConsoleEvent::UiClosed, ConsoleEvent::Prompt),
            recv(input.as_ref().unwrap_or(&idle)) -> line => line.map_or(ConsoleEvent::InputClosed, ConsoleEvent::Line),
        };

        match event {
            ConsoleEvent::Prompt(request) => handle_request(request, input.as_ref()),
            ConsoleEvent::UiClosed => break,
            ConsoleEvent::InputClosed => {
                tracing::info!("stdin closed, console commands disabled");
                input = None;
            }
            ConsoleEvent::Line(line) if line.trim().is_empty() => {}
            ConsoleEvent::Line(line) => match ConsoleCommand::parse(&line) {
                Some(ConsoleCommand::Status) => {
                    let status = runtime.status();
                    println!(
                        "api port {} | {} connection(s) | {} hotkey(s) | {} running flow(s) | {} recent error(s)",
                        status.api_port,
                        status.connections,
                        status.hotkeys,
                        status.active_flows,
                        status.recent_errors
                    );
                }
                Some(ConsoleCommand::Log) => {
                    let recent = runtime.launcher().recent_log();
                    if recent.is_empty() {
                        println!("no flow has run in the background yet");
                    }
                    for entry in &recent {
                        println!("{}", format_entry(entry));
                    }
                }
                Some(ConsoleCommand::Stop) => {
                    println!("stopped {} flow(s)", runtime.launcher().stop_all());
                }
                Some(ConsoleCommand::Quit) => break,
                Some(ConsoleCommand::Help) => println!("{HELP}"),
                None => println!("unknown command '{}'; {HELP}", line.trim()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskflow_bridge::UiBridge;

    fn select_prompt() -> UiPrompt {
        UiPrompt::Select {
            title: "Pick".into(),
            options: vec!["red".into(), "green".into()],
        }
    }

    #[test]
    fn test_input_answer_falls_back_to_default() {
        let prompt = UiPrompt::Input {
            title: "Name".into(),
            default: "anon".into(),
        };
        assert_eq!(answer(&prompt, Some("  ")), UiAnswer::Text("anon".into()));
        assert_eq!(answer(&prompt, Some("ada\r")), UiAnswer::Text("ada".into()));
        assert_eq!(answer(&prompt, None), UiAnswer::Cancelled);
    }

    #[test]
    fn test_confirm_answer() {
        let prompt = UiPrompt::Confirm {
            title: "Sure".into(),
            message: "delete?".into(),
        };
        assert_eq!(answer(&prompt, Some("Y")), UiAnswer::Confirmed(true));
        assert_eq!(answer(&prompt, Some("yes")), UiAnswer::Confirmed(true));
        assert_eq!(answer(&prompt, Some("")), UiAnswer::Confirmed(false));
    }

    #[test]
    fn test_select_by_index_or_text() {
        let prompt = select_prompt();
        assert_eq!(answer(&prompt, Some("2")), UiAnswer::Selected("green".into()));
        assert_eq!(answer(&prompt, Some("RED")), UiAnswer::Selected("red".into()));
        assert_eq!(answer(&prompt, Some("0")), UiAnswer::Cancelled);
        assert_eq!(answer(&prompt, Some("3")), UiAnswer::Cancelled);
        assert_eq!(answer(&prompt, Some("blue")), UiAnswer::Cancelled);
    }

    #[test]
    fn test_render_select_lists_options() {
        assert_eq!(
            render(&select_prompt()),
            "Pick\n  1) red\n  2) green\nchoose 1-2: "
        );
    }

    #[test]
    fn test_handle_request_answers_from_lines() {
        let (bridge, ui_rx) = UiBridge::new();
        let (line_tx, lines) = unbounded();
        line_tx.send("1".to_string()).unwrap();

        let asker = thread::spawn(move || bridge.ask(select_prompt()).unwrap());
        handle_request(ui_rx.recv().unwrap(), Some(&lines));
        assert_eq!(asker.join().unwrap(), UiAnswer::Selected("red".into()));
    }

    #[test]
    fn test_closed_input_cancels() {
        let (bridge, ui_rx) = UiBridge::new();
        let (line_tx, lines) = unbounded::<String>();
        drop(line_tx);

        let asker = thread::spawn(move || {
            bridge
                .ask(UiPrompt::Input {
                    title: "Name".into(),
                    default: String::new(),
                })
                .unwrap()
        });
        serve_prompts(&ui_rx, &lines);
        assert_eq!(asker.join().unwrap(), UiAnswer::Cancelled);
    }

    #[test]
    fn test_console_commands() {
        assert_eq!(ConsoleCommand::parse(" Status "), Some(ConsoleCommand::Status));
        assert_eq!(ConsoleCommand::parse("exit"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse("LOG"), Some(ConsoleCommand::Log));
        assert_eq!(ConsoleCommand::parse("launch"), None);
    }

    #[test]
    fn test_format_entry_names_the_run() {
        let entry = LogEntry {
            timestamp: "[00:01.250]".into(),
            run_id: Some(deskflow_core::RunId::new("r1")),
            level: deskflow_core::LogLevel::Error,
            activity: deskflow_core::LogActivity::Action,
            message: "window not found".into(),
        };
        assert_eq!(
            format_entry(&entry),
            "r1 [00:01.250] [ERROR] ACTION: window not found"
        );
    }
}

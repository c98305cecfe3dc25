//! Hand-off of prompt requests from RPC handler threads to whichever thread
//! owns the host's user interface.

use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use serde_json::Value;

use crate::error::{BridgeError, Result};

/// Longest a handler thread waits for the user.
pub const PROMPT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiPrompt {
    Toast { message: String, duration_ms: u64 },
    Notify { title: String, message: String },
    Input { title: String, default: String },
    Confirm { title: String, message: String },
    Select { title: String, options: Vec<String> },
}

impl UiPrompt {
    /// Toasts and notifications do not wait for an answer.
    pub const fn expects_answer(&self) -> bool {
        matches!(
            self,
            Self::Input { .. } | Self::Confirm { .. } | Self::Select { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAnswer {
    Text(String),
    Confirmed(bool),
    Selected(String),
    Cancelled,
}

impl UiAnswer {
    pub fn into_value(self) -> Value {
        match self {
            Self::Text(text) | Self::Selected(text) => Value::String(text),
            Self::Confirmed(yes) => Value::Bool(yes),
            Self::Cancelled => Value::Null,
        }
    }
}

/// One prompt waiting to be shown by the UI thread.
#[derive(Debug)]
pub struct UiRequest {
    pub prompt: UiPrompt,
    reply: Option<Sender<UiAnswer>>,
}

impl UiRequest {
    /// Delivers the user's answer. Answers to fire-and-forget prompts, or
    /// to a handler that already gave up, are dropped.
    pub fn respond(self, answer: UiAnswer) {
        if let Some(reply) = self.reply {
            let _ = reply.send(answer);
        }
    }
}

#[derive(Clone)]
pub struct UiBridge {
    tx: Sender<UiRequest>,
    timeout: Duration,
}

impl UiBridge {
    /// Bridge plus the receiving end the UI thread drains.
    pub fn new() -> (Self, Receiver<UiRequest>) {
        Self::with_timeout(PROMPT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> (Self, Receiver<UiRequest>) {
        let (tx, rx) = unbounded();
        (Self { tx, timeout }, rx)
    }

    /// Queues a prompt that needs no answer.
    pub fn show(&self, prompt: UiPrompt) -> Result<()> {
        self.tx
            .send(UiRequest {
                prompt,
                reply: None,
            })
            .map_err(|_| BridgeError::UiUnavailable)
    }

    /// Queues `prompt` and blocks until the UI answers. No answer within the
    /// timeout counts as cancelled.
    pub fn ask(&self, prompt: UiPrompt) -> Result<UiAnswer> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(UiRequest {
                prompt,
                reply: Some(reply_tx),
            })
            .map_err(|_| BridgeError::UiUnavailable)?;

        match reply_rx.recv_timeout(self.timeout) {
            Ok(answer) => Ok(answer),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("ui prompt unanswered after {:?}", self.timeout);
                Ok(UiAnswer::Cancelled)
            }
            Err(RecvTimeoutError::Disconnected) => Ok(UiAnswer::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ask_waits_for_answer() {
        let (bridge, rx) = UiBridge::new();
        let ui = thread::spawn(move || {
            let request = rx.recv().unwrap();
            assert!(request.prompt.expects_answer());
            request.respond(UiAnswer::Text("typed".into()));
        });

        let answer = bridge
            .ask(UiPrompt::Input {
                title: "Name".into(),
                default: String::new(),
            })
            .unwrap();
        assert_eq!(answer, UiAnswer::Text("typed".into()));
        ui.join().unwrap();
    }

    #[test]
    fn test_unanswered_prompt_times_out_as_cancelled() {
        let (bridge, _rx) = UiBridge::with_timeout(Duration::from_millis(50));
        let answer = bridge
            .ask(UiPrompt::Confirm {
                title: "Sure?".into(),
                message: String::new(),
            })
            .unwrap();
        assert_eq!(answer, UiAnswer::Cancelled);
        assert_eq!(answer.into_value(), Value::Null);
    }

    #[test]
    fn test_dropped_request_cancels() {
        let (bridge, rx) = UiBridge::new();
        let ui = thread::spawn(move || drop(rx.recv().unwrap()));
        let answer = bridge
            .ask(UiPrompt::Select {
                title: "Pick".into(),
                options: vec!["a".into()],
            })
            .unwrap();
        assert_eq!(answer, UiAnswer::Cancelled);
        ui.join().unwrap();
    }

    #[test]
    fn test_no_ui_thread() {
        let (bridge, rx) = UiBridge::new();
        drop(rx);
        let result = bridge.show(UiPrompt::Toast {
            message: "hi".into(),
            duration_ms: 1500,
        });
        assert!(matches!(result, Err(BridgeError::UiUnavailable)));
    }
}

//! Scriptable `Desktop` and `ActionDispatcher` doubles for interpreter tests.

use parking_lot::Mutex;

use crate::cancel::CancelToken;
use crate::desktop::{ActionDispatcher, Desktop, Rgb};
use crate::error::{CoreError, Result};
use crate::step::{MouseButton, Step};

#[derive(Default)]
struct DesktopState {
    title: String,
    process: String,
    clipboard: String,
    pixel: Rgb,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct MockDesktop {
    state: Mutex<DesktopState>,
}

impl MockDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_title(&self, title: &str) {
        self.state.lock().title = title.to_string();
    }

    pub fn set_process(&self, process: &str) {
        self.state.lock().process = process.to_string();
    }

    pub fn set_clipboard(&self, text: &str) {
        self.state.lock().clipboard = text.to_string();
    }

    pub fn set_pixel(&self, color: Rgb) {
        self.state.lock().pixel = color;
    }

    pub fn clipboard(&self) -> String {
        self.state.lock().clipboard.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }
}

impl Desktop for MockDesktop {
    fn clipboard_text(&self) -> Result<String> {
        Ok(self.state.lock().clipboard.clone())
    }

    fn set_clipboard_text(&self, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.clipboard = text.to_string();
        state.calls.push(format!("set_clipboard {text}"));
        Ok(())
    }

    fn foreground_title(&self) -> Result<String> {
        Ok(self.state.lock().title.clone())
    }

    fn foreground_process(&self) -> Result<String> {
        Ok(self.state.lock().process.clone())
    }

    fn pixel_color(&self, _x: i32, _y: i32) -> Result<Rgb> {
        Ok(self.state.lock().pixel)
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<()> {
        self.state.lock().calls.push(format!("move {x},{y}"));
        Ok(())
    }

    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        self.state
            .lock()
            .calls
            .push(format!("click {} {x},{y}", button.as_str()));
        Ok(())
    }

    fn double_click(&self, x: i32, y: i32) -> Result<()> {
        self.state.lock().calls.push(format!("double_click {x},{y}"));
        Ok(())
    }

    fn scroll(&self, x: i32, y: i32, delta: i32) -> Result<()> {
        self.state
            .lock()
            .calls
            .push(format!("scroll {delta} {x},{y}"));
        Ok(())
    }
}

/// Records every dispatched action; fails those whose kind is in `failing`.
#[derive(Default)]
pub struct MockActions {
    dispatched: Mutex<Vec<Step>>,
    failing: Vec<&'static str>,
}

impl MockActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(kind: &'static str) -> Self {
        Self {
            dispatched: Mutex::default(),
            failing: vec![kind],
        }
    }

    pub fn dispatched(&self) -> Vec<Step> {
        self.dispatched.lock().clone()
    }
}

impl ActionDispatcher for MockActions {
    fn dispatch(&self, step: &Step, _cancel: &CancelToken) -> Result<()> {
        self.dispatched.lock().push(step.clone());
        if self.failing.contains(&step.kind()) {
            return Err(CoreError::Action(format!("{} failed", step.kind())));
        }
        Ok(())
    }
}

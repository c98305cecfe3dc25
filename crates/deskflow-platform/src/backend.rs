//! Seams between the OS and everything above it. Raw hook structs and
//! `SendInput` layouts never leave the implementations of these traits.

use std::sync::Arc;

use deskflow_core::{HotkeyCombo, MouseButton, RawEvent, Rgb};
use serde::Serialize;

use crate::error::Result;

/// A hook callback observation. `injected` marks events synthesized by
/// `SendInput` (ours or another process's).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookEvent {
    pub event: RawEvent,
    pub injected: bool,
}

pub type HookSink = Arc<dyn Fn(HookEvent) + Send + Sync>;

/// Which low-level hooks a session installs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HookSet {
    pub keyboard: bool,
    pub mouse: bool,
}

impl HookSet {
    pub const NONE: Self = Self {
        keyboard: false,
        mouse: false,
    };
    pub const ALL: Self = Self {
        keyboard: true,
        mouse: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMessage {
    Hotkey(i32),
    Wake,
    Quit,
}

/// Cross-thread handle to a running message loop.
pub trait LoopSignal: Send + Sync {
    /// Makes `next_message` return [`LoopMessage::Wake`].
    fn wake(&self);

    /// Makes `next_message` return [`LoopMessage::Quit`].
    fn quit(&self);
}

/// Hooks and hotkeys owned by the thread that opened the session. Dropping
/// the session removes them.
pub trait HookSession {
    /// Blocks until the next message. Hook callbacks run inside this call.
    fn next_message(&mut self) -> LoopMessage;

    fn register_hotkey(&mut self, id: i32, combo: HotkeyCombo) -> Result<()>;

    fn unregister_hotkey(&mut self, id: i32);

    fn signal(&self) -> Arc<dyn LoopSignal>;
}

/// Global hooks plus keyboard and mouse simulation.
pub trait InputBackend: Send + Sync {
    /// Must be called on the thread that will run the session's loop.
    fn open_session(&self, hooks: HookSet, sink: HookSink) -> Result<Box<dyn HookSession>>;

    /// Presses `vks` in order, then releases them in reverse.
    fn send_keys(&self, vks: &[u32]) -> Result<()>;

    fn type_text(&self, text: &str) -> Result<()>;

    fn move_cursor(&self, x: i32, y: i32) -> Result<()>;

    fn mouse_button(&self, button: MouseButton, down: bool) -> Result<()>;

    fn scroll(&self, delta: i32) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowInfo {
    #[serde(rename = "hwnd")]
    pub handle: isize,
    pub title: String,
    #[serde(rename = "pid")]
    pub process_id: u32,
    pub rect: WindowRect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCommand {
    Activate,
    Minimize,
    Maximize,
    Close,
    Move { x: i32, y: i32, width: i32, height: i32 },
    Topmost(bool),
}

/// Queries and manipulation of windows, clipboard and screen.
pub trait DesktopBackend: Send + Sync {
    fn clipboard_text(&self) -> Result<String>;

    fn set_clipboard_text(&self, text: &str) -> Result<()>;

    fn clipboard_files(&self) -> Result<Vec<String>>;

    fn foreground_window(&self) -> Result<Option<WindowInfo>>;

    /// Visible top-level windows with a non-empty title.
    fn list_windows(&self) -> Result<Vec<WindowInfo>>;

    fn window_command(&self, handle: isize, command: WindowCommand) -> Result<()>;

    /// Executable file name of the process, e.g. `notepad.exe`.
    fn process_name(&self, process_id: u32) -> Result<String>;

    fn pixel_color(&self, x: i32, y: i32) -> Result<Rgb>;
}

//! Backends for targets without global hooks or input simulation. Only the
//! clipboard works.

use deskflow_core::{MouseButton, Rgb};

use crate::backend::{
    DesktopBackend, HookSession, HookSet, HookSink, InputBackend, WindowCommand, WindowInfo,
};
use crate::clipboard;
use crate::error::{PlatformError, Result};

pub struct UnsupportedInput;

impl InputBackend for UnsupportedInput {
    fn open_session(&self, _hooks: HookSet, _sink: HookSink) -> Result<Box<dyn HookSession>> {
        Err(PlatformError::NotSupported("global input hooks"))
    }

    fn send_keys(&self, _vks: &[u32]) -> Result<()> {
        Err(PlatformError::NotSupported("key simulation"))
    }

    fn type_text(&self, _text: &str) -> Result<()> {
        Err(PlatformError::NotSupported("text typing"))
    }

    fn move_cursor(&self, _x: i32, _y: i32) -> Result<()> {
        Err(PlatformError::NotSupported("cursor movement"))
    }

    fn mouse_button(&self, _button: MouseButton, _down: bool) -> Result<()> {
        Err(PlatformError::NotSupported("mouse simulation"))
    }

    fn scroll(&self, _delta: i32) -> Result<()> {
        Err(PlatformError::NotSupported("mouse simulation"))
    }
}

pub struct UnsupportedDesktop;

impl DesktopBackend for UnsupportedDesktop {
    fn clipboard_text(&self) -> Result<String> {
        clipboard::get_text()
    }

    fn set_clipboard_text(&self, text: &str) -> Result<()> {
        clipboard::set_text(text)
    }

    fn clipboard_files(&self) -> Result<Vec<String>> {
        Err(PlatformError::NotSupported("clipboard file lists"))
    }

    fn foreground_window(&self) -> Result<Option<WindowInfo>> {
        Err(PlatformError::NotSupported("window queries"))
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Err(PlatformError::NotSupported("window queries"))
    }

    fn window_command(&self, _handle: isize, _command: WindowCommand) -> Result<()> {
        Err(PlatformError::NotSupported("window control"))
    }

    fn process_name(&self, _process_id: u32) -> Result<String> {
        Err(PlatformError::NotSupported("process queries"))
    }

    fn pixel_color(&self, _x: i32, _y: i32) -> Result<Rgb> {
        Err(PlatformError::NotSupported("pixel sampling"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_hooks_report_not_supported() {
        let sink: HookSink = Arc::new(|_| {});
        let err = UnsupportedInput
            .open_session(HookSet::ALL, sink)
            .err()
            .unwrap();
        assert_eq!(err, PlatformError::NotSupported("global input hooks"));
    }

    #[test]
    fn test_window_queries_report_not_supported() {
        assert!(matches!(
            UnsupportedDesktop.list_windows(),
            Err(PlatformError::NotSupported(_))
        ));
        assert!(matches!(
            UnsupportedDesktop.pixel_color(0, 0),
            Err(PlatformError::NotSupported(_))
        ));
    }
}

use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use deskflow_core::{Desktop, EngineConstants, MouseButton, Rgb, parse_keys};

use crate::backend::{DesktopBackend, InputBackend, WindowCommand, WindowInfo};
use crate::error::{PlatformError, Result};

/// The pair of backends the rest of the program talks to.
#[derive(Clone)]
pub struct Platform {
    pub input: Arc<dyn InputBackend>,
    pub desktop: Arc<dyn DesktopBackend>,
}

impl Platform {
    pub fn new(input: Arc<dyn InputBackend>, desktop: Arc<dyn DesktopBackend>) -> Self {
        Self { input, desktop }
    }

    /// Win32 backends on Windows, clipboard-only elsewhere.
    #[cfg(windows)]
    pub fn native() -> Self {
        Self::new(
            Arc::new(crate::win32::Win32Input),
            Arc::new(crate::win32::Win32Desktop),
        )
    }

    #[cfg(not(windows))]
    pub fn native() -> Self {
        Self::new(
            Arc::new(crate::unsupported::UnsupportedInput),
            Arc::new(crate::unsupported::UnsupportedDesktop),
        )
    }

    /// Sends a combo such as `"ctrl+shift+esc"`. Unknown key names are
    /// skipped; an empty result sends nothing.
    pub fn send_combo(&self, combo: &str) -> Result<()> {
        let vks = parse_keys(combo);
        if vks.is_empty() {
            log::warn!("no sendable keys in '{combo}'");
            return Ok(());
        }
        self.input.send_keys(&vks)
    }

    pub fn click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<()> {
        self.input.move_cursor(x, y)?;
        sleep(Duration::from_millis(EngineConstants::CLICK_SETTLE_MS));
        self.input.mouse_button(button, true)?;
        self.input.mouse_button(button, false)
    }

    /// Windows whose title contains `title`, ignoring case.
    pub fn find_windows(&self, title: &str) -> Result<Vec<WindowInfo>> {
        let wanted = title.to_lowercase();
        Ok(self
            .desktop
            .list_windows()?
            .into_iter()
            .filter(|w| w.title.to_lowercase().contains(&wanted))
            .collect())
    }

    /// Applies `command` to the first window matching `title`.
    pub fn command_window(&self, title: &str, command: WindowCommand) -> Result<WindowInfo> {
        let window = self
            .find_windows(title)?
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::WindowNotFound(format!("'{title}'")))?;
        self.desktop.window_command(window.handle, command)?;
        Ok(window)
    }
}

impl Desktop for Platform {
    fn clipboard_text(&self) -> deskflow_core::Result<String> {
        Ok(self.desktop.clipboard_text()?)
    }

    fn set_clipboard_text(&self, text: &str) -> deskflow_core::Result<()> {
        Ok(self.desktop.set_clipboard_text(text)?)
    }

    fn foreground_title(&self) -> deskflow_core::Result<String> {
        Ok(self
            .desktop
            .foreground_window()?
            .map(|w| w.title)
            .unwrap_or_default())
    }

    fn foreground_process(&self) -> deskflow_core::Result<String> {
        match self.desktop.foreground_window()? {
            Some(window) => Ok(self.desktop.process_name(window.process_id)?),
            None => Ok(String::new()),
        }
    }

    fn pixel_color(&self, x: i32, y: i32) -> deskflow_core::Result<Rgb> {
        Ok(self.desktop.pixel_color(x, y)?)
    }

    fn move_cursor(&self, x: i32, y: i32) -> deskflow_core::Result<()> {
        Ok(self.input.move_cursor(x, y)?)
    }

    fn click(&self, x: i32, y: i32, button: MouseButton) -> deskflow_core::Result<()> {
        Ok(self.click_at(x, y, button)?)
    }

    fn double_click(&self, x: i32, y: i32) -> deskflow_core::Result<()> {
        self.click_at(x, y, MouseButton::Left)?;
        sleep(Duration::from_millis(EngineConstants::DOUBLE_CLICK_GAP_MS));
        Ok(self.click_at(x, y, MouseButton::Left)?)
    }

    fn scroll(&self, x: i32, y: i32, delta: i32) -> deskflow_core::Result<()> {
        self.input.move_cursor(x, y)?;
        Ok(self.input.scroll(delta)?)
    }
}

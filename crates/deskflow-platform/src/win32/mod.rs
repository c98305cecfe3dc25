mod desktop;
mod hooks;
mod input;

use deskflow_core::{MouseButton, Rgb};

use crate::backend::{
    DesktopBackend, HookSession, HookSet, HookSink, InputBackend, WindowCommand, WindowInfo,
};
use crate::clipboard;
use crate::error::Result;

pub struct Win32Input;

impl InputBackend for Win32Input {
    fn open_session(&self, hooks: HookSet, sink: HookSink) -> Result<Box<dyn HookSession>> {
        Ok(Box::new(hooks::Win32Session::open(hooks, sink)?))
    }

    fn send_keys(&self, vks: &[u32]) -> Result<()> {
        input::send_keys(vks)
    }

    fn type_text(&self, text: &str) -> Result<()> {
        input::type_text(text)
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<()> {
        input::move_cursor(x, y)
    }

    fn mouse_button(&self, button: MouseButton, down: bool) -> Result<()> {
        input::mouse_button(button, down)
    }

    fn scroll(&self, delta: i32) -> Result<()> {
        input::scroll(delta)
    }
}

pub struct Win32Desktop;

impl DesktopBackend for Win32Desktop {
    fn clipboard_text(&self) -> Result<String> {
        clipboard::get_text()
    }

    fn set_clipboard_text(&self, text: &str) -> Result<()> {
        clipboard::set_text(text)
    }

    fn clipboard_files(&self) -> Result<Vec<String>> {
        desktop::clipboard_files()
    }

    fn foreground_window(&self) -> Result<Option<WindowInfo>> {
        Ok(desktop::foreground_window())
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        desktop::list_windows()
    }

    fn window_command(&self, handle: isize, command: WindowCommand) -> Result<()> {
        desktop::window_command(handle, command)
    }

    fn process_name(&self, process_id: u32) -> Result<String> {
        desktop::process_name(process_id)
    }

    fn pixel_color(&self, x: i32, y: i32) -> Result<Rgb> {
        desktop::pixel_color(x, y)
    }
}

//! In-memory backend for tests: hooks are fed by `inject`, hotkeys fire via
//! `fire_hotkey`, and every simulated input is recorded.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender, unbounded};
use deskflow_core::{HotkeyCombo, MouseButton, RawEvent, Rgb};
use parking_lot::Mutex;

use crate::backend::{
    DesktopBackend, HookEvent, HookSession, HookSet, HookSink, InputBackend, LoopMessage,
    LoopSignal, WindowCommand, WindowInfo,
};
use crate::error::{PlatformError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCall {
    Keys(Vec<u32>),
    Text(String),
    Move(i32, i32),
    Button(MouseButton, bool),
    Scroll(i32),
}

#[derive(Default)]
struct HookState {
    sinks: Vec<(usize, HookSet, HookSink)>,
    loop_tx: Option<Sender<LoopMessage>>,
    hotkeys: HashMap<i32, HotkeyCombo>,
}

#[derive(Default)]
struct DesktopState {
    clipboard: String,
    files: Vec<String>,
    windows: Vec<WindowInfo>,
    foreground: Option<isize>,
    processes: HashMap<u32, String>,
    pixel: Rgb,
    commands: Vec<(isize, WindowCommand)>,
}

#[derive(Default)]
pub struct FakeBackend {
    hooks: Arc<Mutex<HookState>>,
    desktop: Mutex<DesktopState>,
    calls: Mutex<Vec<InputCall>>,
    sessions_opened: AtomicUsize,
    fail_hooks: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_hook_install(&self, fail: bool) {
        self.fail_hooks.store(fail, Ordering::SeqCst);
    }

    pub fn open_session_count(&self) -> usize {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    /// Delivers an event to every open session whose hooks cover it.
    pub fn inject(&self, event: RawEvent, injected: bool) {
        let sinks: Vec<HookSink> = {
            let state = self.hooks.lock();
            state
                .sinks
                .iter()
                .filter(|(_, hooks, _)| {
                    if is_keyboard(&event) {
                        hooks.keyboard
                    } else {
                        hooks.mouse
                    }
                })
                .map(|(_, _, sink)| Arc::clone(sink))
                .collect()
        };
        for sink in sinks {
            sink(HookEvent { event, injected });
        }
    }

    pub fn registered_hotkeys(&self) -> Vec<HotkeyCombo> {
        let mut combos: Vec<_> = self.hooks.lock().hotkeys.values().copied().collect();
        combos.sort_by_key(|c| (c.modifiers, c.vk));
        combos
    }

    /// Polls until `combo` is registered with the loop thread.
    pub fn wait_for_hotkey(&self, combo: &str, timeout: Duration) -> bool {
        let wanted = HotkeyCombo::parse(combo);
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.hooks.lock().hotkeys.values().any(|c| *c == wanted) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// Posts a hotkey message as the OS would. Returns false when the combo
    /// is not registered.
    pub fn fire_hotkey(&self, combo: &str) -> bool {
        let wanted = HotkeyCombo::parse(combo);
        let state = self.hooks.lock();
        let Some(id) = state
            .hotkeys
            .iter()
            .find_map(|(id, c)| (*c == wanted).then_some(*id))
        else {
            return false;
        };
        state
            .loop_tx
            .as_ref()
            .is_some_and(|tx| tx.send(LoopMessage::Hotkey(id)).is_ok())
    }

    pub fn input_calls(&self) -> Vec<InputCall> {
        self.calls.lock().clone()
    }

    pub fn set_clipboard_files(&self, files: Vec<String>) {
        self.desktop.lock().files = files;
    }

    /// Adds a window; the first one added becomes the foreground window.
    pub fn add_window(&self, info: WindowInfo, process_name: &str) {
        let mut state = self.desktop.lock();
        state.processes.insert(info.process_id, process_name.to_string());
        if state.foreground.is_none() {
            state.foreground = Some(info.handle);
        }
        state.windows.push(info);
    }

    pub fn set_pixel(&self, color: Rgb) {
        self.desktop.lock().pixel = color;
    }

    pub fn window_commands(&self) -> Vec<(isize, WindowCommand)> {
        self.desktop.lock().commands.clone()
    }

    fn record(&self, call: InputCall) -> Result<()> {
        self.calls.lock().push(call);
        Ok(())
    }
}

const fn is_keyboard(event: &RawEvent) -> bool {
    matches!(
        event.kind,
        deskflow_core::RawEventKind::KeyDown | deskflow_core::RawEventKind::KeyUp
    )
}

struct FakeSignal {
    tx: Sender<LoopMessage>,
}

impl LoopSignal for FakeSignal {
    fn wake(&self) {
        let _ = self.tx.send(LoopMessage::Wake);
    }

    fn quit(&self) {
        let _ = self.tx.send(LoopMessage::Quit);
    }
}

struct FakeSession {
    key: usize,
    hooks: Arc<Mutex<HookState>>,
    tx: Sender<LoopMessage>,
    rx: Receiver<LoopMessage>,
    owned: Vec<i32>,
}

impl HookSession for FakeSession {
    fn next_message(&mut self) -> LoopMessage {
        self.rx.recv().unwrap_or(LoopMessage::Quit)
    }

    fn register_hotkey(&mut self, id: i32, combo: HotkeyCombo) -> Result<()> {
        let mut state = self.hooks.lock();
        if state.hotkeys.values().any(|c| *c == combo) {
            return Err(PlatformError::HotkeyRegistration {
                combo: format!("{combo:?}"),
                reason: "already registered".to_string(),
            });
        }
        state.hotkeys.insert(id, combo);
        self.owned.push(id);
        Ok(())
    }

    fn unregister_hotkey(&mut self, id: i32) {
        self.hooks.lock().hotkeys.remove(&id);
        self.owned.retain(|owned| *owned != id);
    }

    fn signal(&self) -> Arc<dyn LoopSignal> {
        Arc::new(FakeSignal {
            tx: self.tx.clone(),
        })
    }
}

impl Drop for FakeSession {
    fn drop(&mut self) {
        let mut state = self.hooks.lock();
        state.sinks.retain(|(key, _, _)| *key != self.key);
        for id in &self.owned {
            state.hotkeys.remove(id);
        }
        if state
            .loop_tx
            .as_ref()
            .is_some_and(|tx| tx.same_channel(&self.tx))
        {
            state.loop_tx = None;
        }
    }
}

impl InputBackend for FakeBackend {
    fn open_session(&self, hooks: HookSet, sink: HookSink) -> Result<Box<dyn HookSession>> {
        if self.fail_hooks.load(Ordering::SeqCst) && (hooks.keyboard || hooks.mouse) {
            return Err(PlatformError::HookInstall("hook chain unavailable".to_string()));
        }
        let key = self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = unbounded();
        {
            let mut state = self.hooks.lock();
            state.sinks.push((key, hooks, sink));
            state.loop_tx = Some(tx.clone());
        }
        Ok(Box::new(FakeSession {
            key,
            hooks: Arc::clone(&self.hooks),
            tx,
            rx,
            owned: Vec::new(),
        }))
    }

    fn send_keys(&self, vks: &[u32]) -> Result<()> {
        self.record(InputCall::Keys(vks.to_vec()))
    }

    fn type_text(&self, text: &str) -> Result<()> {
        self.record(InputCall::Text(text.to_string()))
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<()> {
        self.record(InputCall::Move(x, y))
    }

    fn mouse_button(&self, button: MouseButton, down: bool) -> Result<()> {
        self.record(InputCall::Button(button, down))
    }

    fn scroll(&self, delta: i32) -> Result<()> {
        self.record(InputCall::Scroll(delta))
    }
}

impl DesktopBackend for FakeBackend {
    fn clipboard_text(&self) -> Result<String> {
        Ok(self.desktop.lock().clipboard.clone())
    }

    fn set_clipboard_text(&self, text: &str) -> Result<()> {
        self.desktop.lock().clipboard = text.to_string();
        Ok(())
    }

    fn clipboard_files(&self) -> Result<Vec<String>> {
        Ok(self.desktop.lock().files.clone())
    }

    fn foreground_window(&self) -> Result<Option<WindowInfo>> {
        let state = self.desktop.lock();
        Ok(state
            .foreground
            .and_then(|h| state.windows.iter().find(|w| w.handle == h).cloned()))
    }

    fn list_windows(&self) -> Result<Vec<WindowInfo>> {
        Ok(self.desktop.lock().windows.clone())
    }

    fn window_command(&self, handle: isize, command: WindowCommand) -> Result<()> {
        let mut state = self.desktop.lock();
        if !state.windows.iter().any(|w| w.handle == handle) {
            return Err(PlatformError::WindowNotFound(format!("#{handle}")));
        }
        match command {
            WindowCommand::Activate => state.foreground = Some(handle),
            WindowCommand::Close => {
                state.windows.retain(|w| w.handle != handle);
                if state.foreground == Some(handle) {
                    state.foreground = None;
                }
            }
            _ => {}
        }
        state.commands.push((handle, command));
        Ok(())
    }

    fn process_name(&self, process_id: u32) -> Result<String> {
        self.desktop
            .lock()
            .processes
            .get(&process_id)
            .cloned()
            .ok_or_else(|| PlatformError::Win32 {
                call: "OpenProcess",
                message: format!("no process {process_id}"),
            })
    }

    fn pixel_color(&self, _x: i32, _y: i32) -> Result<Rgb> {
        Ok(self.desktop.lock().pixel)
    }
}

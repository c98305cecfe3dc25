//! Low-level hooks and the thread message loop. Everything here runs on the
//! thread that called `open`.

use std::cell::RefCell;
use std::sync::Arc;

use deskflow_core::{HotkeyCombo, MouseButton, RawEvent};
use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    HOT_KEY_MODIFIERS, RegisterHotKey, UnregisterHotKey,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, HHOOK, HOOKPROC, KBDLLHOOKSTRUCT,
    MSG, MSLLHOOKSTRUCT, PM_NOREMOVE, PeekMessageW, PostThreadMessageW, SetWindowsHookExW,
    TranslateMessage, UnhookWindowsHookEx, WH_KEYBOARD_LL, WH_MOUSE_LL, WINDOWS_HOOK_ID, WM_APP,
    WM_HOTKEY, WM_KEYDOWN, WM_KEYUP, WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP,
    WM_MOUSEMOVE, WM_MOUSEWHEEL, WM_QUIT, WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN,
    WM_SYSKEYUP,
};

use crate::backend::{HookEvent, HookSession, HookSet, HookSink, LoopMessage, LoopSignal};
use crate::error::{PlatformError, Result};

const WM_WAKE: u32 = WM_APP + 1;
const LLKHF_INJECTED: u32 = 0x10;
const LLMHF_INJECTED: u32 = 0x01;

thread_local! {
    static SINK: RefCell<Option<HookSink>> = const { RefCell::new(None) };
}

fn deliver(event: RawEvent, injected: bool) {
    let sink = SINK.with(|slot| slot.borrow().clone());
    if let Some(sink) = sink {
        sink(HookEvent { event, injected });
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        // SAFETY: for WH_KEYBOARD_LL, lparam points to a KBDLLHOOKSTRUCT.
        let data = unsafe { *(lparam.0 as *const KBDLLHOOKSTRUCT) };
        #[allow(clippy::cast_possible_truncation)]
        let message = wparam.0 as u32;
        let event = match message {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(RawEvent::key_down(data.vkCode, data.time)),
            WM_KEYUP | WM_SYSKEYUP => Some(RawEvent::key_up(data.vkCode, data.time)),
            _ => None,
        };
        if let Some(event) = event {
            deliver(event, data.flags.0 & LLKHF_INJECTED != 0);
        }
    }
    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        // SAFETY: for WH_MOUSE_LL, lparam points to an MSLLHOOKSTRUCT.
        let data = unsafe { *(lparam.0 as *const MSLLHOOKSTRUCT) };
        let (x, y, time) = (data.pt.x, data.pt.y, data.time);
        #[allow(clippy::cast_possible_truncation)]
        let message = wparam.0 as u32;
        let event = match message {
            WM_MOUSEMOVE => Some(RawEvent::mouse_move(x, y, time)),
            WM_LBUTTONDOWN => Some(RawEvent::mouse_down(MouseButton::Left, x, y, time)),
            WM_LBUTTONUP => Some(RawEvent::mouse_up(MouseButton::Left, x, y, time)),
            WM_RBUTTONDOWN => Some(RawEvent::mouse_down(MouseButton::Right, x, y, time)),
            WM_RBUTTONUP => Some(RawEvent::mouse_up(MouseButton::Right, x, y, time)),
            WM_MBUTTONDOWN => Some(RawEvent::mouse_down(MouseButton::Middle, x, y, time)),
            WM_MBUTTONUP => Some(RawEvent::mouse_up(MouseButton::Middle, x, y, time)),
            WM_MOUSEWHEEL => {
                #[allow(clippy::cast_possible_truncation)]
                let delta = i32::from((data.mouseData >> 16) as u16 as i16);
                Some(RawEvent::wheel(x, y, delta, time))
            }
            _ => None,
        };
        if let Some(event) = event {
            deliver(event, data.flags & LLMHF_INJECTED != 0);
        }
    }
    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}

fn install(kind: WINDOWS_HOOK_ID, proc: HOOKPROC, name: &str) -> Result<HHOOK> {
    unsafe {
        let module = GetModuleHandleW(None).map_err(|e| PlatformError::HookInstall(e.to_string()))?;
        SetWindowsHookExW(kind, proc, Some(HINSTANCE(module.0)), 0)
            .map_err(|e| PlatformError::HookInstall(format!("{name}: {e}")))
    }
}

pub struct Win32Signal {
    thread_id: u32,
}

impl Win32Signal {
    fn post(&self, message: u32) {
        if let Err(e) = unsafe { PostThreadMessageW(self.thread_id, message, WPARAM(0), LPARAM(0)) } {
            log::debug!("PostThreadMessageW({message:#x}) failed: {e}");
        }
    }
}

impl LoopSignal for Win32Signal {
    fn wake(&self) {
        self.post(WM_WAKE);
    }

    fn quit(&self) {
        self.post(WM_QUIT);
    }
}

pub struct Win32Session {
    thread_id: u32,
    hooks: Vec<HHOOK>,
    hotkeys: Vec<i32>,
}

impl Win32Session {
    pub fn open(hooks: HookSet, sink: HookSink) -> Result<Self> {
        let thread_id = unsafe {
            // Forces creation of this thread's message queue so that posts
            // from other threads are not lost before the first GetMessage.
            let mut msg = MSG::default();
            let _ = PeekMessageW(&raw mut msg, None, 0, 0, PM_NOREMOVE);
            GetCurrentThreadId()
        };
        SINK.with(|slot| *slot.borrow_mut() = Some(sink));

        let mut session = Self {
            thread_id,
            hooks: Vec::new(),
            hotkeys: Vec::new(),
        };
        if hooks.keyboard {
            session
                .hooks
                .push(install(WH_KEYBOARD_LL, Some(keyboard_proc), "keyboard")?);
        }
        if hooks.mouse {
            session
                .hooks
                .push(install(WH_MOUSE_LL, Some(mouse_proc), "mouse")?);
        }
        Ok(session)
    }
}

impl HookSession for Win32Session {
    fn next_message(&mut self) -> LoopMessage {
        let mut msg = MSG::default();
        loop {
            let status = unsafe { GetMessageW(&raw mut msg, None, 0, 0) };
            if status.0 <= 0 {
                return LoopMessage::Quit;
            }
            match msg.message {
                #[allow(clippy::cast_possible_truncation)]
                WM_HOTKEY => return LoopMessage::Hotkey(msg.wParam.0 as i32),
                WM_WAKE => return LoopMessage::Wake,
                _ => unsafe {
                    let _ = TranslateMessage(&raw const msg);
                    DispatchMessageW(&raw const msg);
                },
            }
        }
    }

    fn register_hotkey(&mut self, id: i32, combo: HotkeyCombo) -> Result<()> {
        unsafe { RegisterHotKey(None, id, HOT_KEY_MODIFIERS(combo.modifiers), combo.vk) }.map_err(
            |e| PlatformError::HotkeyRegistration {
                combo: format!("{:#x}+{:#x}", combo.modifiers, combo.vk),
                reason: e.to_string(),
            },
        )?;
        self.hotkeys.push(id);
        Ok(())
    }

    fn unregister_hotkey(&mut self, id: i32) {
        if self.hotkeys.contains(&id) {
            let _ = unsafe { UnregisterHotKey(None, id) };
            self.hotkeys.retain(|h| *h != id);
        }
    }

    fn signal(&self) -> Arc<dyn LoopSignal> {
        Arc::new(Win32Signal {
            thread_id: self.thread_id,
        })
    }
}

impl Drop for Win32Session {
    fn drop(&mut self) {
        for id in self.hotkeys.drain(..) {
            let _ = unsafe { UnregisterHotKey(None, id) };
        }
        for hook in self.hooks.drain(..) {
            let _ = unsafe { UnhookWindowsHookEx(hook) };
        }
        SINK.with(|slot| slot.borrow_mut().take());
    }
}

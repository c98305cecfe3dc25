use std::thread::sleep;
use std::time::Duration;

use deskflow_core::MouseButton;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBD_EVENT_FLAGS, KEYBDINPUT, KEYEVENTF_KEYUP,
    KEYEVENTF_UNICODE, MOUSE_EVENT_FLAGS, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP,
    MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP,
    MOUSEEVENTF_WHEEL, MOUSEINPUT, SendInput, VIRTUAL_KEY,
};
use windows::Win32::UI::WindowsAndMessaging::SetCursorPos;

use crate::error::{PlatformError, Result};

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const INPUT_SIZE: i32 = size_of::<INPUT>() as i32;
const KEY_GAP_MS: u64 = 10;

fn send(inputs: &[INPUT]) -> Result<()> {
    let sent = unsafe { SendInput(inputs, INPUT_SIZE) };
    if sent as usize == inputs.len() {
        Ok(())
    } else {
        Err(PlatformError::Win32 {
            call: "SendInput",
            message: format!("{sent} of {} inputs sent", inputs.len()),
        })
    }
}

fn key_input(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn mouse_input(flags: MOUSE_EVENT_FLAGS, data: u32) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

pub fn send_keys(vks: &[u32]) -> Result<()> {
    let codes: Vec<u16> = vks
        .iter()
        .filter_map(|vk| u16::try_from(*vk).ok())
        .collect();
    for vk in &codes {
        send(&[key_input(*vk, 0, KEYBD_EVENT_FLAGS(0))])?;
        sleep(Duration::from_millis(KEY_GAP_MS));
    }
    for vk in codes.iter().rev() {
        send(&[key_input(*vk, 0, KEYEVENTF_KEYUP)])?;
        sleep(Duration::from_millis(KEY_GAP_MS));
    }
    Ok(())
}

/// Types `text` as unicode key events, so the keyboard layout is irrelevant.
pub fn type_text(text: &str) -> Result<()> {
    let mut units = [0u16; 2];
    for ch in text.chars() {
        for unit in ch.encode_utf16(&mut units).iter() {
            send(&[
                key_input(0, *unit, KEYEVENTF_UNICODE),
                key_input(0, *unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP),
            ])?;
        }
        sleep(Duration::from_millis(KEY_GAP_MS));
    }
    Ok(())
}

pub fn move_cursor(x: i32, y: i32) -> Result<()> {
    unsafe { SetCursorPos(x, y) }.map_err(|e| PlatformError::Win32 {
        call: "SetCursorPos",
        message: e.to_string(),
    })
}

pub fn mouse_button(button: MouseButton, down: bool) -> Result<()> {
    let flags = match (button, down) {
        (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
        (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
        (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
        (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
        (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
        (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
    };
    send(&[mouse_input(flags, 0)])
}

pub fn scroll(delta: i32) -> Result<()> {
    send(&[mouse_input(MOUSEEVENTF_WHEEL, delta.cast_unsigned())])
}

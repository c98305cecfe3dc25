use deskflow_core::Rgb;
use windows::Win32::Foundation::{CloseHandle, HANDLE, HWND, LPARAM, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{CLR_INVALID, GetDC, GetPixel, ReleaseDC};
use windows::Win32::System::DataExchange::{CloseClipboard, GetClipboardData, OpenClipboard};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_NAME_FORMAT, PROCESS_QUERY_LIMITED_INFORMATION,
    QueryFullProcessImageNameW,
};
use windows::Win32::UI::Shell::{DragQueryFileW, HDROP};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetWindowRect, GetWindowTextW, GetWindowThreadProcessId,
    HWND_NOTOPMOST, HWND_TOPMOST, IsIconic, IsWindowVisible, PostMessageW, SW_MAXIMIZE,
    SW_MINIMIZE, SW_RESTORE, SWP_NOMOVE, SWP_NOSIZE, SWP_NOZORDER, SetForegroundWindow,
    SetWindowPos, ShowWindow, WM_CLOSE,
};
use windows::core::{BOOL, PWSTR};

use crate::backend::{WindowCommand, WindowInfo, WindowRect};
use crate::error::{PlatformError, Result};

const CF_HDROP: u32 = 15;

fn win32_error(call: &'static str, error: &windows::core::Error) -> PlatformError {
    PlatformError::Win32 {
        call,
        message: error.to_string(),
    }
}

fn window_title(hwnd: HWND) -> String {
    let mut buffer = [0u16; 512];
    let len = unsafe { GetWindowTextW(hwnd, &mut buffer) };
    usize::try_from(len).map_or_else(
        |_| String::new(),
        |len| String::from_utf16_lossy(&buffer[..len]),
    )
}

fn window_info(hwnd: HWND) -> WindowInfo {
    let mut process_id = 0u32;
    let mut rect = RECT::default();
    unsafe {
        GetWindowThreadProcessId(hwnd, Some(&raw mut process_id));
        let _ = GetWindowRect(hwnd, &raw mut rect);
    }
    WindowInfo {
        handle: hwnd.0 as isize,
        title: window_title(hwnd),
        process_id,
        rect: WindowRect {
            left: rect.left,
            top: rect.top,
            width: rect.right - rect.left,
            height: rect.bottom - rect.top,
        },
    }
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is the Vec passed by `list_windows` for this call.
    let windows = unsafe { &mut *(lparam.0 as *mut Vec<WindowInfo>) };
    if unsafe { IsWindowVisible(hwnd) }.as_bool() {
        let info = window_info(hwnd);
        if !info.title.is_empty() {
            windows.push(info);
        }
    }
    BOOL(1)
}

pub fn list_windows() -> Result<Vec<WindowInfo>> {
    let mut windows: Vec<WindowInfo> = Vec::new();
    unsafe { EnumWindows(Some(collect_window), LPARAM(&raw mut windows as isize)) }
        .map_err(|e| win32_error("EnumWindows", &e))?;
    Ok(windows)
}

pub fn foreground_window() -> Option<WindowInfo> {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.0.is_null() {
        None
    } else {
        Some(window_info(hwnd))
    }
}

pub fn window_command(handle: isize, command: WindowCommand) -> Result<()> {
    let hwnd = HWND(handle as *mut _);
    unsafe {
        match command {
            WindowCommand::Activate => {
                if IsIconic(hwnd).as_bool() {
                    let _ = ShowWindow(hwnd, SW_RESTORE);
                }
                if !SetForegroundWindow(hwnd).as_bool() {
                    return Err(PlatformError::Win32 {
                        call: "SetForegroundWindow",
                        message: "foreground change refused".to_string(),
                    });
                }
            }
            WindowCommand::Minimize => {
                let _ = ShowWindow(hwnd, SW_MINIMIZE);
            }
            WindowCommand::Maximize => {
                let _ = ShowWindow(hwnd, SW_MAXIMIZE);
            }
            WindowCommand::Close => PostMessageW(Some(hwnd), WM_CLOSE, WPARAM(0), LPARAM(0))
                .map_err(|e| win32_error("PostMessageW", &e))?,
            WindowCommand::Move {
                x,
                y,
                width,
                height,
            } => SetWindowPos(hwnd, None, x, y, width, height, SWP_NOZORDER)
                .map_err(|e| win32_error("SetWindowPos", &e))?,
            WindowCommand::Topmost(on_top) => {
                let after = if on_top { HWND_TOPMOST } else { HWND_NOTOPMOST };
                SetWindowPos(hwnd, Some(after), 0, 0, 0, 0, SWP_NOMOVE | SWP_NOSIZE)
                    .map_err(|e| win32_error("SetWindowPos", &e))?;
            }
        }
    }
    Ok(())
}

fn close_handle(handle: HANDLE) {
    let _ = unsafe { CloseHandle(handle) };
}

pub fn process_name(process_id: u32) -> Result<String> {
    let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id) }
        .map_err(|e| win32_error("OpenProcess", &e))?;

    let mut buffer = [0u16; 1024];
    #[allow(clippy::cast_possible_truncation)]
    let mut size = buffer.len() as u32;
    let queried = unsafe {
        QueryFullProcessImageNameW(
            handle,
            PROCESS_NAME_FORMAT(0),
            PWSTR(buffer.as_mut_ptr()),
            &raw mut size,
        )
    };
    close_handle(handle);
    queried.map_err(|e| win32_error("QueryFullProcessImageNameW", &e))?;

    let path = String::from_utf16_lossy(&buffer[..size as usize]);
    Ok(path
        .rsplit(['\\', '/'])
        .next()
        .unwrap_or_default()
        .to_string())
}

pub fn pixel_color(x: i32, y: i32) -> Result<Rgb> {
    let color = unsafe {
        let hdc = GetDC(None);
        let color = GetPixel(hdc, x, y);
        ReleaseDC(None, hdc);
        color
    };
    if color.0 == CLR_INVALID {
        return Err(PlatformError::Win32 {
            call: "GetPixel",
            message: format!("({x}, {y}) is off screen"),
        });
    }
    let [r, g, b, _] = color.0.to_le_bytes();
    Ok(Rgb::new(r, g, b))
}

pub fn clipboard_files() -> Result<Vec<String>> {
    unsafe { OpenClipboard(None) }.map_err(|e| win32_error("OpenClipboard", &e))?;

    let files = match unsafe { GetClipboardData(CF_HDROP) } {
        Ok(handle) => {
            let drop = HDROP(handle.0);
            let count = unsafe { DragQueryFileW(drop, u32::MAX, None) };
            (0..count)
                .map(|idx| {
                    let mut buffer = [0u16; 1024];
                    let len = unsafe { DragQueryFileW(drop, idx, Some(&mut buffer)) } as usize;
                    String::from_utf16_lossy(&buffer[..len.min(buffer.len())])
                })
                .collect()
        }
        Err(_) => Vec::new(),
    };

    let _ = unsafe { CloseClipboard() };
    Ok(files)
}

//! Host side of the engine: global hooks, hotkeys, the input recorder and
//! the `Desktop` implementation the interpreter drives.

pub mod backend;
mod clipboard;
pub mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod hook_thread;
pub mod hotkey;
pub mod platform;
pub mod recorder;
pub mod unsupported;
#[cfg(windows)]
pub mod win32;

pub use backend::{
    DesktopBackend, HookEvent, HookSession, HookSet, HookSink, InputBackend, LoopMessage,
    LoopSignal, WindowCommand, WindowInfo, WindowRect,
};
pub use error::{PlatformError, Result};
pub use hook_thread::HookThread;
pub use hotkey::{HotkeyCallback, HotkeyDispatcher};
pub use platform::Platform;
pub use recorder::{InputRecorder, RecorderState};

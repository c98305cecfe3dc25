use deskflow_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{0} is not supported on this platform")]
    NotSupported(&'static str),

    #[error("Failed to install input hook: {0}")]
    HookInstall(String),

    #[error("Failed to register hotkey {combo}: {reason}")]
    HotkeyRegistration { combo: String, reason: String },

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Window {0} not found")]
    WindowNotFound(String),

    #[error("Win32 call {call} failed: {message}")]
    Win32 { call: &'static str, message: String },

    #[error("Hook thread error: {0}")]
    Thread(String),
}

pub type Result<T> = std::result::Result<T, PlatformError>;

impl From<PlatformError> for CoreError {
    fn from(error: PlatformError) -> Self {
        Self::Host(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_supported_display() {
        assert_eq!(
            PlatformError::NotSupported("pixel_color").to_string(),
            "pixel_color is not supported on this platform"
        );
    }

    #[test]
    fn test_converts_into_host_error() {
        let core: CoreError = PlatformError::WindowNotFound("'Notepad'".to_string()).into();
        assert_eq!(
            core,
            CoreError::Host("Window 'Notepad' not found".to_string())
        );
    }
}

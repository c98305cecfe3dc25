use arboard::Clipboard;

use crate::error::{PlatformError, Result};

fn open() -> Result<Clipboard> {
    Clipboard::new().map_err(|e| PlatformError::Clipboard(e.to_string()))
}

/// Current clipboard text; empty when the clipboard holds no text.
pub fn get_text() -> Result<String> {
    match open()?.get_text() {
        Ok(text) => Ok(text),
        Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
        Err(e) => Err(PlatformError::Clipboard(e.to_string())),
    }
}

pub fn set_text(text: &str) -> Result<()> {
    open()?
        .set_text(text)
        .map_err(|e| PlatformError::Clipboard(e.to_string()))
}

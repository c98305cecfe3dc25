use std::fmt;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::step::{MouseButton, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
        Some(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Every channel within `tolerance` of the other color.
    pub fn matches(self, other: Self, tolerance: u32) -> bool {
        let close = |a: u8, b: u8| u32::from(a.abs_diff(b)) <= tolerance;
        close(self.r, other.r) && close(self.g, other.g) && close(self.b, other.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Live host state and pointer control used by the interpreter.
pub trait Desktop: Send + Sync {
    fn clipboard_text(&self) -> Result<String>;

    fn set_clipboard_text(&self, text: &str) -> Result<()>;

    fn foreground_title(&self) -> Result<String>;

    fn foreground_process(&self) -> Result<String>;

    fn pixel_color(&self, x: i32, y: i32) -> Result<Rgb>;

    fn move_cursor(&self, x: i32, y: i32) -> Result<()>;

    /// Moves to `(x, y)`, lets the cursor settle, then presses and releases.
    fn click(&self, x: i32, y: i32, button: MouseButton) -> Result<()>;

    fn double_click(&self, x: i32, y: i32) -> Result<()>;

    fn scroll(&self, x: i32, y: i32, delta: i32) -> Result<()>;
}

/// Executes the steps the interpreter does not handle itself (launching
/// apps, sending keys, running scripts). Receives already interpolated steps.
pub trait ActionDispatcher: Send + Sync {
    fn dispatch(&self, step: &Step, cancel: &CancelToken) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(Rgb::parse_hex("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::parse_hex("00FF00"), Some(Rgb::new(0, 255, 0)));
        assert_eq!(Rgb::parse_hex("#fff"), None);
        assert_eq!(Rgb::parse_hex("#gg0000"), None);
    }

    #[test]
    fn test_matches_per_channel() {
        let target = Rgb::new(100, 100, 100);
        assert!(Rgb::new(110, 90, 100).matches(target, 10));
        assert!(!Rgb::new(111, 100, 100).matches(target, 10));
        assert!(Rgb::new(100, 100, 100).matches(target, 0));
    }

    #[test]
    fn test_display_round_trips() {
        let color = Rgb::new(1, 171, 255);
        assert_eq!(color.to_string(), "#01abff");
        assert_eq!(Rgb::parse_hex(&color.to_string()), Some(color));
    }
}

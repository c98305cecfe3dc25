//! Key names, virtual-key codes and combo strings such as `"ctrl+shift+a"`.

pub const VK_SHIFT: u32 = 0x10;
pub const VK_CONTROL: u32 = 0x11;
pub const VK_MENU: u32 = 0x12;
pub const VK_LWIN: u32 = 0x5B;
pub const VK_RWIN: u32 = 0x5C;
pub const VK_LSHIFT: u32 = 0xA0;
pub const VK_RSHIFT: u32 = 0xA1;
pub const VK_LCONTROL: u32 = 0xA2;
pub const VK_RCONTROL: u32 = 0xA3;
pub const VK_LMENU: u32 = 0xA4;
pub const VK_RMENU: u32 = 0xA5;

pub const MOD_ALT: u32 = 0x0001;
pub const MOD_CONTROL: u32 = 0x0002;
pub const MOD_SHIFT: u32 = 0x0004;
pub const MOD_WIN: u32 = 0x0008;

const NAMED_KEYS: &[(&str, u32)] = &[
    ("ctrl", VK_CONTROL),
    ("control", VK_CONTROL),
    ("alt", VK_MENU),
    ("menu", VK_MENU),
    ("shift", VK_SHIFT),
    ("win", VK_LWIN),
    ("lwin", VK_LWIN),
    ("tab", 0x09),
    ("enter", 0x0D),
    ("return", 0x0D),
    ("esc", 0x1B),
    ("escape", 0x1B),
    ("space", 0x20),
    ("backspace", 0x08),
    ("delete", 0x2E),
    ("up", 0x26),
    ("down", 0x28),
    ("left", 0x25),
    ("right", 0x27),
    ("home", 0x24),
    ("end", 0x23),
    ("pageup", 0x21),
    ("pagedown", 0x22),
    ("insert", 0x2D),
    ("printscreen", 0x2C),
    ("f1", 0x70),
    ("f2", 0x71),
    ("f3", 0x72),
    ("f4", 0x73),
    ("f5", 0x74),
    ("f6", 0x75),
    ("f7", 0x76),
    ("f8", 0x77),
    ("f9", 0x78),
    ("f10", 0x79),
    ("f11", 0x7A),
    ("f12", 0x7B),
];

/// Keys a global hotkey may use besides single alphanumerics.
const HOTKEY_KEYS: &[&str] = &[
    "space", "tab", "enter", "return", "esc", "escape", "f1", "f2", "f3", "f4", "f5", "f6", "f7",
    "f8", "f9", "f10", "f11", "f12",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Win,
}

impl Modifier {
    const fn from_vk(vk: u32) -> Option<Self> {
        match vk {
            VK_CONTROL | VK_LCONTROL | VK_RCONTROL => Some(Self::Ctrl),
            VK_MENU | VK_LMENU | VK_RMENU => Some(Self::Alt),
            VK_SHIFT | VK_LSHIFT | VK_RSHIFT => Some(Self::Shift),
            VK_LWIN | VK_RWIN => Some(Self::Win),
            _ => None,
        }
    }

    const fn name(self) -> &'static str {
        match self {
            Self::Ctrl => "ctrl",
            Self::Alt => "alt",
            Self::Shift => "shift",
            Self::Win => "win",
        }
    }
}

fn named_vk(name: &str) -> Option<u32> {
    NAMED_KEYS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, vk)| *vk)
}

fn single_alnum_vk(part: &str) -> Option<u32> {
    let mut chars = part.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(u32::from(c.to_ascii_uppercase())),
        _ => None,
    }
}

/// Parses a combo string into virtual-key codes in the order written.
/// Unknown parts are skipped.
pub fn parse_keys(combo: &str) -> Vec<u32> {
    let mut keys = Vec::new();
    for part in combo.to_lowercase().split('+') {
        let part = part.trim();
        if let Some(vk) = named_vk(part).or_else(|| single_alnum_vk(part)) {
            keys.push(vk);
        } else if let Some(hex) = part.strip_prefix("0x") {
            match u32::from_str_radix(hex, 16) {
                Ok(vk) => keys.push(vk),
                Err(_) => log::warn!("invalid hex key code: {part}"),
            }
        }
    }
    keys
}

/// Display name of a non-modifier key, if it has one.
fn key_name(vk: u32) -> Option<String> {
    match vk {
        0x30..=0x39 | 0x41..=0x5A => char::from_u32(vk).map(|c| c.to_ascii_lowercase().to_string()),
        _ => NAMED_KEYS
            .iter()
            .find(|(_, code)| *code == vk)
            .map(|(name, _)| (*name).to_owned()),
    }
}

/// Builds a combo string from pressed keys: modifiers first in the order
/// ctrl, alt, shift, win (each once), then other keys in press order.
/// Keys without a name are dropped.
pub fn vk_list_to_combo(vks: &[u32]) -> String {
    let mut modifiers: Vec<Modifier> = vks.iter().filter_map(|vk| Modifier::from_vk(*vk)).collect();
    modifiers.sort_unstable();
    modifiers.dedup();

    let keys = vks
        .iter()
        .filter(|vk| Modifier::from_vk(**vk).is_none())
        .filter_map(|vk| key_name(*vk));

    modifiers
        .into_iter()
        .map(|m| m.name().to_owned())
        .chain(keys)
        .collect::<Vec<_>>()
        .join("+")
}

/// Modifier mask plus key code for global hotkey registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HotkeyCombo {
    pub modifiers: u32,
    pub vk: u32,
}

impl HotkeyCombo {
    /// Parses `"ctrl+shift+a"`. When no key part is recognised `vk` is 0;
    /// the last key part wins when several are given.
    pub fn parse(combo: &str) -> Self {
        let mut parsed = Self::default();
        for part in combo.split('+') {
            let part = part.trim().to_lowercase();
            match part.as_str() {
                "alt" => parsed.modifiers |= MOD_ALT,
                "ctrl" | "control" => parsed.modifiers |= MOD_CONTROL,
                "shift" => parsed.modifiers |= MOD_SHIFT,
                "win" => parsed.modifiers |= MOD_WIN,
                key if HOTKEY_KEYS.contains(&key) => {
                    parsed.vk = named_vk(key).unwrap_or_default();
                }
                key => {
                    if let Some(vk) = single_alnum_vk(key) {
                        parsed.vk = vk;
                    }
                }
            }
        }
        parsed
    }

    pub const fn is_valid(&self) -> bool {
        self.vk != 0
    }
}

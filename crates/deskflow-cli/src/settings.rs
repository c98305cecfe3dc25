use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deskflow_bridge::Interpreter;
use deskflow_core::StepDefaults;
use serde::{Deserialize, Serialize};

const APP_DIR: &str = "deskflow";

/// A global hotkey that runs a flow file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyBinding {
    pub combo: String,
    pub flow: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    pub default_delay_ms: u64,
    pub script_timeout_secs: u64,
    pub script_interpreter: Interpreter,
    pub store_path: Option<PathBuf>,
    pub hotkeys: Vec<HotkeyBinding>,
    pub middle_click_flow: Option<PathBuf>,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            default_delay_ms: StepDefaults::RUN_DELAY_MS,
            script_timeout_secs: StepDefaults::SCRIPT_TIMEOUT_SECS,
            script_interpreter: default_interpreter(),
            store_path: None,
            hotkeys: Vec::new(),
            middle_click_flow: None,
        }
    }
}

/// This binary's own `script-host` subcommand.
fn default_interpreter() -> Interpreter {
    let mut interpreter = Interpreter::default();
    if let Ok(exe) = std::env::current_exe() {
        interpreter.program = exe;
    }
    interpreter
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("settings.json"))
}

impl HostSettings {
    /// Reads `path`, or the default location when `None`. A missing file
    /// yields defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(),
        };

        let mut settings = match path {
            Some(path) if path.exists() => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing {}", path.display()))?
            }
            _ => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Overrides from `DESKFLOW_DEFAULT_DELAY_MS`, `DESKFLOW_SCRIPT_TIMEOUT`
    /// and `DESKFLOW_STORE_PATH`. Unparsable numbers are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(ms) = var("DESKFLOW_DEFAULT_DELAY_MS").and_then(|v| v.parse().ok()) {
            self.default_delay_ms = ms;
        }
        if let Some(secs) = var("DESKFLOW_SCRIPT_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.script_timeout_secs = secs;
        }
        if let Some(path) = var("DESKFLOW_STORE_PATH").filter(|v| !v.is_empty()) {
            self.store_path = Some(PathBuf::from(path));
        }
    }

    /// Configured store file, else `<data_dir>/deskflow/script_store.json`.
    pub fn resolved_store_path(&self) -> Option<PathBuf> {
        self.store_path.clone().or_else(|| {
            dirs::data_dir().map(|dir| dir.join(APP_DIR).join("script_store.json"))
        })
    }
}

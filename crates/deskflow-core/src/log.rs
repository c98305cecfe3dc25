use std::collections::VecDeque;
use std::time::SystemTime;

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

use crate::constants::EngineConstants;
use shared::RunId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogActivity {
    Start,
    End,
    Delay,
    SetVar,
    Clipboard,
    Mouse,
    WaitWindow,
    WaitPixel,
    IfCondition,
    Loop,
    Action,
    System,
}

impl LogActivity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::End => "END",
            Self::Delay => "DELAY",
            Self::SetVar => "SET VAR",
            Self::Clipboard => "CLIPBOARD",
            Self::Mouse => "MOUSE",
            Self::WaitWindow => "WAIT WINDOW",
            Self::WaitPixel => "WAIT PIXEL",
            Self::IfCondition => "IF CONDITION",
            Self::Loop => "LOOP",
            Self::Action => "ACTION",
            Self::System => "SYSTEM",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub run_id: Option<RunId>,
    pub level: LogLevel,
    pub activity: LogActivity,
    pub message: String,
}

/// Destination for the entries a flow run produces.
pub trait LogOutput {
    fn log(&mut self, entry: LogEntry);
}

impl LogOutput for Vec<LogEntry> {
    fn log(&mut self, entry: LogEntry) {
        self.push(entry);
    }
}

impl LogOutput for Sender<LogEntry> {
    fn log(&mut self, entry: LogEntry) {
        let _ = self.send(entry);
    }
}

impl LogOutput for LogStorage {
    fn log(&mut self, entry: LogEntry) {
        self.push(entry);
    }
}

/// Formats the time since `start_time` as `[mm:ss.mmm]`.
pub fn get_timestamp(start_time: SystemTime) -> String {
    let elapsed = start_time.elapsed().unwrap_or_default();
    format!(
        "[{:02}:{:02}.{:03}]",
        elapsed.as_secs() / 60,
        elapsed.as_secs() % 60,
        elapsed.subsec_millis()
    )
}

/// Bounded ring of the most recent entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStorage {
    values: VecDeque<LogEntry>,
    max_entry_count: usize,
}

impl Default for LogStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl LogStorage {
    pub fn new() -> Self {
        Self::with_capacity(EngineConstants::DEFAULT_LOG_ENTRIES)
    }

    pub fn with_capacity(max_entry_count: usize) -> Self {
        let max_entry_count = max_entry_count.clamp(1, EngineConstants::MAX_LOG_ENTRIES);
        Self {
            values: VecDeque::with_capacity(max_entry_count),
            max_entry_count,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.values.len() == self.max_entry_count {
            self.values.pop_front();
        }
        self.values.push_back(entry);
    }

    pub fn get(&self, idx: usize) -> Option<&LogEntry> {
        self.values.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.values.iter()
    }

    pub fn count_level(&self, level: LogLevel) -> usize {
        self.values.iter().filter(|e| e.level == level).count()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

pub struct EngineConstants;

impl EngineConstants {
    /// Mouse moves closer than this to the last kept point are folded away.
    pub const MOVE_THRESHOLD_PX: f64 = 10.0;
    /// Key downs within this many device ticks of the first one form a chord.
    pub const CHORD_WINDOW_TICKS: u32 = 50;
    /// Gaps above this become explicit delay steps in a recording.
    pub const DELAY_THRESHOLD_MS: u32 = 100;

    pub const WAIT_POLL_INTERVAL_MS: u64 = 100;
    pub const CLICK_SETTLE_MS: u64 = 50;
    pub const DOUBLE_CLICK_GAP_MS: u64 = 50;

    pub const DEFAULT_LOG_ENTRIES: usize = 100;
    pub const MAX_LOG_ENTRIES: usize = 10_000;

    pub const EXECUTION_COMPLETE_MARKER: &'static str = "__EXECUTION_COMPLETE__";
}

pub struct StepDefaults;

impl StepDefaults {
    pub const RUN_DELAY_MS: u64 = 500;
    pub const DELAY_MS: u64 = 1000;
    pub const WAIT_TIMEOUT_MS: u64 = 5000;
    pub const PIXEL_COLOR: &'static str = "#000000";
    pub const PIXEL_TOLERANCE: u8 = 10;
    pub const LOOP_COUNT: u32 = 1;
    pub const LOOP_MAX_ITERATIONS: u32 = 100;
    pub const SCROLL_DELTA: i32 = 120;
    pub const SHELL_TYPE: &'static str = "cmd";
    pub const SCRIPT_TIMEOUT_SECS: u64 = 30;
}

pub struct VariableNames;

impl VariableNames {
    pub const LOOP_INDEX: &'static str = "_loop_index";
    pub const LAST_WAIT_RESULT: &'static str = "_last_wait_result";
}

pub mod cancel;
pub mod condition;
pub mod constants;
pub mod desktop;
pub mod error;
pub mod execution;
pub mod keys;
pub mod log;
pub mod recording;
pub mod step;
pub mod variables;

#[cfg(test)]
mod testing;

pub use cancel::CancelToken;
pub use condition::evaluate_condition;
pub use constants::{EngineConstants, StepDefaults, VariableNames};
pub use desktop::{ActionDispatcher, Desktop, Rgb};
pub use error::{CoreError, Result};
pub use execution::{ExecutionContext, ExecutionSummary, FlowExecutor, execute_flow};
pub use keys::{HotkeyCombo, parse_keys, vk_list_to_combo};
pub use log::{LogActivity, LogEntry, LogLevel, LogOutput, LogStorage, get_timestamp};
pub use recording::{RawEvent, RawEventKind, to_steps};
pub use step::{
    Condition, ConditionOp, ConditionSource, Coord, Flow, LoopMode, MouseButton, Step, StepDoc,
    StepId,
};
pub use shared::RunId;
pub use variables::VariableStore;

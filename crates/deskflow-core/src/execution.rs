use std::time::{Instant, SystemTime};

use shared::RunId;

use crate::cancel::CancelToken;
use crate::condition::{describe, evaluate_condition};
use crate::constants::{EngineConstants, StepDefaults, VariableNames};
use crate::desktop::{ActionDispatcher, Desktop, Rgb};
use crate::error::{CoreError, Result};
use crate::log::{LogActivity, LogEntry, LogLevel, LogOutput, get_timestamp};
use crate::step::{Condition, Coord, Flow, LoopMode, Step, StepId};
use crate::variables::VariableStore;

/// State owned by a single flow run.
pub struct ExecutionContext {
    start_time: SystemTime,
    run_id: RunId,
    variables: VariableStore,
    cancel: CancelToken,
}

impl ExecutionContext {
    pub fn new(cancel: CancelToken) -> Self {
        Self::with_variables(VariableStore::new(), cancel)
    }

    /// Starts a run with pre-seeded variables (e.g. from the command line).
    pub fn with_variables(variables: VariableStore, cancel: CancelToken) -> Self {
        Self {
            start_time: SystemTime::now(),
            run_id: RunId::generate(),
            variables,
            cancel,
        }
    }

    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub const fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub const fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn into_variables(self) -> VariableStore {
        self.variables
    }
}

/// Walks a [`Flow`] depth-first, handling control flow itself and handing
/// primitive actions to the [`ActionDispatcher`].
pub struct FlowExecutor<'a, L: LogOutput> {
    flow: &'a Flow,
    desktop: &'a dyn Desktop,
    actions: &'a dyn ActionDispatcher,
    context: &'a mut ExecutionContext,
    log: &'a mut L,
    steps_executed: usize,
}

impl<'a, L: LogOutput> FlowExecutor<'a, L> {
    pub fn new(
        flow: &'a Flow,
        desktop: &'a dyn Desktop,
        actions: &'a dyn ActionDispatcher,
        context: &'a mut ExecutionContext,
        log: &'a mut L,
    ) -> Self {
        Self {
            flow,
            desktop,
            actions,
            context,
            log,
            steps_executed: 0,
        }
    }

    pub const fn steps_executed(&self) -> usize {
        self.steps_executed
    }

    /// Runs the root list. `default_delay_ms` is slept between siblings of
    /// every list, never before the first one.
    pub fn execute(&mut self, default_delay_ms: u64) -> Result<()> {
        let flow = self.flow;
        self.execute_list(flow.root(), default_delay_ms)
    }

    fn execute_list(&mut self, ids: &[StepId], delay_ms: u64) -> Result<()> {
        for (idx, id) in ids.iter().enumerate() {
            self.context.cancel.check()?;
            if idx > 0 && delay_ms > 0 && !self.context.cancel.sleep(delay_ms) {
                return Err(CoreError::Stopped);
            }
            self.execute_step(*id, delay_ms)?;
        }
        Ok(())
    }

    fn execute_step(&mut self, id: StepId, delay_ms: u64) -> Result<()> {
        let flow = self.flow;
        let step = flow.get(id).ok_or(CoreError::MissingStep(id.index()))?;
        self.steps_executed += 1;

        match step {
            Step::Delay { ms } => {
                self.info(LogActivity::Delay, format!("Waiting {ms}ms"));
                if !self.context.cancel.sleep(*ms) {
                    return Err(CoreError::Stopped);
                }
            }
            Step::SetVar { name, value } => {
                if name.is_empty() {
                    return Ok(());
                }
                let value = self.context.variables.interpolate(value);
                self.info(LogActivity::SetVar, format!("{name} = {value}"));
                self.context.variables.set(name, value);
            }
            Step::GetClipboard { var } => {
                if var.is_empty() {
                    return Ok(());
                }
                let text = self.desktop.clipboard_text().unwrap_or_else(|e| {
                    log::warn!("clipboard read failed: {e}");
                    String::new()
                });
                self.info(
                    LogActivity::Clipboard,
                    format!("Read {} chars into {var}", text.chars().count()),
                );
                self.context.variables.set(var, text);
            }
            Step::SetClipboard { value } => {
                let text = self.context.variables.interpolate(value);
                self.info(LogActivity::Clipboard, format!("Set clipboard: {text}"));
                self.desktop.set_clipboard_text(&text)?;
            }
            Step::MouseClick { x, y, button } => {
                let (x, y) = self.resolve_point(x, y);
                self.info(
                    LogActivity::Mouse,
                    format!("Click {} at ({x}, {y})", button.as_str()),
                );
                self.desktop.click(x, y, *button)?;
            }
            Step::MouseDoubleClick { x, y } => {
                let (x, y) = self.resolve_point(x, y);
                self.info(LogActivity::Mouse, format!("Double click at ({x}, {y})"));
                self.desktop.double_click(x, y)?;
            }
            Step::MouseMove { x, y } => {
                let (x, y) = self.resolve_point(x, y);
                self.info(LogActivity::Mouse, format!("Move to ({x}, {y})"));
                self.desktop.move_cursor(x, y)?;
            }
            Step::MouseScroll { x, y, delta } => {
                let (x, y) = self.resolve_point(x, y);
                self.info(LogActivity::Mouse, format!("Scroll {delta} at ({x}, {y})"));
                self.desktop.scroll(x, y, *delta)?;
            }
            Step::WaitWindow { title, timeout_ms } => {
                let title = self.context.variables.interpolate(title);
                self.wait_window(&title, *timeout_ms)?;
            }
            Step::WaitPixel {
                x,
                y,
                color,
                tolerance,
                timeout_ms,
            } => {
                let (x, y) = self.resolve_point(x, y);
                let color = self.context.variables.interpolate(color);
                self.wait_pixel(x, y, &color, *tolerance, *timeout_ms)?;
            }
            Step::IfCondition {
                condition,
                then_steps,
                else_steps,
            } => {
                let matched = self.evaluate(condition)?;
                self.info(
                    LogActivity::IfCondition,
                    format!(
                        "{} -> {}",
                        describe(condition),
                        if matched { "then" } else { "else" }
                    ),
                );
                let branch = if matched { then_steps } else { else_steps };
                self.execute_list(branch, delay_ms)?;
            }
            Step::Loop {
                mode,
                count,
                condition,
                max_iterations,
                body_steps,
            } => self.execute_loop(*mode, *count, condition, *max_iterations, body_steps, delay_ms)?,
            action => {
                let resolved = action.interpolated(&self.context.variables);
                self.info(LogActivity::Action, flow.summary(id));
                self.actions.dispatch(&resolved, &self.context.cancel)?;
            }
        }

        Ok(())
    }

    fn execute_loop(
        &mut self,
        mode: LoopMode,
        count: u32,
        condition: &Condition,
        max_iterations: u32,
        body: &[StepId],
        delay_ms: u64,
    ) -> Result<()> {
        match mode {
            LoopMode::Count => {
                let iterations = count.min(max_iterations);
                self.info(LogActivity::Loop, format!("Repeating {iterations} times"));
                for idx in 0..iterations {
                    self.context.cancel.check()?;
                    self.context
                        .variables
                        .set(VariableNames::LOOP_INDEX, idx.to_string());
                    self.execute_list(body, delay_ms)?;
                }
            }
            LoopMode::WhileCondition => {
                let mut idx = 0;
                while idx < max_iterations {
                    if !self.evaluate(condition)? {
                        break;
                    }
                    self.context
                        .variables
                        .set(VariableNames::LOOP_INDEX, idx.to_string());
                    self.execute_list(body, delay_ms)?;
                    idx += 1;
                }
                if idx == max_iterations {
                    self.log_entry(
                        LogLevel::Warning,
                        LogActivity::Loop,
                        format!("Stopped at the {max_iterations} iteration ceiling"),
                    );
                } else {
                    self.info(LogActivity::Loop, format!("Condition false after {idx} iterations"));
                }
            }
            LoopMode::Unknown => {
                self.log_entry(
                    LogLevel::Warning,
                    LogActivity::Loop,
                    "Unknown loop mode, skipping".to_string(),
                );
            }
        }
        Ok(())
    }

    fn wait_window(&mut self, title: &str, timeout_ms: u64) -> Result<()> {
        let wanted = title.to_lowercase();
        let desktop = self.desktop;
        let matched = self.poll(timeout_ms, || {
            desktop
                .foreground_title()
                .is_ok_and(|current| current.to_lowercase().contains(&wanted))
        })?;

        let message = if matched {
            format!("Window '{title}' is active")
        } else {
            format!("Timed out after {timeout_ms}ms waiting for '{title}'")
        };
        self.record_wait(LogActivity::WaitWindow, matched, message);
        Ok(())
    }

    fn wait_pixel(&mut self, x: i32, y: i32, color: &str, tolerance: u32, timeout_ms: u64) -> Result<()> {
        let target = Rgb::parse_hex(color).unwrap_or_else(|| {
            log::warn!("invalid pixel color '{color}', using {}", StepDefaults::PIXEL_COLOR);
            Rgb::default()
        });
        let desktop = self.desktop;
        let matched = self.poll(timeout_ms, || {
            desktop
                .pixel_color(x, y)
                .is_ok_and(|current| current.matches(target, tolerance))
        })?;

        let message = if matched {
            format!("Pixel ({x}, {y}) matches {target}")
        } else {
            format!("Timed out after {timeout_ms}ms waiting for {target} at ({x}, {y})")
        };
        self.record_wait(LogActivity::WaitPixel, matched, message);
        Ok(())
    }

    /// Polls `predicate` until it holds or `timeout_ms` has passed since the
    /// first check. A timeout is not an error.
    fn poll<F: FnMut() -> bool>(&self, timeout_ms: u64, mut predicate: F) -> Result<bool> {
        let started = Instant::now();
        loop {
            self.context.cancel.check()?;
            if predicate() {
                return Ok(true);
            }
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            if elapsed >= timeout_ms {
                return Ok(false);
            }
            let nap = EngineConstants::WAIT_POLL_INTERVAL_MS.min(timeout_ms - elapsed);
            if !self.context.cancel.sleep(nap) {
                return Err(CoreError::Stopped);
            }
        }
    }

    fn record_wait(&mut self, activity: LogActivity, matched: bool, message: String) {
        self.context
            .variables
            .set(VariableNames::LAST_WAIT_RESULT, matched.to_string());
        let level = if matched {
            LogLevel::Info
        } else {
            LogLevel::Warning
        };
        self.log_entry(level, activity, message);
    }

    fn evaluate(&self, condition: &Condition) -> Result<bool> {
        evaluate_condition(
            condition,
            self.desktop,
            &self.context.variables,
            &self.context.cancel,
        )
    }

    fn resolve_point(&self, x: &Coord, y: &Coord) -> (i32, i32) {
        (
            x.resolve(&self.context.variables),
            y.resolve(&self.context.variables),
        )
    }

    fn info(&mut self, activity: LogActivity, message: String) {
        self.log_entry(LogLevel::Info, activity, message);
    }

    fn log_entry(&mut self, level: LogLevel, activity: LogActivity, message: String) {
        self.log.log(LogEntry {
            timestamp: get_timestamp(self.context.start_time),
            run_id: Some(self.context.run_id.clone()),
            level,
            activity,
            message,
        });
    }
}

/// Outcome of [`execute_flow`].
#[derive(Debug)]
pub struct ExecutionSummary {
    pub run_id: RunId,
    pub steps_executed: usize,
    pub error: Option<CoreError>,
    pub variables: VariableStore,
}

impl ExecutionSummary {
    pub fn was_stopped(&self) -> bool {
        matches!(self.error, Some(CoreError::Stopped))
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs `flow` to completion or cancellation, logging start, end and any
/// failure, and finishing with the execution-complete marker entry.
pub fn execute_flow<L: LogOutput>(
    flow: &Flow,
    desktop: &dyn Desktop,
    actions: &dyn ActionDispatcher,
    mut context: ExecutionContext,
    default_delay_ms: u64,
    log: &mut L,
) -> ExecutionSummary {
    let start = |level, message: String, context: &ExecutionContext| LogEntry {
        timestamp: get_timestamp(context.start_time),
        run_id: Some(context.run_id.clone()),
        level,
        activity: LogActivity::System,
        message,
    };

    log.log(LogEntry {
        activity: LogActivity::Start,
        ..start(
            LogLevel::Info,
            format!("Starting flow ({} top-level steps)", flow.root().len()),
            &context,
        )
    });

    let (result, steps_executed) = {
        let mut executor = FlowExecutor::new(flow, desktop, actions, &mut context, log);
        let result = executor.execute(default_delay_ms);
        (result, executor.steps_executed())
    };

    let error = result.err();
    match &error {
        None => log.log(LogEntry {
            activity: LogActivity::End,
            ..start(
                LogLevel::Info,
                format!("Flow completed ({steps_executed} steps)"),
                &context,
            )
        }),
        Some(CoreError::Stopped) => log.log(start(
            LogLevel::Warning,
            format!("Flow stopped after {steps_executed} steps"),
            &context,
        )),
        Some(e) => log.log(start(LogLevel::Error, format!("Execution error: {e}"), &context)),
    }
    log.log(start(
        LogLevel::Info,
        EngineConstants::EXECUTION_COMPLETE_MARKER.to_string(),
        &context,
    ));

    ExecutionSummary {
        run_id: context.run_id.clone(),
        steps_executed,
        error,
        variables: context.into_variables(),
    }
}

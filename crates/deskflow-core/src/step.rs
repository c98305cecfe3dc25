use serde::{Deserialize, Deserializer, Serialize};
use std::convert::Infallible;
use std::fmt;

use crate::constants::StepDefaults;
use crate::error::{CoreError, Result};
use crate::variables::VariableStore;

/// Index of a step inside its [`Flow`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(usize);

impl StepId {
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A screen coordinate that is either a literal or a string that may carry
/// `{{var}}` tokens, resolved when the step runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Coord {
    Value(i64),
    Expr(String),
}

impl<'de> Deserialize<'de> for Coord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(text) => Self::Expr(text),
            other => Self::Value(lenient_number(&other).unwrap_or_else(|| {
                if !other.is_null() {
                    log::warn!("coordinate {other} is not a number, using 0");
                }
                0
            })),
        })
    }
}

impl Default for Coord {
    fn default() -> Self {
        Self::Value(0)
    }
}

impl From<i32> for Coord {
    fn from(value: i32) -> Self {
        Self::Value(i64::from(value))
    }
}

impl From<&str> for Coord {
    fn from(value: &str) -> Self {
        Self::Expr(value.to_owned())
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Expr(text) => f.write_str(text),
        }
    }
}

impl Coord {
    /// Interpolates and parses the coordinate. Text that does not parse as a
    /// number resolves to 0.
    pub fn resolve(&self, vars: &VariableStore) -> i32 {
        match self {
            Self::Value(v) => saturate(*v),
            Self::Expr(text) => {
                let resolved = vars.interpolate(text);
                let trimmed = resolved.trim();
                if let Ok(v) = trimmed.parse::<i64>() {
                    saturate(v)
                } else if let Ok(v) = trimmed.parse::<f64>() {
                    #[allow(clippy::cast_possible_truncation)]
                    let truncated = v.trunc() as i32;
                    truncated
                } else {
                    log::warn!("coordinate '{resolved}' is not a number, using 0");
                    0
                }
            }
        }
    }
}

fn saturate(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Right,
    Middle,
    #[default]
    #[serde(other)]
    Left,
}

impl MouseButton {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionSource {
    WindowTitle,
    ProcessName,
    Clipboard,
    Variable,
    LastWaitResult,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    #[default]
    Contains,
    Equals,
    StartsWith,
    NotContains,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Condition {
    #[serde(deserialize_with = "or_default")]
    pub source: ConditionSource,
    #[serde(deserialize_with = "or_default")]
    pub op: ConditionOp,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
    pub var_name: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Count,
    WhileCondition,
    #[serde(other)]
    Unknown,
}

/// One unit of automation. `C` is the representation of nested step lists:
/// [`StepId`] inside a [`Flow`] arena, [`StepDoc`] in the JSON document form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step<C = StepId> {
    Delay {
        #[serde(default = "default_delay_ms", deserialize_with = "lenient_delay_ms")]
        ms: u64,
    },
    SetVar {
        #[serde(default)]
        name: String,
        #[serde(default, deserialize_with = "scalar_string")]
        value: String,
    },
    GetClipboard {
        #[serde(default)]
        var: String,
    },
    SetClipboard {
        #[serde(default, deserialize_with = "scalar_string")]
        value: String,
    },
    MouseClick {
        #[serde(default)]
        x: Coord,
        #[serde(default)]
        y: Coord,
        #[serde(default, deserialize_with = "or_default")]
        button: MouseButton,
    },
    MouseDoubleClick {
        #[serde(default)]
        x: Coord,
        #[serde(default)]
        y: Coord,
    },
    MouseMove {
        #[serde(default)]
        x: Coord,
        #[serde(default)]
        y: Coord,
    },
    MouseScroll {
        #[serde(default)]
        x: Coord,
        #[serde(default)]
        y: Coord,
        #[serde(default = "default_scroll_delta", deserialize_with = "lenient_scroll_delta")]
        delta: i32,
    },
    WaitWindow {
        #[serde(default)]
        title: String,
        #[serde(
            rename = "timeout",
            default = "default_wait_timeout",
            deserialize_with = "lenient_wait_timeout"
        )]
        timeout_ms: u64,
    },
    WaitPixel {
        #[serde(default)]
        x: Coord,
        #[serde(default)]
        y: Coord,
        #[serde(default = "default_pixel_color")]
        color: String,
        #[serde(
            default = "default_pixel_tolerance",
            deserialize_with = "lenient_pixel_tolerance"
        )]
        tolerance: u32,
        #[serde(
            rename = "timeout",
            default = "default_wait_timeout",
            deserialize_with = "lenient_wait_timeout"
        )]
        timeout_ms: u64,
    },
    IfCondition {
        #[serde(default, deserialize_with = "or_default")]
        condition: Condition,
        #[serde(default = "Vec::new")]
        then_steps: Vec<C>,
        #[serde(default = "Vec::new")]
        else_steps: Vec<C>,
    },
    Loop {
        #[serde(default, deserialize_with = "or_default")]
        mode: LoopMode,
        #[serde(default = "default_loop_count", deserialize_with = "lenient_loop_count")]
        count: u32,
        #[serde(default, deserialize_with = "or_default")]
        condition: Condition,
        #[serde(
            default = "default_max_iterations",
            deserialize_with = "lenient_max_iterations"
        )]
        max_iterations: u32,
        #[serde(default = "Vec::new")]
        body_steps: Vec<C>,
    },
    App {
        #[serde(default)]
        target: String,
        #[serde(default)]
        args: String,
    },
    File {
        #[serde(default)]
        target: String,
    },
    Folder {
        #[serde(default)]
        target: String,
    },
    Url {
        #[serde(default)]
        target: String,
    },
    Shell {
        #[serde(default)]
        target: String,
        #[serde(default = "default_shell_type")]
        shell_type: String,
    },
    Snippet {
        #[serde(default)]
        target: String,
    },
    Keys {
        #[serde(default)]
        target: String,
        #[serde(default)]
        label: String,
    },
    TypeText {
        #[serde(default)]
        text: String,
    },
    Toast {
        #[serde(default)]
        message: String,
    },
    WindowActivate {
        #[serde(default)]
        title: String,
    },
    Script {
        #[serde(default)]
        code: String,
        #[serde(default)]
        file: String,
        #[serde(
            default = "default_script_timeout",
            deserialize_with = "lenient_script_timeout"
        )]
        timeout: u64,
    },
}

const fn default_delay_ms() -> u64 {
    StepDefaults::DELAY_MS
}

const fn default_scroll_delta() -> i32 {
    StepDefaults::SCROLL_DELTA
}

const fn default_wait_timeout() -> u64 {
    StepDefaults::WAIT_TIMEOUT_MS
}

fn default_pixel_color() -> String {
    StepDefaults::PIXEL_COLOR.to_owned()
}

const fn default_pixel_tolerance() -> u32 {
    StepDefaults::PIXEL_TOLERANCE as u32
}

const fn default_loop_count() -> u32 {
    StepDefaults::LOOP_COUNT
}

const fn default_max_iterations() -> u32 {
    StepDefaults::LOOP_MAX_ITERATIONS
}

fn default_shell_type() -> String {
    StepDefaults::SHELL_TYPE.to_owned()
}

const fn default_script_timeout() -> u64 {
    StepDefaults::SCRIPT_TIMEOUT_SECS
}

/// Integer value of a JSON number or numeric string. Fractions are
/// truncated; values that do not fit `T` give `None`.
fn lenient_number<T: TryFrom<i64>>(value: &serde_json::Value) -> Option<T> {
    #[allow(clippy::cast_possible_truncation)]
    let from_float = |f: f64| f.is_finite().then(|| f.trunc() as i64);
    let n = match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(from_float)),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(from_float))
        }
        _ => None,
    }?;
    T::try_from(n).ok()
}

fn lenient<'de, D, T>(deserializer: D, fallback: fn() -> T) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64> + fmt::Display,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(lenient_number(&value).unwrap_or_else(|| {
        let fallback = fallback();
        if !value.is_null() {
            log::warn!("invalid number {value}, using {fallback}");
        }
        fallback
    }))
}

fn lenient_delay_ms<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    lenient(d, default_delay_ms)
}

fn lenient_scroll_delta<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i32, D::Error> {
    lenient(d, default_scroll_delta)
}

fn lenient_wait_timeout<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    lenient(d, default_wait_timeout)
}

fn lenient_pixel_tolerance<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<u32, D::Error> {
    lenient(d, default_pixel_tolerance)
}

fn lenient_loop_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    lenient(d, default_loop_count)
}

fn lenient_max_iterations<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u32, D::Error> {
    lenient(d, default_max_iterations)
}

fn lenient_script_timeout<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    lenient(d, default_script_timeout)
}

/// Unrecognised values of an enum or nested object become its default.
fn or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned + Default,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value).unwrap_or_default())
}

/// Accepts any JSON scalar where a string is expected.
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl<C> Step<C> {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Delay { .. } => "delay",
            Self::SetVar { .. } => "set_var",
            Self::GetClipboard { .. } => "get_clipboard",
            Self::SetClipboard { .. } => "set_clipboard",
            Self::MouseClick { .. } => "mouse_click",
            Self::MouseDoubleClick { .. } => "mouse_double_click",
            Self::MouseMove { .. } => "mouse_move",
            Self::MouseScroll { .. } => "mouse_scroll",
            Self::WaitWindow { .. } => "wait_window",
            Self::WaitPixel { .. } => "wait_pixel",
            Self::IfCondition { .. } => "if_condition",
            Self::Loop { .. } => "loop",
            Self::App { .. } => "app",
            Self::File { .. } => "file",
            Self::Folder { .. } => "folder",
            Self::Url { .. } => "url",
            Self::Shell { .. } => "shell",
            Self::Snippet { .. } => "snippet",
            Self::Keys { .. } => "keys",
            Self::TypeText { .. } => "type_text",
            Self::Toast { .. } => "toast",
            Self::WindowActivate { .. } => "window_activate",
            Self::Script { .. } => "script",
        }
    }

    /// Steps handled by the action dispatcher rather than the interpreter.
    pub const fn is_action(&self) -> bool {
        matches!(
            self,
            Self::App { .. }
                | Self::File { .. }
                | Self::Folder { .. }
                | Self::Url { .. }
                | Self::Shell { .. }
                | Self::Snippet { .. }
                | Self::Keys { .. }
                | Self::TypeText { .. }
                | Self::Toast { .. }
                | Self::WindowActivate { .. }
                | Self::Script { .. }
        )
    }

    pub fn children(&self) -> impl Iterator<Item = &C> {
        let (first, second): (&[C], &[C]) = match self {
            Self::IfCondition {
                then_steps,
                else_steps,
                ..
            } => (then_steps, else_steps),
            Self::Loop { body_steps, .. } => (body_steps, &[]),
            _ => (&[], &[]),
        };
        first.iter().chain(second.iter())
    }

    fn try_map_children<D, E, F>(self, mut f: F) -> std::result::Result<Step<D>, E>
    where
        F: FnMut(C) -> std::result::Result<D, E>,
    {
        let mut convert = |list: Vec<C>| {
            list.into_iter()
                .map(&mut f)
                .collect::<std::result::Result<Vec<D>, E>>()
        };

        Ok(match self {
            Self::IfCondition {
                condition,
                then_steps,
                else_steps,
            } => Step::IfCondition {
                condition,
                then_steps: convert(then_steps)?,
                else_steps: convert(else_steps)?,
            },
            Self::Loop {
                mode,
                count,
                condition,
                max_iterations,
                body_steps,
            } => Step::Loop {
                mode,
                count,
                condition,
                max_iterations,
                body_steps: convert(body_steps)?,
            },
            Self::Delay { ms } => Step::Delay { ms },
            Self::SetVar { name, value } => Step::SetVar { name, value },
            Self::GetClipboard { var } => Step::GetClipboard { var },
            Self::SetClipboard { value } => Step::SetClipboard { value },
            Self::MouseClick { x, y, button } => Step::MouseClick { x, y, button },
            Self::MouseDoubleClick { x, y } => Step::MouseDoubleClick { x, y },
            Self::MouseMove { x, y } => Step::MouseMove { x, y },
            Self::MouseScroll { x, y, delta } => Step::MouseScroll { x, y, delta },
            Self::WaitWindow { title, timeout_ms } => Step::WaitWindow { title, timeout_ms },
            Self::WaitPixel {
                x,
                y,
                color,
                tolerance,
                timeout_ms,
            } => Step::WaitPixel {
                x,
                y,
                color,
                tolerance,
                timeout_ms,
            },
            Self::App { target, args } => Step::App { target, args },
            Self::File { target } => Step::File { target },
            Self::Folder { target } => Step::Folder { target },
            Self::Url { target } => Step::Url { target },
            Self::Shell { target, shell_type } => Step::Shell { target, shell_type },
            Self::Snippet { target } => Step::Snippet { target },
            Self::Keys { target, label } => Step::Keys { target, label },
            Self::TypeText { text } => Step::TypeText { text },
            Self::Toast { message } => Step::Toast { message },
            Self::WindowActivate { title } => Step::WindowActivate { title },
            Self::Script {
                code,
                file,
                timeout,
            } => Step::Script {
                code,
                file,
                timeout,
            },
        })
    }
}

impl Step {
    /// Copy of an action step with every string field interpolated. Control
    /// flow steps are returned unchanged.
    #[must_use]
    pub fn interpolated(&self, vars: &VariableStore) -> Self {
        let i = |s: &String| vars.interpolate(s);
        match self {
            Self::App { target, args } => Self::App {
                target: i(target),
                args: i(args),
            },
            Self::File { target } => Self::File { target: i(target) },
            Self::Folder { target } => Self::Folder { target: i(target) },
            Self::Url { target } => Self::Url { target: i(target) },
            Self::Shell { target, shell_type } => Self::Shell {
                target: i(target),
                shell_type: i(shell_type),
            },
            Self::Snippet { target } => Self::Snippet { target: i(target) },
            Self::Keys { target, label } => Self::Keys {
                target: i(target),
                label: i(label),
            },
            Self::TypeText { text } => Self::TypeText { text: i(text) },
            Self::Toast { message } => Self::Toast { message: i(message) },
            Self::WindowActivate { title } => Self::WindowActivate { title: i(title) },
            Self::Script {
                code,
                file,
                timeout,
            } => Self::Script {
                code: i(code),
                file: i(file),
                timeout: *timeout,
            },
            other => other.clone(),
        }
    }
}

/// Nested document form of a step, as stored on disk and sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepDoc(pub Step<StepDoc>);

/// Arena of steps with index-based child lists. Children are always added
/// before their parent, so the graph is acyclic by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<StepDoc>", into = "Vec<StepDoc>")]
pub struct Flow {
    nodes: Vec<Step>,
    root: Vec<StepId>,
}

impl Flow {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a step without placing it in the root list. Its children must
    /// already be in the arena.
    pub fn add(&mut self, step: Step) -> Result<StepId> {
        if let Some(bad) = step.children().find(|c| c.0 >= self.nodes.len()) {
            return Err(CoreError::MissingStep(bad.0));
        }
        let id = StepId(self.nodes.len());
        self.nodes.push(step);
        Ok(id)
    }

    /// Adds a step and appends it to the root list.
    pub fn push(&mut self, step: Step) -> Result<StepId> {
        let id = self.add(step)?;
        self.root.push(id);
        Ok(id)
    }

    pub fn root(&self) -> &[StepId] {
        &self.root
    }

    pub fn get(&self, id: StepId) -> Option<&Step> {
        self.nodes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root_steps(&self) -> impl Iterator<Item = &Step> {
        self.root.iter().filter_map(|id| self.get(*id))
    }

    pub fn from_docs(docs: Vec<StepDoc>) -> Self {
        let mut flow = Self::new();
        for doc in docs {
            let id = flow.insert_doc(doc);
            flow.root.push(id);
        }
        flow
    }

    fn insert_doc(&mut self, doc: StepDoc) -> StepId {
        let Ok(step) = doc
            .0
            .try_map_children::<_, Infallible, _>(|child| Ok(self.insert_doc(child)));
        let id = StepId(self.nodes.len());
        self.nodes.push(step);
        id
    }

    pub fn to_docs(&self) -> Vec<StepDoc> {
        self.root
            .iter()
            .filter_map(|id| self.doc_for(*id).ok())
            .collect()
    }

    fn doc_for(&self, id: StepId) -> Result<StepDoc> {
        let step = self.get(id).ok_or(CoreError::MissingStep(id.0))?;
        step.clone()
            .try_map_children(|child| self.doc_for(child))
            .map(StepDoc)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::InvalidFlow(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::InvalidFlow(e.to_string()))
    }

    /// One-line description of a step for logs and listings.
    pub fn summary(&self, id: StepId) -> String {
        let Some(step) = self.get(id) else {
            return format!("<missing {id}>");
        };
        match step {
            Step::Delay { ms } => format!("Delay {ms}ms"),
            Step::SetVar { name, value } => format!("Set {name} = {value}"),
            Step::GetClipboard { var } => format!("Clipboard -> {var}"),
            Step::SetClipboard { value } => format!("Clipboard <- {value}"),
            Step::MouseClick { x, y, button } => {
                format!("Click {} ({x}, {y})", button.as_str())
            }
            Step::MouseDoubleClick { x, y } => format!("Double click ({x}, {y})"),
            Step::MouseMove { x, y } => format!("Move to ({x}, {y})"),
            Step::MouseScroll { x, y, delta } => format!("Scroll {delta} at ({x}, {y})"),
            Step::WaitWindow { title, timeout_ms } => {
                format!("Wait for window '{title}' ({timeout_ms}ms)")
            }
            Step::WaitPixel {
                x,
                y,
                color,
                timeout_ms,
                ..
            } => format!("Wait for {color} at ({x}, {y}) ({timeout_ms}ms)"),
            Step::IfCondition {
                then_steps,
                else_steps,
                ..
            } => format!(
                "If ({} then, {} else)",
                then_steps.len(),
                else_steps.len()
            ),
            Step::Loop {
                mode,
                count,
                max_iterations,
                body_steps,
                ..
            } => match mode {
                LoopMode::WhileCondition => format!(
                    "While (max {max_iterations}, {} steps)",
                    body_steps.len()
                ),
                _ => format!("Repeat {count}x ({} steps)", body_steps.len()),
            },
            Step::Keys { target, label } if !label.is_empty() && label != target => {
                format!("Keys {label} [{target}]")
            }
            Step::Keys { target, .. } => format!("Keys {target}"),
            Step::App { target, .. }
            | Step::File { target }
            | Step::Folder { target }
            | Step::Url { target }
            | Step::Shell { target, .. }
            | Step::Snippet { target } => format!("{} {target}", step.kind()),
            Step::TypeText { text } => format!("Type '{text}'"),
            Step::Toast { message } => format!("Toast '{message}'"),
            Step::WindowActivate { title } => format!("Activate window '{title}'"),
            Step::Script { file, .. } if !file.is_empty() => format!("Script {file}"),
            Step::Script { code, .. } => format!("Script ({} lines)", code.lines().count()),
        }
    }
}

impl From<Vec<StepDoc>> for Flow {
    fn from(docs: Vec<StepDoc>) -> Self {
        Self::from_docs(docs)
    }
}

impl From<Flow> for Vec<StepDoc> {
    fn from(flow: Flow) -> Self {
        flow.to_docs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NESTED: &str = r#"[
        {"type": "set_var", "name": "x", "value": 5},
        {"type": "if_condition",
         "condition": {"source": "variable", "var_name": "x", "op": "equals", "value": "5"},
         "then_steps": [
            {"type": "loop", "count": 2, "body_steps": [{"type": "delay", "ms": 10}]}
         ],
         "else_steps": [{"type": "keys", "target": "ctrl+c"}]},
        {"type": "mouse_click", "x": "{{x}}", "y": 20}
    ]"#;

    #[test]
    fn test_parse_nested_into_arena() {
        let flow = Flow::from_json(NESTED).unwrap();

        assert_eq!(flow.root().len(), 3);
        assert_eq!(flow.len(), 6);

        let Some(Step::IfCondition {
            condition,
            then_steps,
            else_steps,
        }) = flow.get(flow.root()[1])
        else {
            panic!("expected if_condition");
        };
        assert_eq!(condition.source, ConditionSource::Variable);
        assert_eq!(condition.op, ConditionOp::Equals);
        assert_eq!(then_steps.len(), 1);
        assert_eq!(else_steps.len(), 1);

        let Some(Step::Loop {
            mode, body_steps, ..
        }) = flow.get(then_steps[0])
        else {
            panic!("expected loop");
        };
        assert_eq!(*mode, LoopMode::Count);
        assert_eq!(flow.get(body_steps[0]), Some(&Step::Delay { ms: 10 }));
    }

    #[test]
    fn test_children_precede_parents() {
        let flow = Flow::from_json(NESTED).unwrap();
        for idx in 0..flow.len() {
            let id = StepId(idx);
            for child in flow.get(id).unwrap().children() {
                assert!(child.index() < idx);
            }
        }
    }

    #[test]
    fn test_scalar_values_become_strings() {
        let flow = Flow::from_json(NESTED).unwrap();
        assert_eq!(
            flow.root_steps().next(),
            Some(&Step::SetVar {
                name: "x".to_string(),
                value: "5".to_string()
            })
        );
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let flow = Flow::from_json(
            r#"[{"type": "delay"}, {"type": "wait_pixel"}, {"type": "loop"}, {"type": "mouse_click"}]"#,
        )
        .unwrap();
        let steps: Vec<_> = flow.root_steps().collect();

        assert_eq!(steps[0], &Step::Delay { ms: 1000 });
        assert_eq!(
            steps[1],
            &Step::WaitPixel {
                x: Coord::Value(0),
                y: Coord::Value(0),
                color: "#000000".to_string(),
                tolerance: 10,
                timeout_ms: 5000,
            }
        );
        let Step::Loop {
            mode,
            count,
            max_iterations,
            ..
        } = steps[2]
        else {
            panic!("expected loop");
        };
        assert_eq!((*mode, *count, *max_iterations), (LoopMode::Count, 1, 100));
        assert_eq!(
            steps[3],
            &Step::MouseClick {
                x: Coord::Value(0),
                y: Coord::Value(0),
                button: MouseButton::Left
            }
        );
    }

    #[test]
    fn test_unknown_step_type_is_rejected() {
        let err = Flow::from_json(r#"[{"type": "teleport"}]"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidFlow(_)));
    }

    #[test]
    fn test_unknown_enum_values_fall_back() {
        let flow = Flow::from_json(
            r#"[{"type": "if_condition", "condition": {"source": "moon", "op": "resembles"}},
                {"type": "mouse_click", "button": "x1"}]"#,
        )
        .unwrap();
        let steps: Vec<_> = flow.root_steps().collect();
        let Step::IfCondition { condition, .. } = steps[0] else {
            panic!("expected if_condition");
        };
        assert_eq!(condition.source, ConditionSource::Unknown);
        assert_eq!(condition.op, ConditionOp::Unknown);
        assert!(matches!(
            steps[1],
            Step::MouseClick {
                button: MouseButton::Left,
                ..
            }
        ));
    }

    #[test]
    fn test_garbled_coordinates_are_tolerated() {
        let flow = Flow::from_json(
            r#"[{"type": "mouse_click", "x": 10.5, "y": null},
                {"type": "mouse_move", "x": "12", "y": true}]"#,
        )
        .unwrap();
        let steps: Vec<_> = flow.root_steps().collect();
        assert_eq!(
            steps[0],
            &Step::MouseClick {
                x: Coord::Value(10),
                y: Coord::Value(0),
                button: MouseButton::Left
            }
        );
        assert_eq!(
            steps[1],
            &Step::MouseMove {
                x: Coord::Expr("12".into()),
                y: Coord::Value(0)
            }
        );
    }

    #[test]
    fn test_garbled_numbers_use_defaults() {
        let flow = Flow::from_json(
            r#"[{"type": "delay", "ms": "500"},
                {"type": "delay", "ms": -3},
                {"type": "wait_pixel", "tolerance": -1, "timeout": "soon"},
                {"type": "loop", "count": "2.7", "max_iterations": null, "mode": 4},
                {"type": "mouse_scroll", "delta": "-120"},
                {"type": "script", "timeout": [1]},
                {"type": "mouse_click", "button": null}]"#,
        )
        .unwrap();
        let steps: Vec<_> = flow.root_steps().collect();

        assert_eq!(steps[0], &Step::Delay { ms: 500 });
        assert_eq!(steps[1], &Step::Delay { ms: 1000 });
        assert!(matches!(
            steps[2],
            Step::WaitPixel {
                tolerance: 10,
                timeout_ms: 5000,
                ..
            }
        ));
        assert!(matches!(
            steps[3],
            Step::Loop {
                mode: LoopMode::Count,
                count: 2,
                max_iterations: 100,
                ..
            }
        ));
        assert!(matches!(steps[4], Step::MouseScroll { delta: -120, .. }));
        assert!(matches!(steps[5], Step::Script { timeout: 30, .. }));
        assert!(matches!(
            steps[6],
            Step::MouseClick {
                button: MouseButton::Left,
                ..
            }
        ));
    }

    #[test]
    fn test_document_survives_arena() {
        let flow = Flow::from_json(NESTED).unwrap();
        let json = flow.to_json().unwrap();
        let reparsed = Flow::from_json(&json).unwrap();
        assert_eq!(reparsed, flow);
        assert!(json.contains("\"then_steps\""));
    }

    #[test]
    fn test_add_rejects_unknown_children() {
        let mut flow = Flow::new();
        let err = flow
            .add(Step::Loop {
                mode: LoopMode::Count,
                count: 1,
                condition: Condition::default(),
                max_iterations: 1,
                body_steps: vec![StepId(3)],
            })
            .unwrap_err();
        assert_eq!(err, CoreError::MissingStep(3));
    }

    #[test]
    fn test_coord_resolution() {
        let mut vars = VariableStore::new();
        vars.set("x", "42");
        vars.set("f", "7.9");

        assert_eq!(Coord::from("{{x}}").resolve(&vars), 42);
        assert_eq!(Coord::from("{{f}}").resolve(&vars), 7);
        assert_eq!(Coord::from("{{nope}}").resolve(&vars), 0);
        assert_eq!(Coord::Value(i64::MAX).resolve(&vars), i32::MAX);
    }

    #[test]
    fn test_interpolated_touches_every_string_field() {
        let mut vars = VariableStore::new();
        vars.set("who", "ops");
        let step = Step::Shell {
            target: "echo {{who}}".to_string(),
            shell_type: "{{who}}".to_string(),
        };
        assert_eq!(
            step.interpolated(&vars),
            Step::Shell {
                target: "echo ops".to_string(),
                shell_type: "ops".to_string()
            }
        );
    }

    #[test]
    fn test_summary() {
        let flow = Flow::from_json(NESTED).unwrap();
        let root = flow.root();
        assert_eq!(flow.summary(root[0]), "Set x = 5");
        assert_eq!(flow.summary(root[1]), "If (1 then, 1 else)");
        assert_eq!(flow.summary(root[2]), "Click left ({{x}}, 20)");
    }
}

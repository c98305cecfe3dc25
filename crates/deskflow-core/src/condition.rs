use crate::cancel::CancelToken;
use crate::constants::VariableNames;
use crate::desktop::Desktop;
use crate::error::Result;
use crate::step::{Condition, ConditionOp, ConditionSource};
use crate::variables::VariableStore;

/// Evaluates `condition` against live host state. Host lookups that fail
/// read as an empty string; comparisons ignore case.
pub fn evaluate_condition(
    condition: &Condition,
    desktop: &dyn Desktop,
    vars: &VariableStore,
    cancel: &CancelToken,
) -> Result<bool> {
    cancel.check()?;

    let expected = vars.interpolate(&condition.value).to_lowercase();
    let current = current_value(condition, desktop, vars).to_lowercase();

    Ok(compare(condition.op, &current, &expected))
}

fn current_value(condition: &Condition, desktop: &dyn Desktop, vars: &VariableStore) -> String {
    let looked_up = match condition.source {
        ConditionSource::WindowTitle => desktop.foreground_title(),
        ConditionSource::ProcessName => desktop.foreground_process(),
        ConditionSource::Clipboard => desktop.clipboard_text(),
        ConditionSource::Variable => Ok(vars.get(&condition.var_name).unwrap_or_default().to_owned()),
        ConditionSource::LastWaitResult => Ok(vars
            .get(VariableNames::LAST_WAIT_RESULT)
            .unwrap_or_default()
            .to_owned()),
        ConditionSource::Unknown => Ok(String::new()),
    };

    looked_up.unwrap_or_else(|e| {
        log::debug!("condition source {:?} unavailable: {e}", condition.source);
        String::new()
    })
}

const fn compare_names(op: ConditionOp) -> &'static str {
    match op {
        ConditionOp::Contains => "contains",
        ConditionOp::Equals => "equals",
        ConditionOp::StartsWith => "starts with",
        ConditionOp::NotContains => "does not contain",
        ConditionOp::Unknown => "?",
    }
}

fn compare(op: ConditionOp, current: &str, expected: &str) -> bool {
    match op {
        ConditionOp::Contains => current.contains(expected),
        ConditionOp::Equals => current == expected,
        ConditionOp::StartsWith => current.starts_with(expected),
        ConditionOp::NotContains => !current.contains(expected),
        ConditionOp::Unknown => false,
    }
}

/// Human readable form used in run logs, e.g. `window_title contains "notepad"`.
pub fn describe(condition: &Condition) -> String {
    let source = match condition.source {
        ConditionSource::WindowTitle => "window_title".to_owned(),
        ConditionSource::ProcessName => "process_name".to_owned(),
        ConditionSource::Clipboard => "clipboard".to_owned(),
        ConditionSource::Variable => format!("{{{{{}}}}}", condition.var_name),
        ConditionSource::LastWaitResult => "last_wait_result".to_owned(),
        ConditionSource::Unknown => "<none>".to_owned(),
    };
    format!(
        "{source} {} \"{}\"",
        compare_names(condition.op),
        condition.value
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDesktop;

    fn cond(source: ConditionSource, op: ConditionOp, value: &str) -> Condition {
        Condition {
            source,
            op,
            value: value.to_string(),
            var_name: String::new(),
        }
    }

    #[test]
    fn test_window_title_ops_ignore_case() {
        let desktop = MockDesktop::new();
        desktop.set_title("Untitled - Notepad");
        let vars = VariableStore::new();
        let cancel = CancelToken::new();
        let eval = |op, value| {
            evaluate_condition(
                &cond(ConditionSource::WindowTitle, op, value),
                &desktop,
                &vars,
                &cancel,
            )
            .unwrap()
        };

        assert!(eval(ConditionOp::Contains, "NOTEPAD"));
        assert!(eval(ConditionOp::Equals, "untitled - notepad"));
        assert!(eval(ConditionOp::StartsWith, "untitled"));
        assert!(!eval(ConditionOp::NotContains, "notepad"));
        assert!(eval(ConditionOp::NotContains, "excel"));
        assert!(!eval(ConditionOp::Unknown, ""));
    }

    #[test]
    fn test_variable_source_and_interpolated_value() {
        let desktop = MockDesktop::new();
        let mut vars = VariableStore::new();
        vars.set("status", "Ready");
        vars.set("expected", "ready");
        let condition = Condition {
            source: ConditionSource::Variable,
            op: ConditionOp::Equals,
            value: "{{expected}}".to_string(),
            var_name: "status".to_string(),
        };

        assert!(evaluate_condition(&condition, &desktop, &vars, &CancelToken::new()).unwrap());
    }

    #[test]
    fn test_unknown_source_reads_empty() {
        let desktop = MockDesktop::new();
        let vars = VariableStore::new();
        let cancel = CancelToken::new();

        let empty_equals = cond(ConditionSource::Unknown, ConditionOp::Equals, "");
        assert!(evaluate_condition(&empty_equals, &desktop, &vars, &cancel).unwrap());

        let contains_x = cond(ConditionSource::Unknown, ConditionOp::Contains, "x");
        assert!(!evaluate_condition(&contains_x, &desktop, &vars, &cancel).unwrap());
    }

    #[test]
    fn test_cancelled_token_stops_evaluation() {
        let desktop = MockDesktop::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let condition = cond(ConditionSource::Clipboard, ConditionOp::Contains, "");
        assert!(evaluate_condition(&condition, &desktop, &VariableStore::new(), &cancel).is_err());
    }

    #[test]
    fn test_describe() {
        let mut condition = cond(ConditionSource::Variable, ConditionOp::StartsWith, "ab");
        condition.var_name = "name".to_string();
        assert_eq!(describe(&condition), "{{name}} starts with \"ab\"");
    }
}

use std::sync::Arc;

use serde_json::Value;

use super::HostServices;
use crate::registry::MethodRegistry;
use crate::ui::{UiAnswer, UiPrompt};

pub fn register(registry: &mut MethodRegistry, services: &Arc<HostServices>) {
    let s = Arc::clone(services);
    registry.register("ui.toast", move |p| {
        s.ui.show(UiPrompt::Toast {
            message: p.str_or("msg", "")?.to_string(),
            duration_ms: p.i64_or("duration", 1500)?.max(0).unsigned_abs(),
        })?;
        Ok(Value::Bool(true))
    });

    let s = Arc::clone(services);
    registry.register("ui.notify", move |p| {
        s.ui.show(UiPrompt::Notify {
            title: p.str_or("title", "")?.to_string(),
            message: p.str_or("msg", "")?.to_string(),
        })?;
        Ok(Value::Bool(true))
    });

    let s = Arc::clone(services);
    registry.register("ui.input", move |p| {
        let answer = s.ui.ask(UiPrompt::Input {
            title: p.str_or("title", "")?.to_string(),
            default: p.str_or("default", "")?.to_string(),
        })?;
        Ok(answer.into_value())
    });

    let s = Arc::clone(services);
    registry.register("ui.confirm", move |p| {
        let answer = s.ui.ask(UiPrompt::Confirm {
            title: p.str_or("title", "")?.to_string(),
            message: p.str_or("msg", "")?.to_string(),
        })?;
        Ok(Value::Bool(answer == UiAnswer::Confirmed(true)))
    });

    let s = Arc::clone(services);
    registry.register("ui.select", move |p| {
        let options: Vec<String> = match p.get("options") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .collect(),
            _ => Vec::new(),
        };
        if options.is_empty() {
            return Ok(Value::Null);
        }
        let answer = s.ui.ask(UiPrompt::Select {
            title: p.str_or("title", "")?.to_string(),
            options,
        })?;
        Ok(answer.into_value())
    });
}

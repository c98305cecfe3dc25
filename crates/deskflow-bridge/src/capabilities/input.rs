use std::sync::Arc;

use deskflow_core::MouseButton;
use serde_json::Value;

use super::HostServices;
use crate::error::{BridgeError, Result};
use crate::registry::{MethodRegistry, Params};

fn button(params: &Params) -> Result<MouseButton> {
    match params.str_or("button", "left")? {
        "left" => Ok(MouseButton::Left),
        "right" => Ok(MouseButton::Right),
        "middle" => Ok(MouseButton::Middle),
        other => Err(BridgeError::InvalidParam {
            name: "button",
            reason: format!("unknown button '{other}'"),
        }),
    }
}

pub fn register(registry: &mut MethodRegistry, services: &Arc<HostServices>) {
    let s = Arc::clone(services);
    registry.register("keys.send", move |p| {
        s.platform.send_combo(p.str("combo")?)?;
        Ok(Value::Bool(true))
    });

    let s = Arc::clone(services);
    registry.register("keys.type_text", move |p| {
        let text = p.str_or("text", "")?;
        if !text.is_empty() {
            s.platform.input.type_text(text)?;
        }
        Ok(Value::Bool(true))
    });

    let s = Arc::clone(services);
    registry.register("mouse.click", move |p| {
        s.platform.click_at(p.i32("x")?, p.i32("y")?, button(p)?)?;
        Ok(Value::Bool(true))
    });

    let s = Arc::clone(services);
    registry.register("mouse.move", move |p| {
        s.platform.input.move_cursor(p.i32("x")?, p.i32("y")?)?;
        Ok(Value::Bool(true))
    });
}

#[cfg(test)]
mod tests {
    use crate::capabilities::test_support::harness;
    use crate::protocol::{Outcome, RpcRequest};
    use deskflow_core::MouseButton;
    use deskflow_platform::fake::InputCall;
    use serde_json::json;

    #[test]
    fn test_input_methods_drive_backend() {
        let h = harness();
        for (method, params) in [
            ("keys.send", json!({"combo": "ctrl+v"})),
            ("keys.type_text", json!({"text": "hi"})),
            ("mouse.click", json!({"x": 10, "y": 20, "button": "right"})),
            ("mouse.move", json!({"x": 3, "y": 4})),
        ] {
            let response = h.registry.dispatch(RpcRequest {
                id: 1,
                method: method.into(),
                params,
            });
            assert_eq!(response.outcome, Outcome::Result(json!(true)), "{method}");
        }

        assert_eq!(
            h.fake.input_calls(),
            vec![
                InputCall::Keys(vec![0x11, 0x56]),
                InputCall::Text("hi".into()),
                InputCall::Move(10, 20),
                InputCall::Button(MouseButton::Right, true),
                InputCall::Button(MouseButton::Right, false),
                InputCall::Move(3, 4),
            ]
        );
    }

    #[test]
    fn test_unknown_button_is_rejected() {
        let h = harness();
        let response = h.registry.dispatch(RpcRequest {
            id: 1,
            method: "mouse.click".into(),
            params: json!({"x": 1, "y": 1, "button": "fourth"}),
        });
        assert!(matches!(response.outcome, Outcome::Error(_)));
        assert!(h.fake.input_calls().is_empty());
    }
}

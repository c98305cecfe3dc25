use std::sync::Arc;

use serde_json::{Value, json};

use super::HostServices;
use crate::registry::MethodRegistry;

pub fn register(registry: &mut MethodRegistry, services: &Arc<HostServices>) {
    let s = Arc::clone(services);
    registry.register("clipboard.get_text", move |_| {
        Ok(Value::String(s.platform.desktop.clipboard_text()?))
    });

    let s = Arc::clone(services);
    registry.register("clipboard.set_text", move |p| {
        s.platform
            .desktop
            .set_clipboard_text(p.str_or("text", "")?)?;
        Ok(Value::Bool(true))
    });

    let s = Arc::clone(services);
    registry.register("clipboard.get_files", move |_| {
        Ok(json!(s.platform.desktop.clipboard_files()?))
    });
}

#[cfg(test)]
mod tests {
    use crate::capabilities::test_support::harness;
    use crate::protocol::{Outcome, RpcRequest};
    use serde_json::json;

    #[test]
    fn test_clipboard_round_trip() {
        let h = harness();
        let set = h.registry.dispatch(RpcRequest {
            id: 1,
            method: "clipboard.set_text".into(),
            params: json!({"text": "copied"}),
        });
        assert_eq!(set.outcome, Outcome::Result(json!(true)));

        let get = h.registry.dispatch(RpcRequest {
            id: 2,
            method: "clipboard.get_text".into(),
            params: json!({}),
        });
        assert_eq!(get.outcome, Outcome::Result(json!("copied")));
    }

    #[test]
    fn test_clipboard_files() {
        let h = harness();
        h.fake.set_clipboard_files(vec!["C:\\a.txt".into()]);
        let files = h.registry.dispatch(RpcRequest {
            id: 1,
            method: "clipboard.get_files".into(),
            params: json!(null),
        });
        assert_eq!(files.outcome, Outcome::Result(json!(["C:\\a.txt"])));
    }
}

use std::sync::Arc;

use serde_json::Value;

use super::HostServices;
use crate::registry::MethodRegistry;

pub fn register(registry: &mut MethodRegistry, services: &Arc<HostServices>) {
    let s = Arc::clone(services);
    registry.register("store.get", move |p| {
        let key = p.str("key")?;
        Ok(s
            .store
            .get(key)
            .or_else(|| p.get("default").cloned())
            .unwrap_or(Value::Null))
    });

    let s = Arc::clone(services);
    registry.register("store.set", move |p| {
        let value = p.get("value").cloned().unwrap_or(Value::Null);
        s.store.set(p.str("key")?, value)?;
        Ok(Value::Bool(true))
    });
}

#[cfg(test)]
mod tests {
    use crate::capabilities::test_support::harness;
    use crate::protocol::{Outcome, RpcRequest};
    use serde_json::{Value, json};

    #[test]
    fn test_get_falls_back_to_default() {
        let h = harness();
        let call = |method: &str, params: Value| {
            h.registry
                .dispatch(RpcRequest {
                    id: 1,
                    method: method.into(),
                    params,
                })
                .outcome
        };

        assert_eq!(
            call("store.get", json!({"key": "runs", "default": 0})),
            Outcome::Result(json!(0))
        );
        call("store.set", json!({"key": "runs", "value": 5}));
        assert_eq!(
            call("store.get", json!({"key": "runs", "default": 0})),
            Outcome::Result(json!(5))
        );
        assert_eq!(
            call("store.get", json!({"key": "other"})),
            Outcome::Result(Value::Null)
        );
    }
}

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::protocol::{RpcRequest, RpcResponse};

/// Keyword arguments of one call.
#[derive(Debug, Default)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(map) => Ok(Self(map)),
            other => Err(BridgeError::Protocol(format!(
                "params must be an object, got {other}"
            ))),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &'static str) -> Result<&str> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(BridgeError::InvalidParam {
                name,
                reason: format!("expected a string, got {other}"),
            }),
            None => Err(BridgeError::MissingParam(name)),
        }
    }

    pub fn str_or<'a>(&'a self, name: &'static str, default: &'a str) -> Result<&'a str> {
        if self.get(name).is_none() {
            return Ok(default);
        }
        self.str(name)
    }

    pub fn i64(&self, name: &'static str) -> Result<i64> {
        let value = self.get(name).ok_or(BridgeError::MissingParam(name))?;
        value
            .as_i64()
            // Scripts may pass floats such as 10.0.
            .or_else(|| value.as_f64().map(|f| f as i64))
            .ok_or_else(|| BridgeError::InvalidParam {
                name,
                reason: format!("expected a number, got {value}"),
            })
    }

    pub fn i64_or(&self, name: &'static str, default: i64) -> Result<i64> {
        if self.get(name).is_none() {
            return Ok(default);
        }
        self.i64(name)
    }

    pub fn i32(&self, name: &'static str) -> Result<i32> {
        let value = self.i64(name)?;
        i32::try_from(value).map_err(|_| BridgeError::InvalidParam {
            name,
            reason: format!("{value} is out of range"),
        })
    }

    pub fn bool_or(&self, name: &'static str, default: bool) -> Result<bool> {
        match self.get(name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(BridgeError::InvalidParam {
                name,
                reason: format!("expected a boolean, got {other}"),
            }),
        }
    }
}

pub type Handler = Box<dyn Fn(&Params) -> Result<Value> + Send + Sync>;

/// Method name to handler table. Filled once at startup, read-only after.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Handler>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `handler` under `method`, replacing an earlier one.
    pub fn register<F>(&mut self, method: &str, handler: F)
    where
        F: Fn(&Params) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Box::new(handler));
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Runs the handler for `request`. Every failure, panics included, is
    /// turned into an error response.
    pub fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        let Some(handler) = self.handlers.get(&request.method) else {
            log::warn!("rpc: unknown method '{}'", request.method);
            return RpcResponse::error(id, format!("unknown method: {}", request.method));
        };

        let params = match Params::from_value(request.params) {
            Ok(params) => params,
            Err(e) => return RpcResponse::error(id, e.to_string()),
        };

        match catch_unwind(AssertUnwindSafe(|| handler(&params))) {
            Ok(Ok(value)) => RpcResponse::result(id, value),
            Ok(Err(e)) => {
                log::warn!("rpc: {} failed: {e}", request.method);
                RpcResponse::error(id, e.to_string())
            }
            Err(_) => {
                log::warn!("rpc: {} panicked", request.method);
                RpcResponse::error(id, format!("{} panicked", request.method))
            }
        }
    }
}

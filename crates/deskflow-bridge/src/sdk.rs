//! Typed client API for code running inside a script process.

use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use crate::client::RpcClient;
use crate::error::Result;

/// Every capability method with its parameter names in positional order.
pub const METHODS: &[(&str, &[&str])] = &[
    ("clipboard.get_text", &[]),
    ("clipboard.set_text", &["text"]),
    ("clipboard.get_files", &[]),
    ("window.get_foreground", &[]),
    ("window.find", &["title"]),
    ("window.activate", &["hwnd"]),
    ("window.move", &["hwnd", "x", "y", "w", "h"]),
    ("window.minimize", &["hwnd"]),
    ("window.maximize", &["hwnd"]),
    ("window.close", &["hwnd"]),
    ("window.set_topmost", &["hwnd", "topmost"]),
    ("http.get", &["url", "headers", "timeout"]),
    ("http.post", &["url", "data", "json_body", "headers", "timeout"]),
    ("http.download", &["url", "save_path"]),
    ("ui.toast", &["msg", "duration"]),
    ("ui.notify", &["title", "msg"]),
    ("ui.input", &["title", "default"]),
    ("ui.confirm", &["title", "msg"]),
    ("ui.select", &["title", "options"]),
    ("keys.send", &["combo"]),
    ("keys.type_text", &["text"]),
    ("mouse.click", &["x", "y", "button"]),
    ("mouse.move", &["x", "y"]),
    ("system.env", &["name"]),
    ("system.run", &["cmd", "shell_type"]),
    ("system.open", &["path"]),
    ("store.get", &["key", "default"]),
    ("store.set", &["key", "value"]),
];

/// Builds a params object from `(name, value)` pairs, leaving out nulls.
pub fn params<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn optional_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(text(other)),
    }
}

pub struct Sdk {
    client: Mutex<RpcClient>,
}

impl Sdk {
    pub fn new(client: RpcClient) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    /// SDK bound to the port in `DESKFLOW_API_PORT`.
    pub fn from_env() -> Self {
        Self::new(RpcClient::from_env())
    }

    pub fn call(&self, method: &str, params: Map<String, Value>) -> Result<Value> {
        self.client.lock().call(method, params)
    }

    pub const fn clipboard(&self) -> Clipboard<'_> {
        Clipboard(self)
    }

    pub const fn window(&self) -> Window<'_> {
        Window(self)
    }

    pub const fn http(&self) -> Http<'_> {
        Http(self)
    }

    pub const fn ui(&self) -> Ui<'_> {
        Ui(self)
    }

    pub const fn keys(&self) -> Keys<'_> {
        Keys(self)
    }

    pub const fn mouse(&self) -> Mouse<'_> {
        Mouse(self)
    }

    pub const fn system(&self) -> System<'_> {
        System(self)
    }

    pub const fn store(&self) -> Store<'_> {
        Store(self)
    }
}

pub struct Clipboard<'a>(&'a Sdk);

impl Clipboard<'_> {
    pub fn get_text(&self) -> Result<String> {
        self.0.call("clipboard.get_text", Map::new()).map(text)
    }

    pub fn set_text(&self, value: &str) -> Result<()> {
        self.0
            .call("clipboard.set_text", params([("text", json!(value))]))
            .map(drop)
    }

    pub fn get_files(&self) -> Result<Vec<String>> {
        let value = self.0.call("clipboard.get_files", Map::new())?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }
}

pub struct Window<'a>(&'a Sdk);

impl Window<'_> {
    pub fn get_foreground(&self) -> Result<Value> {
        self.0.call("window.get_foreground", Map::new())
    }

    pub fn find(&self, title: &str) -> Result<Vec<Value>> {
        let value = self.0.call("window.find", params([("title", json!(title))]))?;
        Ok(serde_json::from_value(value).unwrap_or_default())
    }

    fn command(&self, method: &str, hwnd: i64) -> Result<()> {
        self.0.call(method, params([("hwnd", json!(hwnd))])).map(drop)
    }

    pub fn activate(&self, hwnd: i64) -> Result<()> {
        self.command("window.activate", hwnd)
    }

    pub fn minimize(&self, hwnd: i64) -> Result<()> {
        self.command("window.minimize", hwnd)
    }

    pub fn maximize(&self, hwnd: i64) -> Result<()> {
        self.command("window.maximize", hwnd)
    }

    pub fn close(&self, hwnd: i64) -> Result<()> {
        self.command("window.close", hwnd)
    }

    pub fn move_to(&self, hwnd: i64, x: i32, y: i32, w: i32, h: i32) -> Result<()> {
        self.0
            .call(
                "window.move",
                params([
                    ("hwnd", json!(hwnd)),
                    ("x", json!(x)),
                    ("y", json!(y)),
                    ("w", json!(w)),
                    ("h", json!(h)),
                ]),
            )
            .map(drop)
    }

    pub fn set_topmost(&self, hwnd: i64, topmost: bool) -> Result<()> {
        self.0
            .call(
                "window.set_topmost",
                params([("hwnd", json!(hwnd)), ("topmost", json!(topmost))]),
            )
            .map(drop)
    }
}

pub struct Http<'a>(&'a Sdk);

impl Http<'_> {
    /// `{status, text, headers}` of the response.
    pub fn get(&self, url: &str) -> Result<Value> {
        self.0.call("http.get", params([("url", json!(url))]))
    }

    pub fn post_json(&self, url: &str, body: Value) -> Result<Value> {
        self.0.call(
            "http.post",
            params([("url", json!(url)), ("json_body", body)]),
        )
    }

    pub fn download(&self, url: &str, save_path: &str) -> Result<String> {
        self.0
            .call(
                "http.download",
                params([("url", json!(url)), ("save_path", json!(save_path))]),
            )
            .map(text)
    }
}

pub struct Ui<'a>(&'a Sdk);

impl Ui<'_> {
    pub fn toast(&self, msg: &str) -> Result<()> {
        self.0.call("ui.toast", params([("msg", json!(msg))])).map(drop)
    }

    pub fn notify(&self, title: &str, msg: &str) -> Result<()> {
        self.0
            .call("ui.notify", params([("title", json!(title)), ("msg", json!(msg))]))
            .map(drop)
    }

    /// `None` when the user cancels.
    pub fn input(&self, title: &str, default: &str) -> Result<Option<String>> {
        self.0
            .call(
                "ui.input",
                params([("title", json!(title)), ("default", json!(default))]),
            )
            .map(optional_text)
    }

    pub fn confirm(&self, title: &str, msg: &str) -> Result<bool> {
        let value = self
            .0
            .call("ui.confirm", params([("title", json!(title)), ("msg", json!(msg))]))?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub fn select(&self, title: &str, options: &[&str]) -> Result<Option<String>> {
        self.0
            .call(
                "ui.select",
                params([("title", json!(title)), ("options", json!(options))]),
            )
            .map(optional_text)
    }
}

pub struct Keys<'a>(&'a Sdk);

impl Keys<'_> {
    pub fn send(&self, combo: &str) -> Result<()> {
        self.0.call("keys.send", params([("combo", json!(combo))])).map(drop)
    }

    pub fn type_text(&self, value: &str) -> Result<()> {
        self.0
            .call("keys.type_text", params([("text", json!(value))]))
            .map(drop)
    }
}

pub struct Mouse<'a>(&'a Sdk);

impl Mouse<'_> {
    pub fn click(&self, x: i32, y: i32) -> Result<()> {
        self.0
            .call("mouse.click", params([("x", json!(x)), ("y", json!(y))]))
            .map(drop)
    }

    pub fn move_to(&self, x: i32, y: i32) -> Result<()> {
        self.0
            .call("mouse.move", params([("x", json!(x)), ("y", json!(y))]))
            .map(drop)
    }
}

pub struct System<'a>(&'a Sdk);

impl System<'_> {
    pub fn env(&self, name: &str) -> Result<String> {
        self.0.call("system.env", params([("name", json!(name))])).map(text)
    }

    pub fn run(&self, cmd: &str, shell_type: &str) -> Result<String> {
        self.0
            .call(
                "system.run",
                params([("cmd", json!(cmd)), ("shell_type", json!(shell_type))]),
            )
            .map(text)
    }

    pub fn open(&self, path: &str) -> Result<()> {
        self.0.call("system.open", params([("path", json!(path))])).map(drop)
    }
}

pub struct Store<'a>(&'a Sdk);

impl Store<'_> {
    /// Stored value, or `default` when the key is absent.
    pub fn get(&self, key: &str, default: Value) -> Result<Value> {
        self.0
            .call("store.get", params([("key", json!(key)), ("default", default)]))
    }

    pub fn set(&self, key: &str, value: Value) -> Result<()> {
        self.0
            .call("store.set", params([("key", json!(key)), ("value", value)]))
            .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_skip_nulls() {
        let built = params([("a", json!(1)), ("b", Value::Null), ("c", json!("x"))]);
        assert_eq!(Value::Object(built), json!({"a": 1, "c": "x"}));
    }

    #[test]
    fn test_method_names_are_namespaced() {
        for (method, _) in METHODS {
            let (namespace, verb) = method.split_once('.').unwrap();
            assert!(!namespace.is_empty() && !verb.is_empty());
        }
    }

    #[test]
    fn test_text_conversion() {
        assert_eq!(text(Value::Null), "");
        assert_eq!(optional_text(Value::Null), None);
        assert_eq!(optional_text(json!("v")), Some("v".into()));
    }
}

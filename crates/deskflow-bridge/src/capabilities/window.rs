use std::sync::Arc;

use deskflow_platform::WindowCommand;
use serde_json::{Value, json};

use super::HostServices;
use crate::error::{BridgeError, Result};
use crate::registry::{MethodRegistry, Params};

fn hwnd(params: &Params) -> Result<isize> {
    let raw = params.i64("hwnd")?;
    isize::try_from(raw).map_err(|_| BridgeError::InvalidParam {
        name: "hwnd",
        reason: format!("{raw} is not a window handle"),
    })
}

fn command(
    registry: &mut MethodRegistry,
    services: &Arc<HostServices>,
    method: &str,
    build: fn(&Params) -> Result<WindowCommand>,
) {
    let s = Arc::clone(services);
    registry.register(method, move |p| {
        s.platform.desktop.window_command(hwnd(p)?, build(p)?)?;
        Ok(Value::Bool(true))
    });
}

pub fn register(registry: &mut MethodRegistry, services: &Arc<HostServices>) {
    let s = Arc::clone(services);
    registry.register("window.get_foreground", move |_| {
        Ok(json!(s.platform.desktop.foreground_window()?))
    });

    let s = Arc::clone(services);
    registry.register("window.find", move |p| {
        Ok(json!(s.platform.find_windows(p.str_or("title", "")?)?))
    });

    command(registry, services, "window.activate", |_| {
        Ok(WindowCommand::Activate)
    });
    command(registry, services, "window.minimize", |_| {
        Ok(WindowCommand::Minimize)
    });
    command(registry, services, "window.maximize", |_| {
        Ok(WindowCommand::Maximize)
    });
    command(registry, services, "window.close", |_| Ok(WindowCommand::Close));
    command(registry, services, "window.move", |p| {
        Ok(WindowCommand::Move {
            x: p.i32("x")?,
            y: p.i32("y")?,
            width: p.i32("w")?,
            height: p.i32("h")?,
        })
    });
    command(registry, services, "window.set_topmost", |p| {
        Ok(WindowCommand::Topmost(p.bool_or("topmost", true)?))
    });
}

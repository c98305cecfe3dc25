//! Runs a Lua script file with a `deskflow` global whose `connect()` returns
//! a `ctx` table mirroring the SDK: `ctx.clipboard.get_text()`,
//! `ctx.store.set("k", 1)`, `ctx.call("ui.toast", {msg = "hi"})`.

use std::path::Path;
use std::rc::Rc;

use mlua::prelude::*;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::sdk::{METHODS, Sdk};

fn to_lua(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
    let options = LuaSerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false);
    lua.to_value_with(value, options)
}

fn from_lua(lua: &Lua, value: LuaValue) -> LuaResult<Value> {
    lua.from_value(value)
}

/// Binds positional Lua arguments to the method's parameter names.
fn positional_params(lua: &Lua, names: &[&str], args: LuaMultiValue) -> LuaResult<Map<String, Value>> {
    let mut params = Map::new();
    for (name, arg) in names.iter().zip(args) {
        let value = from_lua(lua, arg)?;
        if !value.is_null() {
            params.insert((*name).to_string(), value);
        }
    }
    Ok(params)
}

fn build_ctx(lua: &Lua, sdk: &Rc<Sdk>) -> LuaResult<LuaTable> {
    let ctx = lua.create_table()?;

    for (method, names) in METHODS {
        let Some((namespace, verb)) = method.split_once('.') else {
            continue;
        };
        let table = match ctx.get::<Option<LuaTable>>(namespace)? {
            Some(table) => table,
            None => {
                let table = lua.create_table()?;
                ctx.set(namespace, table.clone())?;
                table
            }
        };

        let sdk = Rc::clone(sdk);
        let function = lua.create_function(move |lua, args: LuaMultiValue| {
            let params = positional_params(lua, names, args)?;
            let result = sdk.call(method, params).map_err(LuaError::external)?;
            to_lua(lua, &result)
        })?;
        table.set(verb, function)?;
    }

    let sdk = Rc::clone(sdk);
    let call = lua.create_function(move |lua, (method, params): (String, Option<LuaValue>)| {
        let params = match params.map(|p| from_lua(lua, p)).transpose()? {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(LuaError::runtime("params must be a table"));
            }
        };
        let result = sdk.call(&method, params).map_err(LuaError::external)?;
        to_lua(lua, &result)
    })?;
    ctx.set("call", call)?;

    Ok(ctx)
}

/// Installs the `deskflow` global. Each `connect()` shares one connection.
pub fn install(lua: &Lua, sdk: Sdk) -> Result<()> {
    let sdk = Rc::new(sdk);
    let module = lua.create_table()?;
    let connect = lua.create_function(move |lua, ()| build_ctx(lua, &sdk))?;
    module.set("connect", connect)?;
    lua.globals().set("deskflow", module)?;
    Ok(())
}

/// Executes `path` against the host named in `DESKFLOW_API_PORT`.
pub fn run_file(path: &Path) -> Result<()> {
    let code = std::fs::read_to_string(path)?;
    let lua = Lua::new();
    install(&lua, Sdk::from_env())?;
    lua.load(&code)
        .set_name(path.to_string_lossy())
        .exec()?;
    Ok(())
}

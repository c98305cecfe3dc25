//! Process boundary between the host and user scripts: the RPC wire format,
//! the capability server, the client SDK and the script runner.

pub mod capabilities;
pub mod client;
pub mod error;
pub mod lua_host;
pub mod protocol;
pub mod registry;
pub mod runner;
pub mod sdk;
pub mod server;
pub mod store;
pub mod ui;

pub use capabilities::{HostServices, build_registry, run_shell, shell_command};
pub use client::RpcClient;
pub use error::{BridgeError, Result};
pub use protocol::{API_PORT_ENV, RpcRequest, RpcResponse};
pub use registry::{MethodRegistry, Params};
pub use runner::{Interpreter, OutputSink, ScriptResult, ScriptRunner};
pub use sdk::Sdk;
pub use server::RpcServer;
pub use store::ScriptStore;
pub use ui::{UiAnswer, UiBridge, UiPrompt, UiRequest};

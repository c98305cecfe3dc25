use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0} not set, script must be started by the deskflow host")]
    PortNotSet(&'static str),

    #[error("invalid port in {var}: {value}")]
    InvalidPort { var: &'static str, value: String },

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered the call with an `error` field.
    #[error("{0}")]
    Remote(String),

    #[error("missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: &'static str, reason: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("ui is not available")]
    UiUnavailable,

    #[error("store error: {0}")]
    Store(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error(transparent)]
    Platform(#[from] deskflow_platform::PlatformError),

    #[error("lua error: {0}")]
    Lua(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<mlua::Error> for BridgeError {
    fn from(err: mlua::Error) -> Self {
        Self::Lua(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

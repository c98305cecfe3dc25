use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::protocol::{
    API_PORT_ENV, FrameBuffer, MAX_FRAME_BYTES, Outcome, RpcRequest, RpcResponse, encode_line,
};
use crate::ui::PROMPT_TIMEOUT;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Outlasts the longest prompt a handler may block on.
pub const READ_TIMEOUT: Duration = Duration::from_secs(PROMPT_TIMEOUT.as_secs() + 30);

struct Connection {
    stream: TcpStream,
    frames: FrameBuffer,
}

/// Persistent connection to the host's RPC server. Connects on first use
/// and reconnects once when the connection turns out to be dead. A call the
/// server already received is never sent twice because of a slow answer.
pub struct RpcClient {
    port: Option<u16>,
    read_timeout: Duration,
    connection: Option<Connection>,
    next_id: u64,
    /// Responses that arrived while waiting for a different id.
    pending: HashMap<u64, RpcResponse>,
}

impl RpcClient {
    /// Client whose port is read from the environment at the first call.
    pub fn from_env() -> Self {
        Self {
            port: None,
            read_timeout: READ_TIMEOUT,
            connection: None,
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    pub fn with_port(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::from_env()
        }
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn close(&mut self) {
        self.connection = None;
        self.pending.clear();
    }

    pub fn call(&mut self, method: &str, params: Map<String, Value>) -> Result<Value> {
        self.call_many(vec![(method.to_string(), params)])?
            .pop()
            .ok_or_else(|| BridgeError::Protocol("no response".into()))?
    }

    /// Sends every request before reading any response; results come back
    /// in request order, matched by id.
    pub fn call_many(
        &mut self,
        calls: Vec<(String, Map<String, Value>)>,
    ) -> Result<Vec<Result<Value>>> {
        let mut ids = Vec::with_capacity(calls.len());
        let mut payload = Vec::new();
        for (method, params) in calls {
            self.next_id += 1;
            ids.push(self.next_id);
            payload.extend(encode_line(&RpcRequest::new(self.next_id, method, params))?);
        }

        let responses = match self.exchange(&payload, &ids) {
            Err(BridgeError::Io(e)) if is_dead_connection(&e) => {
                log::debug!("rpc connection lost ({e}), reconnecting");
                self.close();
                self.exchange(&payload, &ids)
            }
            other => other,
        };
        // A timed out read leaves unread responses on the socket.
        let responses = responses.inspect_err(|_| self.close())?;

        Ok(responses
            .into_iter()
            .map(|response| match response.outcome {
                Outcome::Result(value) => Ok(value),
                Outcome::Error(message) => Err(BridgeError::Remote(message)),
            })
            .collect())
    }

    fn exchange(&mut self, payload: &[u8], ids: &[u64]) -> Result<Vec<RpcResponse>> {
        self.connect()?;
        if let Some(connection) = self.connection.as_mut() {
            connection.stream.write_all(payload)?;
        }
        ids.iter().map(|id| self.read_response(*id)).collect()
    }

    fn resolve_port(&mut self) -> Result<u16> {
        if let Some(port) = self.port {
            return Ok(port);
        }
        let raw = std::env::var(API_PORT_ENV).map_err(|_| BridgeError::PortNotSet(API_PORT_ENV))?;
        let port = raw
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|p| *p != 0)
            .ok_or(BridgeError::InvalidPort {
                var: API_PORT_ENV,
                value: raw,
            })?;
        self.port = Some(port);
        Ok(port)
    }

    fn connect(&mut self) -> Result<()> {
        if self.connection.is_some() {
            return Ok(());
        }
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, self.resolve_port()?));
        let stream = TcpStream::connect_timeout(&address, CONNECT_TIMEOUT)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_nodelay(true)?;
        self.connection = Some(Connection {
            stream,
            frames: FrameBuffer::new(),
        });
        Ok(())
    }

    fn read_response(&mut self, id: u64) -> Result<RpcResponse> {
        if let Some(response) = self.pending.remove(&id) {
            return Ok(response);
        }
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| BridgeError::Io(ErrorKind::NotConnected.into()))?;

        let mut chunk = [0u8; 64 * 1024];
        loop {
            while let Some(line) = connection.frames.next_line() {
                let response: RpcResponse = serde_json::from_slice(&line)?;
                if response.id == id {
                    return Ok(response);
                }
                self.pending.insert(response.id, response);
            }
            let read = connection.stream.read(&mut chunk)?;
            if read == 0 {
                return Err(BridgeError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "connection closed",
                )));
            }
            if !connection.frames.extend(&chunk[..read]) {
                return Err(BridgeError::Protocol(format!(
                    "response longer than {MAX_FRAME_BYTES} bytes"
                )));
            }
        }
    }
}

/// Failures that mean the server is gone, so resending is safe. Timeouts
/// are not among them: the request may still be running.
fn is_dead_connection(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::NotConnected
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_port_is_a_hard_error() {
        let mut client = RpcClient::from_env();
        if std::env::var(API_PORT_ENV).is_err() {
            assert!(matches!(
                client.call("clipboard.get_text", Map::new()),
                Err(BridgeError::PortNotSet(_))
            ));
        }
        assert!(!client.is_connected());
    }

    #[test]
    fn test_read_timeout_outlasts_prompts() {
        assert!(READ_TIMEOUT > PROMPT_TIMEOUT);
        assert!(!is_dead_connection(&ErrorKind::WouldBlock.into()));
        assert!(!is_dead_connection(&ErrorKind::TimedOut.into()));
        assert!(is_dead_connection(&ErrorKind::UnexpectedEof.into()));
    }

    #[test]
    fn test_refused_connection_is_reported() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut client = RpcClient::with_port(port);
        assert!(matches!(
            client.call("clipboard.get_text", Map::new()),
            Err(BridgeError::Io(_))
        ));
    }
}

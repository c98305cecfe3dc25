//! Line-delimited JSON frames exchanged between a sandboxed script and the
//! host: one request or response object per `\n`-terminated line.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Environment variable carrying the host's RPC port into script processes.
pub const API_PORT_ENV: &str = "DESKFLOW_API_PORT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params: Value::Object(params),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl RpcResponse {
    pub const fn result(id: u64, value: Value) -> Self {
        Self {
            id,
            outcome: Outcome::Result(value),
        }
    }

    pub fn error(id: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            outcome: Outcome::Error(message.into()),
        }
    }

    /// Answer to a line that is not a JSON request.
    pub fn invalid_json() -> Self {
        Self::error(0, "invalid json")
    }
}

/// Serializes `frame` followed by the line terminator.
pub fn encode_line<T: Serialize>(frame: &T) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    Ok(line)
}

/// Longest line a peer may send before it is dropped as garbage.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Accumulates bytes from a stream and yields complete lines. Partial lines
/// stay buffered until their terminator arrives.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    /// Length of the unterminated tail of `pending`.
    partial: usize,
    limit: usize,
    /// Skipping the rest of an oversized line.
    discarding: bool,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_FRAME_BYTES)
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            partial: 0,
            limit,
            discarding: false,
        }
    }

    /// Buffers `bytes`. Returns `false` when the current line grew past the
    /// limit; it is dropped up to and including its terminator.
    #[must_use]
    pub fn extend(&mut self, bytes: &[u8]) -> bool {
        let bytes = if self.discarding {
            let Some(end) = bytes.iter().position(|b| *b == b'\n') else {
                return true;
            };
            self.discarding = false;
            &bytes[end + 1..]
        } else {
            bytes
        };

        self.pending.extend_from_slice(bytes);
        match bytes.iter().rposition(|b| *b == b'\n') {
            Some(i) => self.partial = bytes.len() - i - 1,
            None => self.partial += bytes.len(),
        }
        if self.partial <= self.limit {
            return true;
        }

        self.pending.truncate(self.pending.len() - self.partial);
        self.partial = 0;
        self.discarding = true;
        false
    }

    /// Next complete, non-blank line without its terminator.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let end = self.pending.iter().position(|b| *b == b'\n')?;
            let mut line: Vec<u8> = self.pending.drain(..=end).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_wire_shape() {
        let ok = serde_json::to_value(RpcResponse::result(7, json!("hi"))).unwrap();
        assert_eq!(ok, json!({"id": 7, "result": "hi"}));

        let err = serde_json::to_value(RpcResponse::invalid_json()).unwrap();
        assert_eq!(err, json!({"id": 0, "error": "invalid json"}));
    }

    #[test]
    fn test_null_result_is_kept() {
        let line = String::from_utf8(encode_line(&RpcResponse::result(3, Value::Null)).unwrap())
            .unwrap();
        assert_eq!(line, "{\"id\":3,\"result\":null}\n");

        let parsed: RpcResponse = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(parsed.outcome, Outcome::Result(Value::Null));
    }

    #[test]
    fn test_request_defaults() {
        let request: RpcRequest = serde_json::from_str(r#"{"method":"clipboard.get_text"}"#).unwrap();
        assert_eq!(request.id, 0);
        assert_eq!(request.params, Value::Null);
    }

    #[test]
    fn test_frame_buffer_handles_split_lines() {
        let mut buffer = FrameBuffer::new();
        assert!(buffer.extend(b"{\"id\":1}\n{\"id\""));
        assert_eq!(buffer.next_line().as_deref(), Some(&b"{\"id\":1}"[..]));
        assert_eq!(buffer.next_line(), None);

        assert!(buffer.extend(b":2}\r\n\n  \n{\"id\":3}\n"));
        assert_eq!(buffer.next_line().as_deref(), Some(&b"{\"id\":2}"[..]));
        assert_eq!(buffer.next_line().as_deref(), Some(&b"{\"id\":3}"[..]));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn test_oversized_line_is_dropped() {
        let mut buffer = FrameBuffer::with_limit(8);
        assert!(buffer.extend(b"{\"id\":1}\n0123"));
        assert!(!buffer.extend(b"456789"));
        // The rest of the long line is skipped, later lines survive.
        assert!(buffer.extend(b"abcdef"));
        assert!(buffer.extend(b"gh\n{\"id\":2}\n"));

        assert_eq!(buffer.next_line().as_deref(), Some(&b"{\"id\":1}"[..]));
        assert_eq!(buffer.next_line().as_deref(), Some(&b"{\"id\":2}"[..]));
        assert_eq!(buffer.next_line(), None);
    }

    #[test]
    fn test_limit_counts_only_the_open_line() {
        let mut buffer = FrameBuffer::with_limit(8);
        assert!(buffer.extend(b"1234567\n1234567\n"));
        assert!(buffer.extend(b"12345678"));
        assert_eq!(buffer.next_line().as_deref(), Some(&b"1234567"[..]));
        assert_eq!(buffer.next_line().as_deref(), Some(&b"1234567"[..]));
        assert_eq!(buffer.next_line(), None);
    }
}

//! JSON-RPC message transport
//!
//! Messages are framed with a `Content-Length` header as LSP requires. The
//! transport is generic over its byte streams so tests can drive it through
//! an in-memory pipe; [`MessageTransport::stdio`] is what the binary uses.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::types::{LspError, LspResult};

/// JSON-RPC request message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: Value,
    /// Method name
    pub method: String,
    /// Request parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request
    pub fn new(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID, `null` when the request could not be read
    pub id: Value,
    /// Response result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Response error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a successful response
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new JSON-RPC error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Parse error (-32700)
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(-32700, message)
    }

    /// Invalid request (-32600)
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(-32600, message)
    }

    /// Method not found (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {}", method))
    }

    /// Invalid params (-32602)
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(-32602, message)
    }

    /// Internal error (-32603)
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(-32603, message)
    }

    /// Server not initialized (-32002)
    pub fn server_not_initialized() -> Self {
        Self::new(-32002, "Server not initialized")
    }
}

impl From<&LspError> for JsonRpcError {
    fn from(err: &LspError) -> Self {
        match err {
            LspError::ParseError(msg) => JsonRpcError::parse_error(msg.as_str()),
            LspError::InvalidRequest(msg) => JsonRpcError::invalid_request(msg.as_str()),
            LspError::MethodNotFound(method) => JsonRpcError::method_not_found(method),
            LspError::InvalidParams(msg) => JsonRpcError::invalid_params(msg.as_str()),
            LspError::ServerNotInitialized => JsonRpcError::server_not_initialized(),
            LspError::ConfigError(_) => {
                JsonRpcError::invalid_params(err.to_string()).with_data(serde_json::json!({ "retry": false }))
            }
            LspError::InternalError(_) | LspError::IoError(_) | LspError::SerializationError(_) => {
                JsonRpcError::internal_error(err.to_string())
            }
        }
    }
}

/// JSON-RPC notification message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Notification parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new JSON-RPC notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// LSP message (can be request, response, or notification)
#[derive(Debug, Clone)]
pub enum LspMessage {
    /// Request message
    Request(JsonRpcRequest),
    /// Response message
    Response(JsonRpcResponse),
    /// Notification message
    Notification(JsonRpcNotification),
}

impl LspMessage {
    /// Parse a message from JSON
    pub fn from_json(json: &str) -> LspResult<Self> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| LspError::ParseError(format!("Failed to parse JSON: {}", e)))?;

        if value.get("result").is_some() || value.get("error").is_some() {
            let response: JsonRpcResponse = serde_json::from_value(value)
                .map_err(|e| LspError::InvalidRequest(format!("Malformed response: {}", e)))?;
            Ok(LspMessage::Response(response))
        } else if value.get("id").is_some() && value.get("method").is_some() {
            let request: JsonRpcRequest = serde_json::from_value(value)
                .map_err(|e| LspError::InvalidRequest(format!("Malformed request: {}", e)))?;
            Ok(LspMessage::Request(request))
        } else if value.get("method").is_some() {
            let notification: JsonRpcNotification = serde_json::from_value(value)
                .map_err(|e| LspError::InvalidRequest(format!("Malformed notification: {}", e)))?;
            Ok(LspMessage::Notification(notification))
        } else {
            Err(LspError::InvalidRequest(
                "Message must be a request, response, or notification".to_string(),
            ))
        }
    }

    /// Serialize message to JSON
    pub fn to_json(&self) -> LspResult<String> {
        let result = match self {
            LspMessage::Request(req) => serde_json::to_string(req),
            LspMessage::Response(resp) => serde_json::to_string(resp),
            LspMessage::Notification(notif) => serde_json::to_string(notif),
        };
        result.map_err(|e| LspError::SerializationError(format!("Failed to serialize message: {}", e)))
    }
}

/// Largest message body accepted from a client
pub const MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Reading half of a [`MessageTransport`]
pub struct MessageReader<R> {
    reader: R,
}

impl<R: AsyncBufRead + Unpin> MessageReader<R> {
    /// Read the next message; `Ok(None)` once the input is closed
    ///
    /// A frame whose header cannot be trusted is an `IoError`, since the
    /// stream can no longer be resynchronized.
    pub async fn read_message(&mut self) -> LspResult<Option<LspMessage>> {
        let mut content_length: Option<usize> = None;
        let mut saw_header = false;

        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| LspError::IoError(format!("Failed to read header: {}", e)))?;

            if read == 0 {
                if saw_header {
                    return Err(LspError::IoError("Input closed inside a header".to_string()));
                }
                return Ok(None);
            }

            let line = line.trim();
            if line.is_empty() {
                if saw_header {
                    break;
                }
                continue;
            }
            saw_header = true;

            if let Some((key, value)) = line.split_once(':') {
                if key.trim().eq_ignore_ascii_case("Content-Length") {
                    let length = value
                        .trim()
                        .parse()
                        .map_err(|e| LspError::IoError(format!("Invalid Content-Length: {}", e)))?;
                    content_length = Some(length);
                }
            }
        }

        let content_length = content_length
            .ok_or_else(|| LspError::IoError("Missing Content-Length header".to_string()))?;
        if content_length > MAX_CONTENT_LENGTH {
            return Err(LspError::IoError(format!(
                "Content-Length {} exceeds the {} byte limit",
                content_length, MAX_CONTENT_LENGTH
            )));
        }

        let mut content = vec![0u8; content_length];
        self.reader
            .read_exact(&mut content)
            .await
            .map_err(|e| LspError::IoError(format!("Failed to read content: {}", e)))?;

        let json = String::from_utf8(content)
            .map_err(|e| LspError::ParseError(format!("Invalid UTF-8: {}", e)))?;

        LspMessage::from_json(&json).map(Some)
    }
}

/// Writing half of a [`MessageTransport`]
pub struct MessageWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Write one message and flush
    pub async fn write_message(&mut self, message: &LspMessage) -> LspResult<()> {
        let json = message.to_json()?;

        self.writer
            .write_all(format!("Content-Length: {}\r\n\r\n{}", json.len(), json).as_bytes())
            .await
            .map_err(|e| LspError::IoError(format!("Failed to write message: {}", e)))?;

        self.writer
            .flush()
            .await
            .map_err(|e| LspError::IoError(format!("Failed to flush output: {}", e)))?;

        Ok(())
    }
}

/// Content-Length framed transport over a pair of byte streams
pub struct MessageTransport<R, W> {
    reader: MessageReader<R>,
    writer: MessageWriter<W>,
}

impl MessageTransport<tokio::io::BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Transport over the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> MessageTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a transport
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: MessageReader { reader },
            writer: MessageWriter { writer },
        }
    }

    /// Read the next message; `Ok(None)` once the input is closed
    pub async fn read_message(&mut self) -> LspResult<Option<LspMessage>> {
        self.reader.read_message().await
    }

    /// Write one message and flush
    pub async fn write_message(&mut self, message: &LspMessage) -> LspResult<()> {
        self.writer.write_message(message).await
    }

    /// Separate the halves so reading and writing can proceed independently
    pub fn into_split(self) -> (MessageReader<R>, MessageWriter<W>) {
        (self.reader, self.writer)
    }
}

//! Core LSP types
//!
//! Error type, server state and the small subset of LSP structures the
//! handlers read from request params.

use serde::{Deserialize, Serialize};

/// Result type for LSP operations
pub type LspResult<T> = Result<T, LspError>;

/// LSP-specific error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum LspError {
    /// Parse error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Method not found
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Invalid parameters
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Request received before `initialize`
    #[error("Server not initialized")]
    ServerNotInitialized,

    /// `initializationOptions` rejected
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Server state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for `initialize`
    Uninitialized,
    /// Serving requests
    Initialized,
    /// `shutdown` received, waiting for `exit`
    ShuttingDown,
    /// Message loop finished
    Terminated,
}

/// Position in a document; `character` counts UTF-16 code units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Line number (0-based)
    pub line: u32,
    /// Character offset (0-based)
    pub character: u32,
}

impl Position {
    /// Create a new position
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// Range in a document, end exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Start position
    pub start: Position,
    /// End position
    pub end: Position,
}

impl Range {
    /// Create a new range
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Check if `position` lies inside the range
    pub fn contains(&self, position: Position) -> bool {
        self.start <= position && position < self.end
    }
}

/// Document reference in request params
#[derive(Debug, Clone, Deserialize)]
pub struct TextDocumentIdentifier {
    /// Document URI
    pub uri: String,
}

/// Document and cursor position
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentPositionParams {
    /// Document
    pub text_document: TextDocumentIdentifier,
    /// Cursor position
    pub position: Position,
}

/// How a completion request was triggered
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionContext {
    /// Character that triggered completion, if any
    #[serde(default)]
    pub trigger_character: Option<String>,
}

/// `textDocument/completion` params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionParams {
    /// Document
    pub text_document: TextDocumentIdentifier,
    /// Cursor position
    pub position: Position,
    /// Trigger context
    #[serde(default)]
    pub context: Option<CompletionContext>,
}

/// `textDocument/diagnostic` params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDiagnosticParams {
    /// Document
    pub text_document: TextDocumentIdentifier,
}

/// Opened document
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDocumentItem {
    /// Document URI
    pub uri: String,
    /// Full text
    pub text: String,
}

/// `textDocument/didOpen` params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidOpenParams {
    /// Opened document
    pub text_document: TextDocumentItem,
}

/// One full-text change
#[derive(Debug, Clone, Deserialize)]
pub struct ContentChange {
    /// New full text
    pub text: String,
}

/// `textDocument/didChange` params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidChangeParams {
    /// Changed document
    pub text_document: TextDocumentIdentifier,
    /// Changes, the last one holds the current text
    pub content_changes: Vec<ContentChange>,
}

/// `textDocument/didClose` params
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidCloseParams {
    /// Closed document
    pub text_document: TextDocumentIdentifier,
}

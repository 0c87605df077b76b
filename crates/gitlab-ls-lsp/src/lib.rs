//! gitlab-ls language server
//!
//! Serves completion of GitLab issues (`#`) and merge requests (`!`) over LSP,
//! answering every query from the in-memory index kept fresh by
//! `gitlab-ls-index`.
//!
//! # Modules
//!
//! - [`config`]: validates `initializationOptions`
//! - [`transport`]: Content-Length framed JSON-RPC
//! - [`documents`]: full-sync text store with UTF-16 positions
//! - [`completion`], [`hover`], [`diagnostics`], [`links`]: request handlers
//! - [`progress`]: work-done progress while the index first loads
//! - [`server`]: message loop and state machine

pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod documents;
pub mod hover;
pub mod links;
pub mod progress;
pub mod server;
pub mod transport;
pub mod types;

pub use config::{ConfigError, ServerConfig};
pub use server::{LspServer, ServerCapabilities};
pub use transport::{
    JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LspMessage, MessageReader, MessageTransport,
    MessageWriter, MAX_CONTENT_LENGTH,
};
pub use types::{LspError, LspResult, Position, Range, ServerState};

//! Harness for end-to-end tests: a client speaking LSP to a server that
//! runs its message loop over an in-memory pipe.

use std::time::Duration;

use gitlab_ls_lsp::{JsonRpcNotification, JsonRpcResponse, LspMessage, LspResult, LspServer, MessageTransport};
use serde_json::{json, Value};
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream, ReadHalf, Sink, WriteHalf};
use tokio::task::JoinHandle;

/// Upper bound on any single wait for the server
pub const WAIT: Duration = Duration::from_secs(10);

/// Server side of the pipe
pub type ServerTransport = MessageTransport<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>;

/// Client end of a running server
pub struct TestClient {
    reader: MessageTransport<BufReader<ReadHalf<DuplexStream>>, Sink>,
    writer: WriteHalf<DuplexStream>,
    next_id: i64,
    notifications: Vec<JsonRpcNotification>,
    handle: JoinHandle<LspResult<i32>>,
}

impl TestClient {
    /// Spawn the server built by `make` and connect to it
    pub fn spawn<F>(make: F) -> Self
    where
        F: FnOnce(ServerTransport) -> LspServer<BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>>,
    {
        let (client_io, server_io) = tokio::io::duplex(1 << 16);
        let (server_read, server_write) = tokio::io::split(server_io);
        let mut server = make(MessageTransport::new(BufReader::new(server_read), server_write));
        let handle = tokio::spawn(async move { server.run().await });

        let (client_read, client_write) = tokio::io::split(client_io);
        Self {
            reader: MessageTransport::new(BufReader::new(client_read), tokio::io::sink()),
            writer: client_write,
            next_id: 0,
            notifications: Vec::new(),
            handle,
        }
    }

    /// Spawn a server that talks to the GitLab instance named in its configuration
    pub fn spawn_default() -> Self {
        Self::spawn(LspServer::new)
    }

    async fn send(&mut self, message: Value) {
        let body = message.to_string();
        let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
        self.writer.write_all(frame.as_bytes()).await.expect("server pipe closed");
        self.writer.flush().await.expect("server pipe closed");
    }

    /// Send a request and wait for its response
    pub async fn request(&mut self, method: &str, params: Value) -> JsonRpcResponse {
        self.next_id += 1;
        let id = json!(self.next_id);
        self.send(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;

        loop {
            let message = tokio::time::timeout(WAIT, self.reader.read_message())
                .await
                .expect("timed out waiting for the server")
                .expect("unreadable server message");
            match message {
                Some(LspMessage::Response(resp)) if resp.id == id => return resp,
                Some(LspMessage::Notification(notif)) => self.notifications.push(notif),
                // Progress token requests need no answer here
                Some(LspMessage::Request(req)) => assert_eq!(req.method, "window/workDoneProgress/create"),
                Some(other) => panic!("unexpected message {:?}", other),
                None => panic!("server closed the pipe"),
            }
        }
    }

    /// Send a notification
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    /// Notifications received while waiting for responses
    pub fn notifications(&self) -> &[JsonRpcNotification] {
        &self.notifications
    }

    /// `initialize` plus `initialized` with the given options
    pub async fn initialize(&mut self, options: Value) -> JsonRpcResponse {
        let response = self
            .request(
                "initialize",
                json!({"processId": null, "capabilities": {}, "initializationOptions": options}),
            )
            .await;
        self.notify("initialized", json!({})).await;
        response
    }

    /// Open a document
    pub async fn open(&mut self, uri: &str, text: &str) {
        self.notify(
            "textDocument/didOpen",
            json!({"textDocument": {"uri": uri, "languageId": "markdown", "version": 1, "text": text}}),
        )
        .await;
    }

    /// Completion labels at a position
    pub async fn complete(&mut self, uri: &str, line: u32, character: u32) -> Vec<String> {
        let response = self
            .request(
                "textDocument/completion",
                json!({"textDocument": {"uri": uri}, "position": {"line": line, "character": character}}),
            )
            .await;
        let result = response.result.expect("completion failed");
        result["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i["label"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Completion labels once the index has caught up
    pub async fn complete_eventually(&mut self, uri: &str, line: u32, character: u32) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            let labels = self.complete(uri, line, character).await;
            if !labels.is_empty() {
                return labels;
            }
            assert!(tokio::time::Instant::now() < deadline, "completion stayed empty");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// `shutdown` then `exit`; returns the server's exit status
    pub async fn shutdown(mut self) -> i32 {
        let response = self.request("shutdown", Value::Null).await;
        assert!(response.error.is_none(), "shutdown failed: {:?}", response.error);
        self.notify("exit", Value::Null).await;
        self.wait().await
    }

    /// Wait for the server loop to end
    pub async fn wait(self) -> i32 {
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server loop failed")
    }
}

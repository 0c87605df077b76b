//! LSP Server implementation
//!
//! Handles the message loop, the `Uninitialized -> Initialized ->
//! ShuttingDown -> Terminated` state machine and request routing. Messages
//! are processed one at a time in arrival order; every request is answered
//! from in-memory state. A reader task owns the input stream so the loop can
//! also wake up for refresh events while no message is pending.

use std::sync::Arc;

use gitlab_ls_gitlab::{GitLabClient, ItemSource};
use gitlab_ls_index::{Catalog, IndexCache, InitialFetch, RefreshScheduler, RefreshSettings};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    completion::{self, CompletionToken},
    config::ServerConfig,
    diagnostics, hover,
    documents::DocumentStore,
    links::LinkMatcher,
    progress::LoadProgress,
    transport::{
        JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, LspMessage, MessageReader, MessageTransport,
        MessageWriter,
    },
    types::{
        CompletionParams, DidChangeParams, DidCloseParams, DidOpenParams, DocumentDiagnosticParams, LspError,
        LspResult, ServerState, TextDocumentPositionParams,
    },
};

/// `MessageType.Error` of `window/showMessage`
const MESSAGE_TYPE_ERROR: u8 = 1;

/// Messages read ahead of the loop
const INBOX_CAPACITY: usize = 16;

type Incoming = LspResult<Option<LspMessage>>;

/// What woke the message loop
enum Wake {
    Message(Option<Incoming>),
    InitialFetch(Option<InitialFetch>),
}

/// Server capabilities
#[derive(Debug, Clone)]
pub struct ServerCapabilities {
    /// Text document sync kind
    pub text_document_sync: u32,
    /// Completion trigger characters
    pub trigger_characters: Vec<String>,
    /// Hover capability
    pub hover_provider: bool,
    /// Pull diagnostics capability
    pub diagnostic_provider: bool,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            text_document_sync: 1, // Full sync
            trigger_characters: vec!["#".to_string(), "!".to_string()],
            hover_provider: true,
            diagnostic_provider: true,
        }
    }
}

impl ServerCapabilities {
    /// Convert to JSON
    pub fn to_json(&self) -> Value {
        let mut capabilities = json!({
            "textDocumentSync": self.text_document_sync,
            "completionProvider": {
                "resolveProvider": true,
                "triggerCharacters": self.trigger_characters,
            },
            "hoverProvider": self.hover_provider,
        });
        if self.diagnostic_provider {
            capabilities["diagnosticProvider"] = json!({
                "identifier": "gitlab-ls",
                "interFileDependencies": false,
                "workspaceDiagnostics": false,
            });
        }
        capabilities
    }
}

/// State that exists once `initialize` succeeded
struct Session {
    links: LinkMatcher,
    scheduler: RefreshScheduler,
}

impl Session {
    fn catalog(&self) -> &Arc<Catalog> {
        self.scheduler.catalog()
    }
}

/// gitlab-ls language server
pub struct LspServer<R, W> {
    state: ServerState,
    capabilities: ServerCapabilities,
    reader: Option<MessageReader<R>>,
    writer: MessageWriter<W>,
    documents: DocumentStore,
    source: Option<Arc<dyn ItemSource>>,
    session: Option<Session>,
    progress: Option<LoadProgress>,
    initial_fetches: Option<mpsc::UnboundedReceiver<InitialFetch>>,
    outbox: Vec<LspMessage>,
    next_request_id: u64,
    exit_code: Option<i32>,
}

impl<R, W> LspServer<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a server that fetches from the GitLab instance named in its configuration
    pub fn new(transport: MessageTransport<R, W>) -> Self {
        let (reader, writer) = transport.into_split();
        Self {
            state: ServerState::Uninitialized,
            capabilities: ServerCapabilities::default(),
            reader: Some(reader),
            writer,
            documents: DocumentStore::new(),
            source: None,
            session: None,
            progress: None,
            initial_fetches: None,
            outbox: Vec::new(),
            next_request_id: 0,
            exit_code: None,
        }
    }

    /// Create a server that fetches from `source` instead of GitLab
    pub fn with_source(transport: MessageTransport<R, W>, source: Arc<dyn ItemSource>) -> Self {
        let mut server = Self::new(transport);
        server.source = Some(source);
        server
    }

    /// Current state
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Advertised capabilities
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Index catalog, once initialized
    pub fn catalog(&self) -> Option<&Arc<Catalog>> {
        self.session.as_ref().map(Session::catalog)
    }

    /// Open documents
    pub fn documents(&self) -> &DocumentStore {
        &self.documents
    }

    /// Process exit status: 0 only after `shutdown` then `exit`
    pub fn exit_code(&self) -> i32 {
        self.exit_code.unwrap_or(1)
    }

    fn notify(&mut self, notification: JsonRpcNotification) {
        self.outbox.push(LspMessage::Notification(notification));
    }

    fn request_client(&mut self, build: impl FnOnce(Value) -> JsonRpcRequest) {
        self.next_request_id += 1;
        let id = json!(format!("gitlab-ls-{}", self.next_request_id));
        self.outbox.push(LspMessage::Request(build(id)));
    }

    fn session(&self) -> LspResult<&Session> {
        self.session
            .as_ref()
            .ok_or(LspError::ServerNotInitialized)
    }

    /// Handle initialize request
    pub async fn handle_initialize(&mut self, params: Value) -> LspResult<Value> {
        if self.state != ServerState::Uninitialized {
            return Err(LspError::InvalidRequest("Server is already initialized".to_string()));
        }

        info!("Initializing gitlab-ls");
        let config = match ServerConfig::resolve(params.get("initializationOptions")) {
            Ok(config) => config,
            Err(e) => {
                error!("Rejecting configuration: {}", e);
                self.notify(JsonRpcNotification::new(
                    "window/showMessage",
                    Some(json!({
                        "type": MESSAGE_TYPE_ERROR,
                        "message": format!("gitlab-ls: {}", e),
                    })),
                ));
                self.terminate();
                return Err(LspError::ConfigError(e.to_string()));
            }
        };
        debug!("Resolved configuration: {:?}", config);

        let source = match &self.source {
            Some(source) => Arc::clone(source),
            None => {
                let client = GitLabClient::new(&config.url, &config.private_token)
                    .map_err(|e| LspError::InternalError(format!("Failed to create GitLab client: {}", e)))?;
                Arc::new(client) as Arc<dyn ItemSource>
            }
        };
        let links = LinkMatcher::new(config.base_url())?;

        let catalog = Arc::new(Catalog::new(config.projects.iter().cloned()));
        let settings = RefreshSettings::default().with_interval(config.refresh_interval);
        let mut scheduler = RefreshScheduler::new(Arc::clone(&catalog), source, settings);

        let progress = client_supports_progress(&params).then(|| LoadProgress::new(catalog.projects().len()));
        if let Some(progress) = &progress {
            self.request_client(LoadProgress::create_request);
            self.notify(progress.begin());
        }

        if let Some(path) = &config.cache_path {
            let cache = Arc::new(IndexCache::new(path));
            let seeded = cache.seed(&catalog).await;
            if let Some(progress) = &progress {
                for (project, count) in &seeded {
                    self.notify(progress.seeded(project, *count));
                }
            }
            scheduler = scheduler.with_cache(cache);
        }

        if progress.is_some() {
            let (events, initial_fetches) = mpsc::unbounded_channel();
            scheduler = scheduler.with_events(events);
            self.initial_fetches = Some(initial_fetches);
        }
        scheduler.start();

        self.progress = progress;
        self.session = Some(Session { links, scheduler });
        self.state = ServerState::Initialized;
        info!(
            "gitlab-ls initialized for {} project(s) on {}",
            config.projects.len(),
            config.base_url()
        );

        Ok(json!({
            "capabilities": self.capabilities.to_json(),
            "serverInfo": {
                "name": "gitlab-ls",
                "version": env!("CARGO_PKG_VERSION"),
            }
        }))
    }

    /// Handle shutdown request
    pub fn handle_shutdown(&mut self) -> LspResult<Value> {
        info!("Shutdown request received");
        if let Some(session) = self.session.as_mut() {
            session.scheduler.shutdown();
        }
        if let Some(end) = self.progress.take().and_then(|mut progress| progress.interrupt()) {
            self.notify(end);
        }
        self.initial_fetches = None;
        self.state = ServerState::ShuttingDown;
        Ok(Value::Null)
    }

    /// Handle exit notification
    pub fn handle_exit(&mut self) {
        info!("Exit notification received in state {:?}", self.state);
        self.terminate();
    }

    fn terminate(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.scheduler.shutdown();
        }
        self.progress = None;
        self.initial_fetches = None;
        if self.exit_code.is_none() {
            self.exit_code = Some(if self.state == ServerState::ShuttingDown { 0 } else { 1 });
        }
        self.state = ServerState::Terminated;
    }

    /// Handle completion request
    pub fn handle_completion(&self, params: Value) -> LspResult<Value> {
        let session = self.session()?;
        let params: CompletionParams = parse_params(params)?;

        let typed = self
            .documents
            .line_before(&params.text_document.uri, params.position)
            .and_then(CompletionToken::from_line);
        let token = typed.or_else(|| {
            params
                .context
                .as_ref()
                .and_then(|ctx| ctx.trigger_character.as_deref())
                .and_then(CompletionToken::from_trigger)
        });

        debug!(
            "Completion at {}:{}:{} token={:?}",
            params.text_document.uri, params.position.line, params.position.character, token
        );
        Ok(completion::completion_list(&session.catalog().view(), token.as_ref()))
    }

    /// Handle completion item resolve request
    pub fn handle_completion_resolve(&self, params: Value) -> LspResult<Value> {
        let session = self.session()?;
        if !params.is_object() {
            return Err(LspError::InvalidParams("Expected a completion item".to_string()));
        }
        Ok(completion::resolve(&session.catalog().view(), params))
    }

    /// Handle hover request
    pub fn handle_hover(&self, params: Value) -> LspResult<Value> {
        let session = self.session()?;
        let params: TextDocumentPositionParams = parse_params(params)?;

        let Some(text) = self.documents.get(&params.text_document.uri) else {
            return Ok(Value::Null);
        };
        Ok(hover::hover(&session.catalog().view(), &session.links, text, params.position))
    }

    /// Handle pull diagnostics request
    pub fn handle_diagnostic(&self, params: Value) -> LspResult<Value> {
        let session = self.session()?;
        let params: DocumentDiagnosticParams = parse_params(params)?;

        let items = match self.documents.get(&params.text_document.uri) {
            Some(text) => diagnostics::diagnostics(&session.catalog().view(), &session.links, text),
            None => Vec::new(),
        };
        Ok(diagnostics::full_report(items))
    }

    /// Handle didOpen notification
    pub fn handle_did_open(&mut self, params: Value) -> LspResult<()> {
        let params: DidOpenParams = parse_params(params)?;
        debug!(
            "Document opened: uri={}, size={} bytes",
            params.text_document.uri,
            params.text_document.text.len()
        );
        self.documents.set(params.text_document.uri, params.text_document.text);
        Ok(())
    }

    /// Handle didChange notification
    pub fn handle_did_change(&mut self, params: Value) -> LspResult<()> {
        let params: DidChangeParams = parse_params(params)?;
        // Full sync: the last change carries the whole text
        if let Some(change) = params.content_changes.into_iter().last() {
            self.documents.set(params.text_document.uri, change.text);
        }
        Ok(())
    }

    /// Handle didClose notification
    pub fn handle_did_close(&mut self, params: Value) -> LspResult<()> {
        let params: DidCloseParams = parse_params(params)?;
        debug!("Document closed: uri={}", params.text_document.uri);
        self.documents.remove(&params.text_document.uri);
        Ok(())
    }

    async fn handle_request(&mut self, req: JsonRpcRequest) -> LspResult<Value> {
        match self.state {
            ServerState::Uninitialized if req.method != "initialize" => {
                return Err(LspError::ServerNotInitialized)
            }
            ServerState::ShuttingDown | ServerState::Terminated => {
                return Err(LspError::InvalidRequest("Server is shutting down".to_string()))
            }
            _ => {}
        }

        let params = req.params.unwrap_or(Value::Null);
        match req.method.as_str() {
            "initialize" => self.handle_initialize(params).await,
            "shutdown" => self.handle_shutdown(),
            "textDocument/completion" => self.handle_completion(params),
            "completionItem/resolve" => self.handle_completion_resolve(params),
            "textDocument/hover" => self.handle_hover(params),
            "textDocument/diagnostic" => self.handle_diagnostic(params),
            _ => Err(LspError::MethodNotFound(req.method)),
        }
    }

    fn handle_notification(&mut self, notif: JsonRpcNotification) -> LspResult<()> {
        if notif.method == "exit" {
            self.handle_exit();
            return Ok(());
        }
        if self.state != ServerState::Initialized {
            debug!("Ignoring {} in state {:?}", notif.method, self.state);
            return Ok(());
        }

        let params = notif.params.unwrap_or(Value::Null);
        match notif.method.as_str() {
            "initialized" => {
                info!("Client confirmed initialization");
                Ok(())
            }
            "textDocument/didOpen" => self.handle_did_open(params),
            "textDocument/didChange" => self.handle_did_change(params),
            "textDocument/didClose" => self.handle_did_close(params),
            _ => {
                debug!("Ignoring notification {}", notif.method);
                Ok(())
            }
        }
    }

    /// Process one message; requests get exactly one response
    async fn process_message(&mut self, message: LspMessage) {
        match message {
            LspMessage::Request(req) => {
                debug!("Received request: method={}, id={}", req.method, req.id);
                let id = req.id.clone();
                let response = match self.handle_request(req).await {
                    Ok(result) => JsonRpcResponse::success(id, result),
                    Err(err) => {
                        warn!("Error processing request {}: {}", id, err);
                        JsonRpcResponse::error(id, JsonRpcError::from(&err))
                    }
                };
                self.send(LspMessage::Response(response)).await;
            }
            LspMessage::Notification(notif) => {
                debug!("Received notification: method={}", notif.method);
                if let Err(err) = self.handle_notification(notif) {
                    warn!("Error processing notification: {}", err);
                }
            }
            LspMessage::Response(resp) => {
                debug!("Ignoring client response: id={}", resp.id);
            }
        }

        self.flush_outbox().await;
    }

    /// Feed a project's first fetch into the load progress
    fn handle_initial_fetch(&mut self, fetch: Option<InitialFetch>) {
        let Some(progress) = self.progress.as_mut() else {
            self.initial_fetches = None;
            return;
        };

        let notifications = match fetch {
            Some(fetch) => {
                debug!("Initial fetch settled: project={}", fetch.project);
                progress.settle(&fetch)
            }
            // Every refresh cycle is gone
            None => progress.interrupt().into_iter().collect(),
        };
        if progress.is_finished() {
            self.progress = None;
            self.initial_fetches = None;
        }
        for notification in notifications {
            self.notify(notification);
        }
    }

    async fn flush_outbox(&mut self) {
        for message in std::mem::take(&mut self.outbox) {
            self.send(message).await;
        }
    }

    async fn send(&mut self, message: LspMessage) {
        if let Err(e) = self.writer.write_message(&message).await {
            error!("Failed to send message: {}", e);
        }
    }
}

impl<R, W> LspServer<R, W>
where
    R: AsyncBufRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    /// Run the message loop until `exit` or end of input; returns the exit status
    pub async fn run(&mut self) -> LspResult<i32> {
        let Some(mut reader) = self.reader.take() else {
            return Err(LspError::InternalError("message loop already ran".to_string()));
        };
        info!("gitlab-ls started");

        let (inbox_tx, mut inbox) = mpsc::channel::<Incoming>(INBOX_CAPACITY);
        let reading = tokio::spawn(async move {
            loop {
                let incoming = reader.read_message().await;
                let last = matches!(incoming, Ok(None) | Err(LspError::IoError(_)));
                if inbox_tx.send(incoming).await.is_err() || last {
                    break;
                }
            }
        });

        while self.state != ServerState::Terminated {
            let wake = tokio::select! {
                biased;
                incoming = inbox.recv() => Wake::Message(incoming),
                fetch = next_fetch(&mut self.initial_fetches) => Wake::InitialFetch(fetch),
            };

            match wake {
                Wake::Message(Some(Ok(Some(message)))) => self.process_message(message).await,
                Wake::Message(None) | Wake::Message(Some(Ok(None))) => {
                    info!("Input closed");
                    self.terminate();
                }
                Wake::Message(Some(Err(LspError::IoError(e)))) => {
                    error!("Failed to read message: {}", e);
                    self.terminate();
                }
                Wake::Message(Some(Err(err))) => {
                    warn!("Discarding unreadable message: {}", err);
                    let response = JsonRpcResponse::error(Value::Null, JsonRpcError::from(&err));
                    self.send(LspMessage::Response(response)).await;
                }
                Wake::InitialFetch(fetch) => {
                    self.handle_initial_fetch(fetch);
                    self.flush_outbox().await;
                }
            }
        }

        reading.abort();
        info!("gitlab-ls stopped with status {}", self.exit_code());
        Ok(self.exit_code())
    }
}

async fn next_fetch(fetches: &mut Option<mpsc::UnboundedReceiver<InitialFetch>>) -> Option<InitialFetch> {
    match fetches {
        Some(fetches) => fetches.recv().await,
        None => std::future::pending().await,
    }
}

fn client_supports_progress(params: &Value) -> bool {
    params
        .pointer("/capabilities/window/workDoneProgress")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn parse_params<T: DeserializeOwned>(params: Value) -> LspResult<T> {
    serde_json::from_value(params).map_err(|e| LspError::InvalidParams(e.to_string()))
}

//! Work-done progress for the initial index load
//!
//! One progress token covers every configured project. It begins right after
//! `initialize`, reports each project as its cache seed or first fetch
//! completes, and ends once every project has settled.

use std::collections::HashSet;

use gitlab_ls_gitlab::ProjectPath;
use gitlab_ls_index::InitialFetch;
use serde_json::{json, Value};

use crate::transport::{JsonRpcNotification, JsonRpcRequest};

/// Token of the initial load
pub const LOAD_TOKEN: &str = "gitlab-ls/initial-load";

/// Progress of the first fetch across all projects
#[derive(Debug)]
pub struct LoadProgress {
    total: usize,
    settled: HashSet<ProjectPath>,
    finished: bool,
}

impl LoadProgress {
    /// Track `total` projects
    pub fn new(total: usize) -> Self {
        Self {
            total,
            settled: HashSet::new(),
            finished: false,
        }
    }

    /// `window/workDoneProgress/create` asking the client for the token
    pub fn create_request(id: Value) -> JsonRpcRequest {
        JsonRpcRequest::new(id, "window/workDoneProgress/create", Some(json!({ "token": LOAD_TOKEN })))
    }

    /// Begin notification
    pub fn begin(&self) -> JsonRpcNotification {
        notification(json!({
            "kind": "begin",
            "title": "Indexing GitLab projects",
            "message": format!("Loading {} project(s)", self.total),
            "cancellable": false,
            "percentage": 0,
        }))
    }

    /// Report a project answered from the cache before its first fetch
    pub fn seeded(&self, project: &ProjectPath, items: usize) -> JsonRpcNotification {
        self.report(format!("Loaded {} cached items for {}", items, project))
    }

    /// Record a first fetch; returns the report, plus the end once all projects settled
    pub fn settle(&mut self, fetch: &InitialFetch) -> Vec<JsonRpcNotification> {
        if self.finished || !self.settled.insert(fetch.project.clone()) {
            return Vec::new();
        }

        let message = match &fetch.outcome {
            Ok(count) => format!("Indexed {} items for {}", count, fetch.project),
            Err(err) => format!("Could not index {}: {}", fetch.project, err),
        };
        let mut notifications = vec![self.report(message)];

        if self.settled.len() >= self.total {
            self.finished = true;
            notifications.push(end("All projects indexed"));
        }
        notifications
    }

    /// End early, e.g. on shutdown; `None` if already ended
    pub fn interrupt(&mut self) -> Option<JsonRpcNotification> {
        if self.finished {
            return None;
        }
        self.finished = true;
        Some(end("Indexing stopped"))
    }

    /// Whether the end notification was produced
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn percentage(&self) -> usize {
        self.settled.len() * 100 / self.total.max(1)
    }

    fn report(&self, message: String) -> JsonRpcNotification {
        notification(json!({
            "kind": "report",
            "message": message,
            "percentage": self.percentage(),
        }))
    }
}

fn end(message: &str) -> JsonRpcNotification {
    notification(json!({ "kind": "end", "message": message }))
}

fn notification(value: Value) -> JsonRpcNotification {
    JsonRpcNotification::new("$/progress", Some(json!({ "token": LOAD_TOKEN, "value": value })))
}

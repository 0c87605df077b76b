//! Per-project item store
//!
//! A [`ProjectIndex`] always holds exactly one completed fetch generation.
//! Refreshes build a new [`Generation`] off to the side and swap it in, so a
//! reader holding a snapshot never sees old and new items mixed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gitlab_ls_gitlab::{FetchError, ItemKind, ProjectPath, TrackedItem};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

/// Refresh state of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    /// No fetch has completed yet
    Pending,
    /// A fetch is in flight or waiting out a backoff delay
    Refreshing,
    /// The last fetch succeeded
    Fresh,
    /// The token or project was rejected; no further fetches
    Failed,
}

/// One complete, internally consistent set of a project's items
#[derive(Debug, Default)]
pub struct Generation {
    items: BTreeMap<(ItemKind, u64), Arc<TrackedItem>>,
    fetched_at: Option<DateTime<Utc>>,
}

impl Generation {
    /// Generation with no items that was never fetched
    pub fn empty() -> Self {
        Self::default()
    }

    fn build(project: &ProjectPath, items: Vec<TrackedItem>, fetched_at: DateTime<Utc>) -> Self {
        let mut map = BTreeMap::new();
        for item in items {
            if &item.project != project {
                debug!(
                    "Dropping {}{} owned by {} from {}'s generation",
                    item.prefix(),
                    item.number,
                    item.project,
                    project
                );
                continue;
            }
            // Last occurrence wins when a listing repeats an item
            map.insert((item.kind, item.number), Arc::new(item));
        }

        Self {
            items: map,
            fetched_at: Some(fetched_at),
        }
    }

    /// When the items were fetched, `None` for the initial empty generation
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Look up one item
    pub fn get(&self, kind: ItemKind, number: u64) -> Option<&Arc<TrackedItem>> {
        self.items.get(&(kind, number))
    }

    /// All items, issues first, each kind in ascending number order
    pub fn items(&self) -> impl Iterator<Item = &Arc<TrackedItem>> {
        self.items.values()
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the generation has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Refresh bookkeeping of a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStatus {
    /// Current refresh state
    pub state: RefreshState,
    /// Time of the last successful fetch
    pub last_success: Option<DateTime<Utc>>,
    /// Description of the last failure
    pub last_error: Option<String>,
    /// Failures since the last success
    pub consecutive_failures: u32,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        Self {
            state: RefreshState::Pending,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Items and refresh status of one configured project
#[derive(Debug)]
pub struct ProjectIndex {
    path: ProjectPath,
    generation: RwLock<Arc<Generation>>,
    status: RwLock<ProjectStatus>,
}

impl ProjectIndex {
    /// Create an empty, pending index
    pub fn new(path: ProjectPath) -> Self {
        Self {
            path,
            generation: RwLock::new(Arc::new(Generation::empty())),
            status: RwLock::new(ProjectStatus::default()),
        }
    }

    /// Project this index belongs to
    pub fn path(&self) -> &ProjectPath {
        &self.path
    }

    /// Swap in a new generation fetched now
    pub fn replace(&self, items: Vec<TrackedItem>) -> Arc<Generation> {
        self.replace_at(items, Utc::now())
    }

    /// Swap in a new generation fetched at `fetched_at`
    pub fn replace_at(&self, items: Vec<TrackedItem>, fetched_at: DateTime<Utc>) -> Arc<Generation> {
        let generation = Arc::new(Generation::build(&self.path, items, fetched_at));
        *self.generation.write() = Arc::clone(&generation);
        generation
    }

    /// Current generation
    pub fn snapshot(&self) -> Arc<Generation> {
        Arc::clone(&self.generation.read())
    }

    /// Drop every item
    pub fn clear(&self) {
        *self.generation.write() = Arc::new(Generation::empty());
    }

    /// Current refresh status
    pub fn status(&self) -> ProjectStatus {
        self.status.read().clone()
    }

    /// Current refresh state
    pub fn state(&self) -> RefreshState {
        self.status.read().state
    }

    /// A fetch is starting
    pub fn mark_refreshing(&self) {
        self.status.write().state = RefreshState::Refreshing;
    }

    /// A fetch succeeded and its generation is published
    pub fn mark_fresh(&self, at: DateTime<Utc>) {
        let mut status = self.status.write();
        status.state = RefreshState::Fresh;
        status.last_success = Some(at);
        status.last_error = None;
        status.consecutive_failures = 0;
    }

    /// A fetch failed and will be retried
    pub fn mark_retrying(&self, error: &FetchError) {
        let mut status = self.status.write();
        status.state = RefreshState::Refreshing;
        status.last_error = Some(error.to_string());
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
    }

    /// A fetch failed for good
    pub fn mark_failed(&self, error: &FetchError) {
        let mut status = self.status.write();
        status.state = RefreshState::Failed;
        status.last_error = Some(error.to_string());
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
    }
}

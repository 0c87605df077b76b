//! Configured projects plus the completion index merged from them

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gitlab_ls_gitlab::{ProjectPath, TrackedItem};
use parking_lot::Mutex;
use tracing::debug;

use crate::completion::{CompletionIndex, CompletionView};
use crate::project::ProjectIndex;

/// Every configured project's index and the merged completion index
#[derive(Debug)]
pub struct Catalog {
    projects: Vec<Arc<ProjectIndex>>,
    completions: CompletionIndex,
    // Held across replace + rebuild so views are published in order
    publish: Mutex<()>,
}

impl Catalog {
    /// Create a catalog with one pending index per project, in the given order
    pub fn new(paths: impl IntoIterator<Item = ProjectPath>) -> Self {
        Self {
            projects: paths
                .into_iter()
                .map(|path| Arc::new(ProjectIndex::new(path)))
                .collect(),
            completions: CompletionIndex::new(),
            publish: Mutex::new(()),
        }
    }

    /// All project indexes
    pub fn projects(&self) -> &[Arc<ProjectIndex>] {
        &self.projects
    }

    /// Look up a project's index
    pub fn project(&self, path: &ProjectPath) -> Option<&Arc<ProjectIndex>> {
        self.projects.iter().find(|p| p.path() == path)
    }

    /// Merged completion index
    pub fn completions(&self) -> &CompletionIndex {
        &self.completions
    }

    /// Current merged view
    pub fn view(&self) -> Arc<CompletionView> {
        self.completions.snapshot()
    }

    /// Publish a freshly fetched generation for `project`
    pub fn apply(&self, project: &ProjectIndex, items: Vec<TrackedItem>) -> Arc<CompletionView> {
        let _guard = self.publish.lock();
        let generation = project.replace(items);
        debug!(
            "Applied generation of {} items for {}",
            generation.len(),
            project.path()
        );
        self.completions.rebuild(&self.projects)
    }

    /// Publish a generation fetched earlier, e.g. loaded from the cache
    pub fn seed(
        &self,
        project: &ProjectIndex,
        items: Vec<TrackedItem>,
        fetched_at: DateTime<Utc>,
    ) -> Arc<CompletionView> {
        let _guard = self.publish.lock();
        project.replace_at(items, fetched_at);
        self.completions.rebuild(&self.projects)
    }

    /// Drop a project's items from the catalog
    pub fn clear(&self, project: &ProjectIndex) -> Arc<CompletionView> {
        let _guard = self.publish.lock();
        project.clear();
        self.completions.rebuild(&self.projects)
    }
}

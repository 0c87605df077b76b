//! Per-project refresh cycles
//!
//! Each configured project gets its own task that fetches both item kinds,
//! publishes the generation, then sleeps the refresh interval. Transient
//! failures are retried with backoff forever; a rejected token or unknown
//! project ends that project's task and nothing else.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use gitlab_ls_gitlab::{FetchError, ItemKind, ItemSource, ProjectPath, TrackedItem};
use gitlab_ls_http::BackoffPolicy;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::IndexCache;
use crate::catalog::Catalog;
use crate::project::ProjectIndex;

/// Time between successful refreshes of a project
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

/// Refresh timing
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// Sleep after a successful refresh
    pub interval: Duration,
    /// Delays between failed attempts
    pub backoff: BackoffPolicy,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RefreshSettings {
    /// Set the refresh interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the backoff policy
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Fetch issues and merge requests of a project concurrently
///
/// Either kind failing fails the whole generation.
pub async fn fetch_generation(
    source: &dyn ItemSource,
    project: &ProjectPath,
) -> Result<Vec<TrackedItem>, FetchError> {
    let (mut issues, merge_requests) = tokio::try_join!(
        source.fetch_items(project, ItemKind::Issue),
        source.fetch_items(project, ItemKind::MergeRequest),
    )?;
    issues.extend(merge_requests);
    Ok(issues)
}

/// Outcome of a project's first fetch attempt, reported once per project
#[derive(Debug, Clone, PartialEq)]
pub struct InitialFetch {
    /// Project that was fetched
    pub project: ProjectPath,
    /// Number of items indexed, or why the attempt failed
    pub outcome: Result<usize, FetchError>,
}

/// Owns the refresh task of every project in a catalog
pub struct RefreshScheduler {
    catalog: Arc<Catalog>,
    source: Arc<dyn ItemSource>,
    settings: RefreshSettings,
    cache: Option<Arc<IndexCache>>,
    events: Option<UnboundedSender<InitialFetch>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Create a scheduler; nothing runs until [`RefreshScheduler::start`]
    pub fn new(catalog: Arc<Catalog>, source: Arc<dyn ItemSource>, settings: RefreshSettings) -> Self {
        Self {
            catalog,
            source,
            settings,
            cache: None,
            events: None,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Store the catalog to `cache` after every published change
    pub fn with_cache(mut self, cache: Arc<IndexCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Report each project's first fetch attempt to `events`
    ///
    /// The channel closes once every task has reported or been stopped.
    pub fn with_events(mut self, events: UnboundedSender<InitialFetch>) -> Self {
        self.events = Some(events);
        self
    }

    /// Catalog being refreshed
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Spawn one refresh task per project; the first fetches start immediately
    pub fn start(&mut self) {
        if !self.tasks.is_empty() || self.cancel.is_cancelled() {
            return;
        }

        for project in self.catalog.projects() {
            let cycle = RefreshCycle {
                project: Arc::clone(project),
                catalog: Arc::clone(&self.catalog),
                source: Arc::clone(&self.source),
                settings: self.settings.clone(),
                cache: self.cache.clone(),
                events: self.events.clone(),
                cancel: self.cancel.child_token(),
            };
            self.tasks.push(tokio::spawn(cycle.run()));
        }
        self.events = None;

        info!(
            "Started refresh cycles for {} project(s), interval {:?}",
            self.tasks.len(),
            self.settings.interval
        );
    }

    /// Whether any refresh task is still alive
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop every refresh task; in-flight fetches are abandoned
    pub fn shutdown(&mut self) {
        if self.cancel.is_cancelled() && self.tasks.is_empty() {
            return;
        }
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Refresh scheduler stopped");
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct RefreshCycle {
    project: Arc<ProjectIndex>,
    catalog: Arc<Catalog>,
    source: Arc<dyn ItemSource>,
    settings: RefreshSettings,
    cache: Option<Arc<IndexCache>>,
    events: Option<UnboundedSender<InitialFetch>>,
    cancel: CancellationToken,
}

impl RefreshCycle {
    async fn run(mut self) {
        let path = self.project.path().clone();
        let mut backoff = self.settings.backoff.start();

        loop {
            self.project.mark_refreshing();
            debug!("Refreshing {}", path);

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = fetch_generation(self.source.as_ref(), &path) => outcome,
            };

            if let Some(events) = self.events.take() {
                let event = InitialFetch {
                    project: path.clone(),
                    outcome: outcome.as_ref().map(Vec::len).map_err(|e| e.clone()),
                };
                // The receiver may already be gone
                let _ = events.send(event);
            }

            let wait = match outcome {
                Ok(items) => {
                    let count = items.len();
                    self.catalog.apply(&self.project, items);
                    self.project.mark_fresh(Utc::now());
                    backoff.reset();
                    info!("Indexed {} items for {}", count, path);
                    self.store_cache().await;
                    self.settings.interval
                }
                Err(err) if err.is_fatal() => {
                    warn!("Giving up on {}: {}", path, err);
                    self.catalog.clear(&self.project);
                    self.project.mark_failed(&err);
                    self.store_cache().await;
                    break;
                }
                Err(err) => {
                    let delay = backoff.next_delay_with_hint(err.retry_after());
                    self.project.mark_retrying(&err);
                    warn!(
                        "Refresh of {} failed (attempt {}): {}; retrying in {:?}",
                        path,
                        backoff.attempts(),
                        err,
                        delay
                    );
                    delay
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }

        debug!("Refresh cycle for {} ended", path);
    }

    async fn store_cache(&self) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&self.catalog).await {
                warn!("Failed to write index cache {}: {}", cache.path().display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gitlab_ls_gitlab::ItemState;

    struct StaticSource;

    #[async_trait]
    impl ItemSource for StaticSource {
        async fn fetch_items(
            &self,
            project: &ProjectPath,
            kind: ItemKind,
        ) -> Result<Vec<TrackedItem>, FetchError> {
            Ok(vec![TrackedItem::new(
                project.clone(),
                kind,
                1,
                format!("{} one", kind),
                ItemState::Open,
            )])
        }
    }

    struct HalfBroken;

    #[async_trait]
    impl ItemSource for HalfBroken {
        async fn fetch_items(
            &self,
            project: &ProjectPath,
            kind: ItemKind,
        ) -> Result<Vec<TrackedItem>, FetchError> {
            match kind {
                ItemKind::Issue => Ok(vec![TrackedItem::new(
                    project.clone(),
                    kind,
                    1,
                    "Issue",
                    ItemState::Open,
                )]),
                ItemKind::MergeRequest => Err(FetchError::Transient("502".to_string())),
            }
        }
    }

    fn path(s: &str) -> ProjectPath {
        ProjectPath::parse(s).unwrap()
    }

    #[test]
    fn test_default_settings() {
        let settings = RefreshSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(300));
        assert_eq!(settings.backoff.initial_delay, Duration::from_secs(5));
        assert_eq!(settings.backoff.max_delay, Duration::from_secs(300));

        let custom = RefreshSettings::default().with_interval(Duration::from_secs(60));
        assert_eq!(custom.interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_fetch_generation_combines_kinds() {
        let items = fetch_generation(&StaticSource, &path("a/b")).await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().any(|i| i.kind == ItemKind::Issue));
        assert!(items.iter().any(|i| i.kind == ItemKind::MergeRequest));
    }

    #[tokio::test]
    async fn test_fetch_generation_fails_as_a_whole() {
        let result = fetch_generation(&HalfBroken, &path("a/b")).await;
        assert_eq!(result, Err(FetchError::Transient("502".to_string())));
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_shutdown_stops() {
        let catalog = Arc::new(Catalog::new(vec![path("a/b"), path("c/d")]));
        let mut scheduler =
            RefreshScheduler::new(Arc::clone(&catalog), Arc::new(StaticSource), RefreshSettings::default());
        scheduler.start();
        scheduler.start();
        assert_eq!(scheduler.tasks.len(), 2);
        assert!(scheduler.is_running());

        scheduler.shutdown();
        assert!(!scheduler.is_running());

        // A stopped scheduler does not restart
        scheduler.start();
        assert!(scheduler.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_initial_fetch_reported_once_per_project() {
        let catalog = Arc::new(Catalog::new(vec![path("a/b"), path("c/d")]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let settings = RefreshSettings::default().with_interval(Duration::from_millis(1));
        let mut scheduler =
            RefreshScheduler::new(catalog, Arc::new(StaticSource), settings).with_events(tx);
        scheduler.start();

        let mut reported = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_eq!(event.outcome, Ok(2));
            reported.push(event.project.to_string());
        }
        reported.sort();
        // Later refreshes stay silent and the channel closes after the first round
        assert_eq!(reported, vec!["a/b", "c/d"]);
        scheduler.shutdown();
    }
}

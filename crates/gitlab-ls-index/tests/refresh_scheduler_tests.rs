//! Refresh cycle behavior under paused time
//!
//! The fake source answers instantly, so the gap between two consecutive
//! fetch attempts of a project is exactly the delay the cycle slept.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gitlab_ls_gitlab::{FetchError, ItemKind, ItemSource, ItemState, ProjectPath, TrackedItem};
use gitlab_ls_http::{BackoffPolicy, Jitter};
use gitlab_ls_index::{Catalog, IndexCache, ProjectIndex, RefreshScheduler, RefreshSettings, RefreshState};
use parking_lot::Mutex;
use tokio::time::Instant;

const TOLERANCE: Duration = Duration::from_millis(2);

#[derive(Default)]
struct FakeSource {
    items: HashMap<ProjectPath, Vec<TrackedItem>>,
    failures: Mutex<HashMap<ProjectPath, VecDeque<FetchError>>>,
    attempts: Mutex<Vec<(ProjectPath, Instant)>>,
}

impl FakeSource {
    fn with_item(mut self, project: &str, kind: ItemKind, number: u64, title: &str) -> Self {
        let project = path(project);
        self.items
            .entry(project.clone())
            .or_default()
            .push(TrackedItem::new(project, kind, number, title, ItemState::Open));
        self
    }

    fn failing(self, project: &str, errors: impl IntoIterator<Item = FetchError>) -> Self {
        self.failures
            .lock()
            .entry(path(project))
            .or_default()
            .extend(errors);
        self
    }

    fn attempts_of(&self, project: &str) -> Vec<Instant> {
        let project = path(project);
        self.attempts
            .lock()
            .iter()
            .filter(|(p, _)| *p == project)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl ItemSource for FakeSource {
    async fn fetch_items(
        &self,
        project: &ProjectPath,
        kind: ItemKind,
    ) -> Result<Vec<TrackedItem>, FetchError> {
        // One attempt per generation, counted on the issue listing
        if kind == ItemKind::Issue {
            self.attempts.lock().push((project.clone(), Instant::now()));
            if let Some(err) = self
                .failures
                .lock()
                .get_mut(project)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
        }

        Ok(self
            .items
            .get(project)
            .map(|items| items.iter().filter(|i| i.kind == kind).cloned().collect())
            .unwrap_or_default())
    }
}

fn path(s: &str) -> ProjectPath {
    ProjectPath::parse(s).unwrap()
}

fn timeout() -> FetchError {
    FetchError::Transient("operation timed out".to_string())
}

fn scheduler(projects: &[&str], source: Arc<FakeSource>, settings: RefreshSettings) -> RefreshScheduler {
    let catalog = Arc::new(Catalog::new(projects.iter().map(|p| path(p))));
    RefreshScheduler::new(catalog, source, settings)
}

fn project(scheduler: &RefreshScheduler, name: &str) -> Arc<ProjectIndex> {
    Arc::clone(scheduler.catalog().project(&path(name)).unwrap())
}

async fn wait_for_state(project: &ProjectIndex, state: RefreshState) {
    for _ in 0..10_000 {
        if project.state() == state {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("{} never reached {:?}", project.path(), state);
}

fn gaps(attempts: &[Instant]) -> Vec<Duration> {
    attempts.windows(2).map(|w| w[1] - w[0]).collect()
}

#[tokio::test(start_paused = true)]
async fn test_timeouts_back_off_until_recovery() {
    let source = Arc::new(
        FakeSource::default()
            .with_item("a/b", ItemKind::Issue, 42, "Fix crash")
            .failing("a/b", std::iter::repeat_with(timeout).take(9)),
    );
    let mut scheduler = scheduler(&["a/b"], Arc::clone(&source), RefreshSettings::default());
    scheduler.start();

    let ab = project(&scheduler, "a/b");
    wait_for_state(&ab, RefreshState::Fresh).await;

    let attempts = source.attempts_of("a/b");
    assert_eq!(attempts.len(), 10);

    let gaps = gaps(&attempts);
    assert!(gaps[0] >= Duration::from_millis(2500) - TOLERANCE, "first gap {:?}", gaps[0]);
    for pair in gaps.windows(2) {
        assert!(pair[1] + TOLERANCE >= pair[0], "delays decreased: {:?}", gaps);
    }
    for gap in &gaps {
        assert!(*gap <= Duration::from_secs(300) + TOLERANCE, "delay over cap: {:?}", gaps);
    }

    let labels: Vec<String> = scheduler
        .catalog()
        .completions()
        .query('#')
        .iter()
        .map(|i| i.label())
        .collect();
    assert_eq!(labels, vec!["#42 Fix crash".to_string()]);
    assert_eq!(ab.status().consecutive_failures, 0);

    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_without_jitter_doubles() {
    let source = Arc::new(FakeSource::default().failing("a/b", std::iter::repeat_with(timeout).take(8)));
    let settings = RefreshSettings::default().with_backoff(BackoffPolicy {
        jitter: Jitter::None,
        ..BackoffPolicy::default()
    });
    let mut scheduler = scheduler(&["a/b"], Arc::clone(&source), settings);
    scheduler.start();
    wait_for_state(&project(&scheduler, "a/b"), RefreshState::Fresh).await;

    let expected: Vec<u64> = vec![5, 10, 20, 40, 80, 160, 300, 300];
    let gaps = gaps(&source.attempts_of("a/b"));
    assert_eq!(gaps.len(), expected.len());
    for (gap, secs) in gaps.iter().zip(expected) {
        let want = Duration::from_secs(secs);
        assert!(*gap >= want && *gap <= want + TOLERANCE, "got {:?}", gaps);
    }
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_hint_is_honored() {
    let source = Arc::new(FakeSource::default().failing(
        "a/b",
        [FetchError::RateLimited {
            retry_after: Some(Duration::from_secs(120)),
        }],
    ));
    let mut scheduler = scheduler(&["a/b"], Arc::clone(&source), RefreshSettings::default());
    scheduler.start();
    wait_for_state(&project(&scheduler, "a/b"), RefreshState::Fresh).await;

    let gaps = gaps(&source.attempts_of("a/b"));
    assert_eq!(gaps.len(), 1);
    assert!(gaps[0] >= Duration::from_secs(120));
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_project_does_not_block_others() {
    let source = Arc::new(
        FakeSource::default()
            .with_item("a/b", ItemKind::Issue, 1, "Hidden")
            .with_item("c/d", ItemKind::Issue, 7, "Visible")
            .failing("a/b", std::iter::repeat_with(|| FetchError::Unauthorized("401".to_string())).take(5)),
    );
    let mut scheduler = scheduler(&["a/b", "c/d"], Arc::clone(&source), RefreshSettings::default());
    scheduler.start();

    let ab = project(&scheduler, "a/b");
    let cd = project(&scheduler, "c/d");
    wait_for_state(&ab, RefreshState::Failed).await;
    wait_for_state(&cd, RefreshState::Fresh).await;

    let items = scheduler.catalog().completions().query('#');
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].label(), "#7 Visible");
    assert_eq!(items[0].project.as_str(), "c/d");
    assert!(ab.snapshot().is_empty());

    // The failed project is never attempted again; the healthy one keeps refreshing
    tokio::time::sleep(Duration::from_secs(1000)).await;
    assert_eq!(source.attempts_of("a/b").len(), 1);
    assert!(source.attempts_of("c/d").len() >= 3);
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_successful_projects_refresh_on_interval() {
    let source = Arc::new(FakeSource::default().with_item("a/b", ItemKind::MergeRequest, 3, "Feature"));
    let settings = RefreshSettings::default().with_interval(Duration::from_secs(60));
    let mut scheduler = scheduler(&["a/b"], Arc::clone(&source), settings);
    scheduler.start();
    wait_for_state(&project(&scheduler, "a/b"), RefreshState::Fresh).await;

    tokio::time::sleep(Duration::from_secs(200)).await;
    let gaps = gaps(&source.attempts_of("a/b"));
    assert!(gaps.len() >= 3);
    for gap in gaps {
        assert!(gap >= Duration::from_secs(60) && gap <= Duration::from_secs(60) + TOLERANCE);
    }
    assert_eq!(scheduler.catalog().completions().query('!')[0].label(), "!3 Feature");
    scheduler.shutdown();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_backoff_sleep() {
    let source = Arc::new(FakeSource::default().failing("a/b", std::iter::repeat_with(timeout).take(100)));
    let mut scheduler = scheduler(&["a/b"], Arc::clone(&source), RefreshSettings::default());
    scheduler.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(source.attempts_of("a/b").len(), 1);
    assert_eq!(project(&scheduler, "a/b").state(), RefreshState::Refreshing);

    scheduler.shutdown();
    assert!(!scheduler.is_running());
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(source.attempts_of("a/b").len(), 1);
}

#[tokio::test]
async fn test_refresh_writes_cache() {
    let dir = tempfile::TempDir::new().unwrap();
    let cache_path = dir.path().join("index.json");
    let cache = Arc::new(IndexCache::new(&cache_path));

    let source = Arc::new(FakeSource::default().with_item("a/b", ItemKind::Issue, 42, "Fix crash"));
    let mut scheduler =
        scheduler(&["a/b"], Arc::clone(&source), RefreshSettings::default()).with_cache(Arc::clone(&cache));
    scheduler.start();

    let mut stored = false;
    for _ in 0..500 {
        if let Ok(projects) = cache.load().await {
            if let Some(entry) = projects.get(&path("a/b")) {
                assert_eq!(entry.items[0].label(), "#42 Fix crash");
                stored = true;
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(stored, "cache was never written");
    scheduler.shutdown();
}

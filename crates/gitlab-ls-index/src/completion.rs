//! Merged, read-optimized view over every project's current generation

use std::collections::HashMap;
use std::sync::Arc;

use gitlab_ls_gitlab::{ItemKey, ItemKind, TrackedItem};
use parking_lot::RwLock;

use crate::project::{Generation, ProjectIndex};

/// Immutable merged view built from project snapshots
#[derive(Debug, Default)]
pub struct CompletionView {
    issues: Vec<Arc<TrackedItem>>,
    merge_requests: Vec<Arc<TrackedItem>>,
    lookup: HashMap<ItemKey, Arc<TrackedItem>>,
}

impl CompletionView {
    /// Merge the given generations
    pub fn build(generations: &[Arc<Generation>]) -> Self {
        let mut issues = Vec::new();
        let mut merge_requests = Vec::new();
        let mut lookup = HashMap::new();

        for generation in generations {
            for item in generation.items() {
                match item.kind {
                    ItemKind::Issue => issues.push(Arc::clone(item)),
                    ItemKind::MergeRequest => merge_requests.push(Arc::clone(item)),
                }
                lookup.insert(item.key(), Arc::clone(item));
            }
        }

        sort_items(&mut issues);
        sort_items(&mut merge_requests);

        Self {
            issues,
            merge_requests,
            lookup,
        }
    }

    /// Ordered items of one kind
    pub fn items(&self, kind: ItemKind) -> &[Arc<TrackedItem>] {
        match kind {
            ItemKind::Issue => &self.issues,
            ItemKind::MergeRequest => &self.merge_requests,
        }
    }

    /// Ordered items selected by a trigger prefix; empty for any other character
    pub fn query(&self, prefix: char) -> &[Arc<TrackedItem>] {
        match ItemKind::from_prefix(prefix) {
            Some(kind) => self.items(kind),
            None => &[],
        }
    }

    /// Look up one item by identity
    pub fn find(&self, key: &ItemKey) -> Option<&Arc<TrackedItem>> {
        self.lookup.get(key)
    }

    /// Total number of items
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Check if the view has no items
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }
}

/// Number descending, then project path ascending
fn sort_items(items: &mut [Arc<TrackedItem>]) {
    items.sort_by(|a, b| {
        b.number
            .cmp(&a.number)
            .then_with(|| a.project.cmp(&b.project))
    });
}

/// Completion Index: holds the latest [`CompletionView`]
#[derive(Debug, Default)]
pub struct CompletionIndex {
    view: RwLock<Arc<CompletionView>>,
}

impl CompletionIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the current snapshot of every project
    ///
    /// Callers serialize rebuilds; see [`crate::Catalog::apply`].
    pub fn rebuild(&self, projects: &[Arc<ProjectIndex>]) -> Arc<CompletionView> {
        let generations: Vec<Arc<Generation>> = projects.iter().map(|p| p.snapshot()).collect();
        let view = Arc::new(CompletionView::build(&generations));
        *self.view.write() = Arc::clone(&view);
        view
    }

    /// Current view
    pub fn snapshot(&self) -> Arc<CompletionView> {
        Arc::clone(&self.view.read())
    }

    /// Ordered items selected by a trigger prefix
    pub fn query(&self, prefix: char) -> Vec<Arc<TrackedItem>> {
        self.snapshot().query(prefix).to_vec()
    }

    /// Look up one item by identity
    pub fn find(&self, key: &ItemKey) -> Option<Arc<TrackedItem>> {
        self.snapshot().find(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitlab_ls_gitlab::{ItemState, ProjectPath};
    use proptest::prelude::*;

    fn path(s: &str) -> ProjectPath {
        ProjectPath::parse(s).unwrap()
    }

    fn item(project: &str, kind: ItemKind, number: u64) -> TrackedItem {
        TrackedItem::new(path(project), kind, number, format!("Item {}", number), ItemState::Open)
    }

    fn project_with(project: &str, items: Vec<TrackedItem>) -> Arc<ProjectIndex> {
        let index = Arc::new(ProjectIndex::new(path(project)));
        index.replace(items);
        index
    }

    #[test]
    fn test_empty_index() {
        let index = CompletionIndex::new();
        assert!(index.query('#').is_empty());
        assert!(index.query('!').is_empty());
        assert!(index.snapshot().is_empty());
    }

    #[test]
    fn test_query_orders_by_number_then_project() {
        let projects = vec![
            project_with("z/z", vec![item("z/z", ItemKind::Issue, 10), item("z/z", ItemKind::Issue, 3)]),
            project_with("a/a", vec![item("a/a", ItemKind::Issue, 10), item("a/a", ItemKind::Issue, 7)]),
        ];
        let index = CompletionIndex::new();
        index.rebuild(&projects);

        let order: Vec<(String, u64)> = index
            .query('#')
            .iter()
            .map(|i| (i.project.to_string(), i.number))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a/a".to_string(), 10),
                ("z/z".to_string(), 10),
                ("a/a".to_string(), 7),
                ("z/z".to_string(), 3),
            ]
        );
    }

    #[test]
    fn test_query_splits_by_prefix() {
        let projects = vec![project_with(
            "a/b",
            vec![item("a/b", ItemKind::Issue, 1), item("a/b", ItemKind::MergeRequest, 2)],
        )];
        let index = CompletionIndex::new();
        index.rebuild(&projects);

        assert_eq!(index.query('#').len(), 1);
        assert_eq!(index.query('#')[0].kind, ItemKind::Issue);
        assert_eq!(index.query('!').len(), 1);
        assert_eq!(index.query('!')[0].kind, ItemKind::MergeRequest);
        assert!(index.query('@').is_empty());
        assert!(index.query('4').is_empty());
    }

    #[test]
    fn test_find_by_key() {
        let projects = vec![project_with("a/b", vec![item("a/b", ItemKind::Issue, 42)])];
        let index = CompletionIndex::new();
        index.rebuild(&projects);

        let key = ItemKey {
            project: path("a/b"),
            kind: ItemKind::Issue,
            number: 42,
        };
        assert_eq!(index.find(&key).unwrap().number, 42);

        let missing = ItemKey {
            kind: ItemKind::MergeRequest,
            ..key
        };
        assert!(index.find(&missing).is_none());
    }

    #[test]
    fn test_rebuild_reflects_replace() {
        let project = project_with("a/b", vec![item("a/b", ItemKind::Issue, 1)]);
        let projects = vec![Arc::clone(&project)];
        let index = CompletionIndex::new();
        let first = index.rebuild(&projects);

        project.replace(vec![item("a/b", ItemKind::Issue, 2)]);
        let second = index.rebuild(&projects);

        assert!(!Arc::ptr_eq(&first, &second));
        let numbers: Vec<u64> = index.query('#').iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![2]);
        // The earlier view still answers from its own generation
        assert_eq!(first.query('#')[0].number, 1);
    }

    proptest! {
        #[test]
        fn prop_query_is_sorted_and_unique(
            numbers in proptest::collection::vec((0usize..3, 1u64..50), 0..60)
        ) {
            let names = ["a/a", "b/b", "c/c"];
            let projects: Vec<Arc<ProjectIndex>> = names
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    let items = numbers
                        .iter()
                        .filter(|(p, _)| *p == idx)
                        .map(|(_, n)| item(name, ItemKind::Issue, *n))
                        .collect();
                    project_with(name, items)
                })
                .collect();

            let index = CompletionIndex::new();
            index.rebuild(&projects);
            let result = index.query('#');

            for pair in result.windows(2) {
                let ordered = pair[0].number > pair[1].number
                    || (pair[0].number == pair[1].number && pair[0].project < pair[1].project);
                prop_assert!(ordered);
            }

            // Rebuilding unchanged data yields the same sequence
            index.rebuild(&projects);
            let again: Vec<ItemKey> = index.query('#').iter().map(|i| i.key()).collect();
            let first: Vec<ItemKey> = result.iter().map(|i| i.key()).collect();
            prop_assert_eq!(first, again);
        }
    }
}

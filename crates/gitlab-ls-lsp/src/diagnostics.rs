//! Pull diagnostics reporting the state of every linked item

use gitlab_ls_gitlab::{ItemState, TrackedItem};
use gitlab_ls_index::CompletionView;
use serde_json::{json, Value};

use crate::links::{ItemLink, LinkMatcher};

const SOURCE: &str = "gitlab-ls";

/// LSP diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    /// Error
    Error = 1,
    /// Warning
    Warning = 2,
    /// Information
    Information = 3,
    /// Hint
    Hint = 4,
}

impl DiagnosticSeverity {
    /// Severity used for an item in `state`
    pub fn for_state(state: ItemState) -> Self {
        match state {
            ItemState::Open => DiagnosticSeverity::Hint,
            ItemState::Merged => DiagnosticSeverity::Information,
            ItemState::Closed | ItemState::Locked => DiagnosticSeverity::Error,
        }
    }
}

fn diagnostic(link: &ItemLink, item: &TrackedItem) -> Value {
    json!({
        "range": link.range,
        "severity": DiagnosticSeverity::for_state(item.state) as u8,
        "source": SOURCE,
        "message": format!("{}{} is {}: {}", item.prefix(), item.number, item.state, item.title),
    })
}

/// Diagnostics for every indexed item linked from `text`
pub fn diagnostics(view: &CompletionView, links: &LinkMatcher, text: &str) -> Vec<Value> {
    links
        .find_links(text)
        .iter()
        .filter_map(|link| view.find(&link.key).map(|item| diagnostic(link, item)))
        .collect()
}

/// Full document diagnostic report
pub fn full_report(items: Vec<Value>) -> Value {
    json!({
        "kind": "full",
        "items": items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitlab_ls_gitlab::{ItemKind, ProjectPath};
    use gitlab_ls_index::Catalog;
    use std::sync::Arc;

    fn catalog() -> Catalog {
        let path = ProjectPath::parse("a/b").unwrap();
        let catalog = Catalog::new(vec![path.clone()]);
        let project = Arc::clone(&catalog.projects()[0]);
        catalog.apply(
            &project,
            vec![
                TrackedItem::new(path.clone(), ItemKind::Issue, 1, "Open bug", ItemState::Open),
                TrackedItem::new(path.clone(), ItemKind::Issue, 2, "Closed bug", ItemState::Closed),
                TrackedItem::new(path.clone(), ItemKind::MergeRequest, 3, "Merged fix", ItemState::Merged),
                TrackedItem::new(path, ItemKind::MergeRequest, 4, "Locked", ItemState::Locked),
            ],
        );
        catalog
    }

    #[test]
    fn test_severity_follows_state() {
        assert_eq!(DiagnosticSeverity::for_state(ItemState::Open), DiagnosticSeverity::Hint);
        assert_eq!(DiagnosticSeverity::for_state(ItemState::Merged), DiagnosticSeverity::Information);
        assert_eq!(DiagnosticSeverity::for_state(ItemState::Closed), DiagnosticSeverity::Error);
        assert_eq!(DiagnosticSeverity::for_state(ItemState::Locked), DiagnosticSeverity::Error);
    }

    #[test]
    fn test_diagnostics_for_linked_items() {
        let links = LinkMatcher::new("https://gl.example").unwrap();
        let text = "https://gl.example/a/b/-/issues/1\n\
                    https://gl.example/a/b/-/issues/2\n\
                    https://gl.example/a/b/-/merge_requests/3\n\
                    https://gl.example/a/b/-/merge_requests/4\n\
                    https://gl.example/a/b/-/issues/99";

        let items = diagnostics(&catalog().view(), &links, text);
        assert_eq!(items.len(), 4);

        let severities: Vec<u64> = items.iter().map(|d| d["severity"].as_u64().unwrap()).collect();
        assert_eq!(severities, vec![4, 1, 3, 1]);
        assert_eq!(items[1]["message"], "#2 is closed: Closed bug");
        assert_eq!(items[2]["range"]["start"]["line"], 2);
        assert!(items.iter().all(|d| d["source"] == "gitlab-ls"));
    }

    #[test]
    fn test_full_report_shape() {
        let report = full_report(Vec::new());
        assert_eq!(report["kind"], "full");
        assert_eq!(report["items"], json!([]));
    }
}

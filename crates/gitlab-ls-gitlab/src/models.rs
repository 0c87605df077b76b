//! GitLab Data Models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{GitLabError, Result};

/// A project's `group[/subgroup...]/name` path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProjectPath(String);

impl ProjectPath {
    /// Validate and wrap a project path
    pub fn parse(path: impl Into<String>) -> Result<Self> {
        let path = path.into();

        if path.is_empty() {
            return Err(GitLabError::invalid_input("project path is empty"));
        }

        let segments: Vec<&str> = path.split('/').collect();
        if segments.len() < 2 {
            return Err(GitLabError::invalid_input(format!(
                "project path '{}' must look like group/name",
                path
            )));
        }

        for segment in &segments {
            if segment.is_empty() {
                return Err(GitLabError::invalid_input(format!(
                    "project path '{}' has an empty segment",
                    path
                )));
            }
            if segment.chars().all(|c| c == '.') {
                return Err(GitLabError::invalid_input(format!(
                    "project path '{}' has a relative segment '{}'",
                    path, segment
                )));
            }
            if let Some(bad) = segment
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
            {
                return Err(GitLabError::invalid_input(format!(
                    "project path '{}' contains invalid character {:?}",
                    path, bad
                )));
            }
        }

        Ok(Self(path))
    }

    /// Borrow the path text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ProjectPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProjectPath {
    type Error = GitLabError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ProjectPath> for String {
    fn from(path: ProjectPath) -> Self {
        path.0
    }
}

/// Issue or merge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Issue, completed after `#`
    Issue,
    /// Merge request, completed after `!`
    MergeRequest,
}

impl ItemKind {
    /// Trigger prefix character
    pub fn prefix(self) -> char {
        match self {
            ItemKind::Issue => '#',
            ItemKind::MergeRequest => '!',
        }
    }

    /// Kind selected by a trigger prefix
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            '#' => Some(ItemKind::Issue),
            '!' => Some(ItemKind::MergeRequest),
            _ => None,
        }
    }

    /// REST and web URL path segment
    pub fn url_segment(self) -> &'static str {
        match self {
            ItemKind::Issue => "issues",
            ItemKind::MergeRequest => "merge_requests",
        }
    }

    /// Kind named by a URL path segment
    pub fn from_url_segment(segment: &str) -> Option<Self> {
        match segment {
            "issues" => Some(ItemKind::Issue),
            "merge_requests" => Some(ItemKind::MergeRequest),
            _ => None,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Issue => f.write_str("issue"),
            ItemKind::MergeRequest => f.write_str("merge request"),
        }
    }
}

/// Issue / merge request state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    /// Open
    #[serde(rename = "opened")]
    Open,
    /// Closed without merging
    Closed,
    /// Merged (merge requests only)
    Merged,
    /// Locked discussion (merge requests only)
    Locked,
}

impl ItemState {
    /// Map the API's state string; unknown values count as open
    pub fn from_api(state: &str) -> Self {
        match state {
            "closed" => ItemState::Closed,
            "merged" => ItemState::Merged,
            "locked" => ItemState::Locked,
            _ => ItemState::Open,
        }
    }

    /// API spelling of the state
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Open => "opened",
            ItemState::Closed => "closed",
            ItemState::Merged => "merged",
            ItemState::Locked => "locked",
        }
    }

    /// Check if the item is still open
    pub fn is_open(self) -> bool {
        self == ItemState::Open
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a tracked item; stable across refreshes
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Owning project
    pub project: ProjectPath,
    /// Issue or merge request
    pub kind: ItemKind,
    /// Project-scoped number (GitLab `iid`)
    pub number: u64,
}

/// One issue or merge request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedItem {
    /// Owning project
    pub project: ProjectPath,
    /// Issue or merge request
    pub kind: ItemKind,
    /// Project-scoped number (GitLab `iid`)
    pub number: u64,
    /// Title
    pub title: String,
    /// State
    pub state: ItemState,
    /// Author display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Description body (markdown)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Browser URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    /// Last update on the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TrackedItem {
    /// Create an item with only the identity, title and state set
    pub fn new(
        project: ProjectPath,
        kind: ItemKind,
        number: u64,
        title: impl Into<String>,
        state: ItemState,
    ) -> Self {
        Self {
            project,
            kind,
            number,
            title: title.into(),
            state,
            author: None,
            description: None,
            web_url: None,
            updated_at: None,
        }
    }

    /// Trigger prefix of this item's kind
    pub fn prefix(&self) -> char {
        self.kind.prefix()
    }

    /// Completion label, `<prefix><number> <title>`
    pub fn label(&self) -> String {
        format!("{}{} {}", self.prefix(), self.number, self.title)
    }

    /// Identity key
    pub fn key(&self) -> ItemKey {
        ItemKey {
            project: self.project.clone(),
            kind: self.kind,
            number: self.number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn path(s: &str) -> ProjectPath {
        ProjectPath::parse(s).unwrap()
    }

    #[test]
    fn test_project_path_valid() {
        assert_eq!(path("a/b").as_str(), "a/b");
        assert_eq!(path("group/sub.group/my-project_2").as_str(), "group/sub.group/my-project_2");
    }

    #[test]
    fn test_project_path_invalid() {
        for bad in ["", "name", "/a/b", "a/b/", "a//b", "a/b c", "a/b?x", "ä/b", "a/..", "../b", "a/./b", "g/..."] {
            assert!(ProjectPath::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_project_path_allows_inner_dots() {
        assert_eq!(path("a/.hidden").as_str(), "a/.hidden");
        assert_eq!(path("a/b..c").as_str(), "a/b..c");
    }

    proptest! {
        #[test]
        fn prop_valid_paths_parse(segments in proptest::collection::vec("[a-z0-9][a-z0-9_.-]{0,10}", 2..5)) {
            let text = segments.join("/");
            let parsed = ProjectPath::parse(text.as_str()).unwrap();
            prop_assert_eq!(parsed.as_str(), text.as_str());
        }

        #[test]
        fn prop_dot_segments_rejected(
            group in "[a-z]{1,8}",
            dots in 1usize..4,
            position in 0usize..2,
        ) {
            let dotted = ".".repeat(dots);
            let text = if position == 0 {
                format!("{}/{}", dotted, group)
            } else {
                format!("{}/{}", group, dotted)
            };
            prop_assert!(ProjectPath::parse(text).is_err());
        }
    }

    #[test]
    fn test_project_path_serde_validates() {
        let ok: ProjectPath = serde_json::from_str("\"a/b\"").unwrap();
        assert_eq!(ok, path("a/b"));
        assert!(serde_json::from_str::<ProjectPath>("\"nope\"").is_err());
    }

    #[test]
    fn test_kind_prefixes() {
        assert_eq!(ItemKind::Issue.prefix(), '#');
        assert_eq!(ItemKind::MergeRequest.prefix(), '!');
        assert_eq!(ItemKind::from_prefix('#'), Some(ItemKind::Issue));
        assert_eq!(ItemKind::from_prefix('!'), Some(ItemKind::MergeRequest));
        assert_eq!(ItemKind::from_prefix('@'), None);
        assert_eq!(
            ItemKind::from_url_segment("merge_requests"),
            Some(ItemKind::MergeRequest)
        );
    }

    #[test]
    fn test_state_from_api() {
        assert_eq!(ItemState::from_api("opened"), ItemState::Open);
        assert_eq!(ItemState::from_api("closed"), ItemState::Closed);
        assert_eq!(ItemState::from_api("merged"), ItemState::Merged);
        assert_eq!(ItemState::from_api("locked"), ItemState::Locked);
        assert_eq!(ItemState::from_api("reopened"), ItemState::Open);
    }

    #[test]
    fn test_state_serde_uses_api_spelling() {
        assert_eq!(serde_json::to_string(&ItemState::Open).unwrap(), "\"opened\"");
        assert_eq!(
            serde_json::from_str::<ItemState>("\"merged\"").unwrap(),
            ItemState::Merged
        );
    }

    #[test]
    fn test_item_label() {
        let issue = TrackedItem::new(path("a/b"), ItemKind::Issue, 42, "Fix crash", ItemState::Open);
        assert_eq!(issue.label(), "#42 Fix crash");

        let mr = TrackedItem::new(path("a/b"), ItemKind::MergeRequest, 7, "Add feature", ItemState::Merged);
        assert_eq!(mr.label(), "!7 Add feature");
        assert_eq!(mr.key().number, 7);
    }
}

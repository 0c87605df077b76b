//! Completion of issue and merge request references
//!
//! The token being completed is the run of non-whitespace text ending at the
//! cursor. Its first character selects the item kind; the rest narrows the
//! candidates. Mapping an item to its wire form is a pure function.

use gitlab_ls_gitlab::{ItemKey, ItemKind, TrackedItem};
use gitlab_ls_index::CompletionView;
use serde_json::{json, Value};

use crate::hover::item_markdown;

/// `CompletionItemKind.Reference`
const KIND_REFERENCE: u8 = 18;
/// `CompletionItemKind.Module`
const KIND_MODULE: u8 = 9;
/// `CompletionItemTag.Deprecated`
const TAG_DEPRECATED: u8 = 1;

/// Token being typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionToken {
    /// Trigger prefix, `#` or `!`
    pub prefix: char,
    /// Text typed after the prefix
    pub filter: String,
}

impl CompletionToken {
    /// Token ending at the end of `line_before_cursor`, if it starts with a trigger
    pub fn from_line(line_before_cursor: &str) -> Option<Self> {
        let start = line_before_cursor
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let token = &line_before_cursor[start..];

        let mut chars = token.chars();
        let prefix = chars.next()?;
        ItemKind::from_prefix(prefix)?;
        Some(Self {
            prefix,
            filter: chars.as_str().to_string(),
        })
    }

    /// Token with no filter, from a trigger character
    pub fn from_trigger(trigger: &str) -> Option<Self> {
        let mut chars = trigger.chars();
        let prefix = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        ItemKind::from_prefix(prefix)?;
        Some(Self {
            prefix,
            filter: String::new(),
        })
    }

    /// Whether `item` survives the filter
    ///
    /// Digits match as a number prefix; anything else matches the title
    /// case-insensitively, or the number.
    pub fn matches(&self, item: &TrackedItem) -> bool {
        if self.filter.is_empty() {
            return true;
        }
        let number = item.number.to_string();
        if self.filter.chars().all(|c| c.is_ascii_digit()) {
            return number.starts_with(&self.filter);
        }
        let needle = self.filter.to_lowercase();
        item.title.to_lowercase().contains(&needle) || number.contains(&needle)
    }
}

/// Wire form of one completion item; `rank` is its position in the index order
pub fn completion_item(item: &TrackedItem, rank: usize) -> Value {
    let kind = match item.kind {
        ItemKind::Issue => KIND_REFERENCE,
        ItemKind::MergeRequest => KIND_MODULE,
    };

    let mut value = json!({
        "label": item.label(),
        "kind": kind,
        "detail": item.project.as_str(),
        "labelDetails": { "detail": item.project.as_str() },
        "sortText": format!("{:08}", rank),
        "data": item.key(),
    });
    if !item.state.is_open() {
        value["tags"] = json!([TAG_DEPRECATED]);
    }
    value
}

/// Completion list for `token` over `view`
///
/// A filtered list is marked incomplete so clients ask again once the
/// filter changes instead of narrowing their copy.
pub fn completion_list(view: &CompletionView, token: Option<&CompletionToken>) -> Value {
    let items: Vec<Value> = match token {
        Some(token) => view
            .query(token.prefix)
            .iter()
            .filter(|item| token.matches(item))
            .enumerate()
            .map(|(rank, item)| completion_item(item, rank))
            .collect(),
        None => Vec::new(),
    };

    let filtered = token.map_or(false, |token| !token.filter.is_empty());
    json!({
        "isIncomplete": filtered,
        "items": items,
    })
}

/// `completionItem/resolve`: attach documentation if the item is still indexed
pub fn resolve(view: &CompletionView, mut completion: Value) -> Value {
    let key = completion
        .get("data")
        .cloned()
        .and_then(|data| serde_json::from_value::<ItemKey>(data).ok());

    if let Some(item) = key.as_ref().and_then(|key| view.find(key)) {
        completion["documentation"] = json!({
            "kind": "markdown",
            "value": item_markdown(item),
        });
    }
    completion
}

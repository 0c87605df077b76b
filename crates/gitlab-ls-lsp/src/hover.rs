//! Hover over GitLab URLs

use gitlab_ls_gitlab::TrackedItem;
use gitlab_ls_index::CompletionView;
use serde_json::{json, Value};

use crate::links::LinkMatcher;
use crate::types::Position;

/// Markdown summary of an item: title line, state and author, then the description
pub fn item_markdown(item: &TrackedItem) -> String {
    let mut markdown = format!("**{}**\n\n", item.label());

    let mut meta = format!("{} {} in `{}`", item.kind, item.state, item.project);
    if let Some(author) = &item.author {
        meta.push_str(&format!(" by {}", author));
    }
    markdown.push_str(&meta);

    if let Some(description) = &item.description {
        markdown.push_str("\n\n---\n\n");
        markdown.push_str(description.trim());
    }
    markdown
}

/// Hover result for the URL under `position`, or `null`
pub fn hover(view: &CompletionView, links: &LinkMatcher, text: &str, position: Position) -> Value {
    let Some(link) = links.link_at(text, position) else {
        return Value::Null;
    };
    let Some(item) = view.find(&link.key) else {
        return Value::Null;
    };

    json!({
        "contents": {
            "kind": "markdown",
            "value": item_markdown(item),
        },
        "range": link.range,
    })
}

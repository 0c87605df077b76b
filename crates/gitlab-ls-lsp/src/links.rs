//! Recognition of GitLab issue and merge request URLs in document text

use gitlab_ls_gitlab::{ItemKey, ItemKind, ProjectPath};
use regex::Regex;

use crate::documents::{byte_to_utf16, lines};
use crate::types::{LspError, LspResult, Position, Range};

/// A URL in a document pointing at an item of the configured instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLink {
    /// Item the URL points at
    pub key: ItemKey,
    /// Where the URL sits in the document
    pub range: Range,
}

/// Matches `<base>/<project>/-/<issues|merge_requests>/<number>`
#[derive(Debug, Clone)]
pub struct LinkMatcher {
    pattern: Regex,
}

impl LinkMatcher {
    /// Matcher for URLs under `base_url` (without trailing slash)
    pub fn new(base_url: &str) -> LspResult<Self> {
        let pattern = format!(
            r"{}/(?P<project>[A-Za-z0-9_.\-]+(?:/[A-Za-z0-9_.\-]+)+)/-/(?P<kind>issues|merge_requests)/(?P<number>[0-9]+)",
            regex::escape(base_url.trim_end_matches('/'))
        );
        let pattern = Regex::new(&pattern)
            .map_err(|e| LspError::InternalError(format!("Failed to build URL pattern: {}", e)))?;
        Ok(Self { pattern })
    }

    /// Every item URL in `text`, in document order
    pub fn find_links(&self, text: &str) -> Vec<ItemLink> {
        let mut links = Vec::new();

        for (line_no, line) in lines(text).enumerate() {
            for caps in self.pattern.captures_iter(line) {
                let (Some(whole), Some(project), Some(kind), Some(number)) =
                    (caps.get(0), caps.name("project"), caps.name("kind"), caps.name("number"))
                else {
                    continue;
                };

                let (Ok(project), Some(kind), Ok(number)) = (
                    ProjectPath::parse(project.as_str()),
                    ItemKind::from_url_segment(kind.as_str()),
                    number.as_str().parse::<u64>(),
                ) else {
                    continue;
                };
                if number == 0 {
                    continue;
                }

                let line_no = line_no as u32;
                links.push(ItemLink {
                    key: ItemKey {
                        project,
                        kind,
                        number,
                    },
                    range: Range::new(
                        Position::new(line_no, byte_to_utf16(line, whole.start())),
                        Position::new(line_no, byte_to_utf16(line, whole.end())),
                    ),
                });
            }
        }

        links
    }

    /// The item URL under `position`, if any
    pub fn link_at(&self, text: &str, position: Position) -> Option<ItemLink> {
        self.find_links(text)
            .into_iter()
            .find(|link| link.range.contains(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> LinkMatcher {
        LinkMatcher::new("https://gl.example").unwrap()
    }

    #[test]
    fn test_finds_issue_and_merge_request_urls() {
        let text = "See https://gl.example/a/b/-/issues/42 and\n\
                    https://gl.example/group/sub/proj/-/merge_requests/7#note_1";
        let links = matcher().find_links(text);
        assert_eq!(links.len(), 2);

        assert_eq!(links[0].key.project.as_str(), "a/b");
        assert_eq!(links[0].key.kind, ItemKind::Issue);
        assert_eq!(links[0].key.number, 42);
        assert_eq!(links[0].range, Range::new(Position::new(0, 4), Position::new(0, 38)));

        assert_eq!(links[1].key.project.as_str(), "group/sub/proj");
        assert_eq!(links[1].key.kind, ItemKind::MergeRequest);
        assert_eq!(links[1].key.number, 7);
        assert_eq!(links[1].range.start, Position::new(1, 0));
    }

    #[test]
    fn test_ignores_other_hosts_and_paths() {
        let text = "https://other.example/a/b/-/issues/1 \
                    https://gl.example/a/b/issues/2 \
                    https://gl.example/a/-/issues/3 \
                    https://gl.example/a/b/-/issues/0";
        assert!(matcher().find_links(text).is_empty());
    }

    #[test]
    fn test_base_url_with_path_is_escaped() {
        let matcher = LinkMatcher::new("https://example.com/git.lab/").unwrap();
        assert_eq!(
            matcher
                .find_links("https://example.com/git.lab/a/b/-/issues/5")
                .len(),
            1
        );
        assert!(matcher
            .find_links("https://example.com/gitXlab/a/b/-/issues/5")
            .is_empty());
    }

    #[test]
    fn test_utf16_ranges() {
        let text = "😀 https://gl.example/a/b/-/issues/9";
        let links = matcher().find_links(text);
        assert_eq!(links[0].range.start, Position::new(0, 3));
    }

    #[test]
    fn test_link_at_position() {
        let text = "x https://gl.example/a/b/-/issues/42 y";
        let matcher = matcher();
        assert_eq!(matcher.link_at(text, Position::new(0, 10)).unwrap().key.number, 42);
        assert!(matcher.link_at(text, Position::new(0, 0)).is_none());
        assert!(matcher.link_at(text, Position::new(0, 37)).is_none());
    }
}

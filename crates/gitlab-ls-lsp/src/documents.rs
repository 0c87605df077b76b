//! Open document store (full sync)
//!
//! LSP positions count UTF-16 code units; the helpers here translate them
//! to byte offsets into a line and back.

use std::collections::HashMap;

use crate::types::Position;

/// Text of every open document, keyed by URI
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<String, String>,
}

impl DocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a document's full text
    pub fn set(&mut self, uri: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(uri.into(), text.into());
    }

    /// Forget a document
    pub fn remove(&mut self, uri: &str) {
        self.documents.remove(uri);
    }

    /// Full text of a document
    pub fn get(&self, uri: &str) -> Option<&str> {
        self.documents.get(uri).map(String::as_str)
    }

    /// Number of open documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if no document is open
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Text of the cursor's line up to the cursor
    pub fn line_before(&self, uri: &str, position: Position) -> Option<&str> {
        let line = line_at(self.get(uri)?, position.line)?;
        let end = utf16_to_byte(line, position.character);
        Some(&line[..end])
    }
}

/// One line of `text` without its terminator
pub fn line_at(text: &str, line: u32) -> Option<&str> {
    lines(text).nth(line as usize)
}

/// Lines of `text`, accepting `\n` and `\r\n` terminators
pub fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

/// Byte offset of a UTF-16 column, clamped to the line's end
pub fn utf16_to_byte(line: &str, column: u32) -> usize {
    let mut units = 0u32;
    for (offset, ch) in line.char_indices() {
        if units >= column {
            return offset;
        }
        units += ch.len_utf16() as u32;
    }
    line.len()
}

/// UTF-16 column of a byte offset
pub fn byte_to_utf16(line: &str, offset: usize) -> u32 {
    line[..offset.min(line.len())]
        .chars()
        .map(|c| c.len_utf16() as u32)
        .sum()
}

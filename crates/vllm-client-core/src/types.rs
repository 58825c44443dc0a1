//! Common types used across the vLLM client.

use std::ops::Index;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder the server's `null` entries decode to.
pub const MISSING_TEXT: &str = "N/A";

/// Unique identifier for a request, used for log correlation only.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Creates a new random `RequestId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The texts of all requested completions at one point in time.
///
/// Each entry is the cumulative text of one completion, not a delta. Use
/// [`GenerationFrame::delta_since`] to recover the increments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationFrame {
    texts: Vec<String>,
}

impl GenerationFrame {
    /// Creates a frame from completion texts.
    #[must_use]
    pub fn new(texts: Vec<String>) -> Self {
        Self { texts }
    }

    /// Returns the completion texts.
    #[must_use]
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Consumes the frame, returning the completion texts.
    #[must_use]
    pub fn into_texts(self) -> Vec<String> {
        self.texts
    }

    /// Number of completions in this frame.
    #[must_use]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Returns `true` if the frame holds no completions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Returns the text of completion `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.texts.get(index).map(String::as_str)
    }

    /// Iterates over the completion texts.
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.texts.iter()
    }

    /// Returns the text each completion gained since `previous`.
    ///
    /// When the earlier text is not a prefix of the current one (or there is
    /// no earlier frame) the whole current text is returned.
    #[must_use]
    pub fn delta_since<'a>(&'a self, previous: Option<&GenerationFrame>) -> Vec<&'a str> {
        self.texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                previous
                    .and_then(|prev| prev.get(i))
                    .and_then(|before| text.strip_prefix(before))
                    .unwrap_or(text)
            })
            .collect()
    }
}

impl From<Vec<String>> for GenerationFrame {
    fn from(texts: Vec<String>) -> Self {
        Self::new(texts)
    }
}

impl From<GenerationFrame> for Vec<String> {
    fn from(frame: GenerationFrame) -> Self {
        frame.texts
    }
}

impl Index<usize> for GenerationFrame {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.texts[index]
    }
}

impl IntoIterator for GenerationFrame {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.texts.into_iter()
    }
}

impl<'a> IntoIterator for &'a GenerationFrame {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.texts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(texts: &[&str]) -> GenerationFrame {
        GenerationFrame::new(texts.iter().map(|s| (*s).to_string()).collect())
    }

    #[test]
    fn test_delta_since() {
        let first = frame(&["Hello", "Hi"]);
        let second = frame(&["Hello, wor", "Hi there"]);

        assert_eq!(second.delta_since(Some(&first)), vec![", wor", " there"]);
        assert_eq!(first.delta_since(None), vec!["Hello", "Hi"]);
    }

    #[test]
    fn test_delta_since_rewritten_text() {
        let first = frame(&["abc"]);
        let second = frame(&["xyz", "new"]);

        // Not a prefix, and a completion the previous frame did not have.
        assert_eq!(second.delta_since(Some(&first)), vec!["xyz", "new"]);
    }

    #[test]
    fn test_indexing_and_iteration() {
        let f = frame(&["a", "b"]);
        assert_eq!(&f[1], "b");
        assert_eq!(f.get(2), None);
        assert_eq!(f.len(), 2);
        assert_eq!(f.iter().count(), 2);
        assert_eq!(f.into_texts(), vec!["a".to_string(), "b".to_string()]);
    }
}

//! Object paths
//!
//! Syntax:
//!   main/toolbar/okButton        - explicit names
//!   main/QFrame1/QPushButton0    - positional fallback names
//!   main/QFrame0-hidden/apply    - fallback name of an invisible node

use serde::{Deserialize, Serialize};
use std::fmt;

pub const SEPARATOR: char = '/';

/// Suffix marking a positional name synthesized for an invisible node.
pub const HIDDEN_SUFFIX: &str = "-hidden";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct ObjectPath {
    segments: Vec<String>,
}

impl ObjectPath {
    pub fn parse(s: &str) -> Self {
        let segments = if s.is_empty() {
            Vec::new()
        } else {
            s.split(SEPARATOR).map(str::to_string).collect()
        };
        Self { segments }
    }

    pub fn from_segments(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The first `n` segments.
    pub fn prefix(&self, n: usize) -> Self {
        Self {
            segments: self.segments[..n.min(self.segments.len())].to_vec(),
        }
    }
}

/// Fallback name for a node without an explicit name.
pub fn positional_name(tag: &str, ordinal: usize, visible: bool) -> String {
    if visible {
        format!("{}{}", tag, ordinal)
    } else {
        format!("{}{}{}", tag, ordinal, HIDDEN_SUFFIX)
    }
}

/// Whether a segment is positional: a synthesized `<Tag><n>` name or a
/// bare number.
pub fn is_positional(segment: &str) -> bool {
    let core = segment.strip_suffix(HIDDEN_SUFFIX).unwrap_or(segment);
    let digits = core.len() - core.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    digits > 0
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

impl From<&str> for ObjectPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

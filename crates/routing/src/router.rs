//! Tag router - ordered first-match regex table

use regex::Regex;

use crate::error::RoutingError;
use crate::Result;

/// An ordered list of `(pattern, target)` pairs.
///
/// `add` appends; `route` scans in insertion order and returns the first
/// target whose pattern matches the tag. Patterns are unanchored regular
/// expressions, compiled once at registration.
pub struct TagRouter<T> {
    entries: Vec<Entry<T>>,
}

struct Entry<T> {
    pattern: Regex,
    target: T,
}

impl<T> TagRouter<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Append a route. An invalid pattern fails registration and leaves the
    /// table unchanged.
    pub fn add(&mut self, pattern: &str, target: T) -> Result<()> {
        let pattern = Regex::new(pattern).map_err(|source| RoutingError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.entries.push(Entry { pattern, target });
        Ok(())
    }

    /// First target whose pattern matches the tag, in insertion order.
    pub fn route(&self, tag: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|e| e.pattern.is_match(tag))
            .map(|e| &e.target)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(pattern, target)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|e| (e.pattern.as_str(), &e.target))
    }
}

impl<T> Default for TagRouter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TagRouter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagRouter")
            .field("len", &self.entries.len())
            .finish()
    }
}

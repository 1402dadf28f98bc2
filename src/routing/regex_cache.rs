//! Compiled regex store for brace-delimited path segments.
//!
//! Patterns are compiled on first use and kept for the lifetime of the
//! process. A pattern that fails to compile is remembered as `None` so it is
//! logged once and never compiled again.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;

/// Concurrent, append-only map of pattern text to compiled regex.
#[derive(Debug, Default)]
pub struct RegexCache {
    entries: DashMap<String, Option<Arc<Regex>>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the compiled form of `pattern`, compiling it if this is the first use.
    ///
    /// Returns `None` for patterns that do not compile.
    pub fn get(&self, pattern: &str) -> Option<Arc<Regex>> {
        if let Some(entry) = self.entries.get(pattern) {
            return entry.value().clone();
        }

        // Compile outside the shard lock; if another task got there first its
        // result is kept and ours is dropped.
        let compiled = Regex::new(pattern);

        match self.entries.entry(pattern.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let value = match compiled {
                    Ok(regex) => Some(Arc::new(regex)),
                    Err(e) => {
                        tracing::error!(pattern = %pattern, error = %e, "Invalid location regex, segment will never match");
                        None
                    }
                };
                entry.insert(value.clone());
                value
            }
        }
    }

    /// Number of cached patterns, including failed ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

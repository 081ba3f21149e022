//! Memoized structural summaries with a time-based staleness policy.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::EngineResult;

/// How long a cached summary stays servable before it must be recomputed.
pub const STALENESS_WINDOW: Duration = Duration::from_secs(3600);

struct Entry {
    rendered: String,
    created: Instant,
}

/// Per-name cache of rendered structural summaries.
///
/// An entry older than the window is a miss and is recomputed; storage is
/// whole-entry replacement, never a merge. There is no eviction beyond
/// staleness -- the key space is the backend's table/collection list,
/// small and finite for the life of the process.
pub struct SchemaCache {
    window: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::with_window(STALENESS_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached summary for `name` if it is still fresh,
    /// otherwise run `probe` and store its output. Probe errors are not
    /// cached.
    pub fn get_or_probe(
        &self,
        name: &str,
        probe: impl FnOnce() -> EngineResult<String>,
    ) -> EngineResult<String> {
        if let Some(entry) = self.entries.lock().get(name) {
            if entry.created.elapsed() < self.window {
                return Ok(entry.rendered.clone());
            }
        }

        let rendered = probe()?;
        self.entries.lock().insert(
            name.to_string(),
            Entry {
                rendered: rendered.clone(),
                created: Instant::now(),
            },
        );
        Ok(rendered)
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use std::cell::Cell;

    #[test]
    fn fresh_entries_are_served_byte_identical() {
        let cache = SchemaCache::new();
        let calls = Cell::new(0);
        let probe = || {
            calls.set(calls.get() + 1);
            Ok(format!("summary v{}", calls.get()))
        };

        let first = cache.get_or_probe("albums", probe).unwrap();
        let second = cache
            .get_or_probe("albums", || {
                calls.set(calls.get() + 1);
                Ok(format!("summary v{}", calls.get()))
            })
            .unwrap();

        assert_eq!(first, "summary v1");
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn stale_entries_are_recomputed_and_replaced() {
        let cache = SchemaCache::with_window(Duration::from_millis(10));
        cache
            .get_or_probe("albums", || Ok("old".to_string()))
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));

        let refreshed = cache
            .get_or_probe("albums", || Ok("new".to_string()))
            .unwrap();
        assert_eq!(refreshed, "new");
    }

    #[test]
    fn probe_errors_are_not_cached() {
        let cache = SchemaCache::new();
        let err = cache.get_or_probe("albums", || {
            Err(EngineError::Probe("transient".to_string()))
        });
        assert!(err.is_err());

        let recovered = cache
            .get_or_probe("albums", || Ok("fine".to_string()))
            .unwrap();
        assert_eq!(recovered, "fine");
    }

    #[test]
    fn names_are_cached_independently() {
        let cache = SchemaCache::new();
        cache.get_or_probe("a", || Ok("A".to_string())).unwrap();
        let b = cache.get_or_probe("b", || Ok("B".to_string())).unwrap();
        assert_eq!(b, "B");
    }
}

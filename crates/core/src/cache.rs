//! Compile cache for transpiled source.
//!
//! The cache is keyed by the MD5 fingerprint of the source text. The default
//! store is an in-process map that lives for the process lifetime and is
//! never evicted; the trait lets embedders substitute an external store.

use std::collections::HashMap;
use std::sync::Mutex;

/// Pluggable store mapping source fingerprint to transpiled output.
///
/// Implementations must be safe under concurrent access. A get-or-compute
/// race that compiles the same source twice is tolerable; the second `put`
/// simply overwrites with an identical value.
pub trait CompileCache: Send + Sync {
    fn get(&self, fingerprint: &str) -> Option<String>;
    fn put(&self, fingerprint: &str, compiled: String);
}

/// Default process-lifetime cache.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl CompileCache for InMemoryCache {
    fn get(&self, fingerprint: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(fingerprint)
            .cloned()
    }

    fn put(&self, fingerprint: &str, compiled: String) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(fingerprint.to_string(), compiled);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Transpiler registry and the fingerprint-memoized compile flow.
//!
//! Transpiler modules themselves are external collaborators; this module
//! owns the registry slots (coffee-script and babel) and the cache
//! discipline: fingerprint the source, reuse a hit, compile and store a
//! miss. A cache hit never invokes the transpiler.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::CompileCache;
use crate::error::RunnerError;
use crate::hashing::md5_hex;
use crate::language::Language;

/// A source-to-source compiler for one language. Runs synchronously, before
/// spawn.
pub trait Transpiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<String, RunnerError>;
}

/// Registered transpilers, keyed by canonical language.
#[derive(Default)]
pub struct TranspilerRegistry {
    entries: HashMap<Language, Arc<dyn Transpiler>>,
}

impl TranspilerRegistry {
    pub fn new() -> TranspilerRegistry {
        TranspilerRegistry::default()
    }

    /// Register a transpiler for a language. Slots exist for `babel` and
    /// `coffee-script`; registering one for a language whose executor runs
    /// source directly is ignored.
    pub fn register(&mut self, language: Language, transpiler: Arc<dyn Transpiler>) {
        if !language.transpiles() {
            tracing::warn!(%language, "ignoring transpiler for a language without a slot");
            return;
        }
        self.entries.insert(language, transpiler);
    }

    pub fn get(&self, language: Language) -> Option<&Arc<dyn Transpiler>> {
        self.entries.get(&language)
    }
}

/// Transpile `source`, consulting the cache first.
pub fn transpile_with_cache(
    transpiler: &dyn Transpiler,
    cache: &dyn CompileCache,
    source: &str,
) -> Result<String, RunnerError> {
    let fingerprint = md5_hex(source.as_bytes());
    if let Some(hit) = cache.get(&fingerprint) {
        tracing::debug!(%fingerprint, "compile cache hit");
        return Ok(hit);
    }
    let compiled = transpiler.compile(source)?;
    cache.put(&fingerprint, compiled.clone());
    Ok(compiled)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

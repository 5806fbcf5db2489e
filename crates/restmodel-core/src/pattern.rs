//! Shared compiled-regex cache for lookup evaluation and schema validation.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::Regex;

fn cache() -> &'static RwLock<HashMap<String, Regex>> {
    static CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();
    CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Compile `pattern`, reusing a previously compiled instance when possible.
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    if let Ok(guard) = cache().read() {
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }
    let re = Regex::new(pattern)?;
    if let Ok(mut guard) = cache().write() {
        guard.insert(pattern.to_string(), re.clone());
    }
    Ok(re)
}

/// Whether `value` matches `pattern`. Invalid patterns log and fail the
/// match instead of erroring, which is what schema validation wants.
#[must_use]
pub fn matches_pattern(value: &str, pattern: &str) -> bool {
    match compile_pattern(pattern) {
        Ok(re) => re.is_match(value),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "invalid pattern, treating as non-match");
            false
        }
    }
}

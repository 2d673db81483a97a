//! Thread-local cache of compiled regular expressions.
//!
//! Regex-mode locators are evaluated against every line of a file and the
//! same patterns tend to recur across calls from an automation client.
//! Cache is capped at 256 entries; when full it is cleared and rebuilt.

use regex::{Regex, RegexBuilder};
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    // Key is "<i|s>:<pattern>" so the same pattern compiled with and without
    // case folding never collides.
    static REGEX_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
}

/// Get a compiled regex from cache, or compile and cache it.
pub fn get_or_compile(pattern: &str, case_insensitive: bool) -> Result<Regex, regex::Error> {
    let flag = if case_insensitive { 'i' } else { 's' };
    let cache_key = format!("{flag}:{pattern}");

    REGEX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(re) = cache.get(&cache_key) {
            return Ok(re.clone());
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = RegexBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .build()?;
        cache.insert(cache_key, compiled.clone());
        Ok(compiled)
    })
}

/// Clear the cache (mainly for testing).
pub fn clear_cache() {
    REGEX_CACHE.with(|cache| cache.borrow_mut().clear());
}

pub fn cache_size() -> usize {
    REGEX_CACHE.with(|cache| cache.borrow().len())
}

//! Process-wide cache of compiled regexes, so a pattern matched against
//! many inputs compiles each regex once.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use regex::{Regex, RegexBuilder};

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

fn cache() -> &'static RwLock<HashMap<String, Regex>> {
    REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Get or compile `/body/flags`. Returns None when the body doesn't
/// compile; flag validity was already checked at parse time.
pub(crate) fn get_or_compile(body: &str, flags: &str) -> Option<Regex> {
    let key = format!("{flags}\u{0}{body}");

    {
        let cache = cache().read().ok()?;
        if let Some(regex) = cache.get(&key) {
            return Some(regex.clone());
        }
    }

    let mut builder = RegexBuilder::new(body);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            // `u` is implied; the regex crate is always unicode-aware
            _ => &mut builder,
        };
    }

    if let Ok(regex) = builder.build() {
        if let Ok(mut cache) = cache().write() {
            // Another thread may have added it while we were compiling
            if !cache.contains_key(&key) {
                cache.insert(key, regex.clone());
            }
        }
        Some(regex)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regex_cache() {
        let pattern = r"test\d+";
        let regex1 = get_or_compile(pattern, "").unwrap();
        let regex2 = get_or_compile(pattern, "").unwrap();

        assert!(regex1.is_match("test123"));
        assert!(regex2.is_match("test456"));

        // flags are part of the cache key
        assert!(!get_or_compile("abc", "").unwrap().is_match("ABC"));
        assert!(get_or_compile("abc", "i").unwrap().is_match("ABC"));

        // an invalid body is None
        assert!(get_or_compile(r"[", "").is_none());
    }
}

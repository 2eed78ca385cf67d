//! Content-addressed cache keys.

use std::fmt;

use sha2::{Digest, Sha256};

/// File stems longer than this are shortened to a prefix plus a digest.
const MAX_STEM_BYTES: usize = 200;

/// Bytes of the original stem kept in front of the digest.
const STEM_PREFIX_BYTES: usize = 120;

/// Deterministic key for one (text, voice) pair.
///
/// Rendered as `<voice>_<sanitized text>`; the same string is the memory map
/// key and the on-disk file stem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(text: &str, voice: &str) -> Self {
        let stem = format!("{}_{}", sanitize(voice), sanitize(text));
        Self(shorten(stem))
    }

    /// Key string, also used as the file stem.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the cached WAV.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.wav", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip characters that are not portable in file names.
///
/// Removes path separators, Windows-reserved punctuation and control
/// characters, and trims surrounding whitespace and dots.
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    cleaned.trim_matches(|c: char| c.is_whitespace() || c == '.').to_string()
}

fn shorten(stem: String) -> String {
    if stem.len() <= MAX_STEM_BYTES {
        return stem;
    }

    let digest = Sha256::digest(stem.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    let mut cut = STEM_PREFIX_BYTES;
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}~{hex}", &stem[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        let key = CacheKey::new("Alice Smith", "en-US-Jenny");
        assert_eq!(key.as_str(), "en-US-Jenny_Alice Smith");
        assert_eq!(key.file_name(), "en-US-Jenny_Alice Smith.wav");
    }

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(CacheKey::new("Bob", "v1"), CacheKey::new("Bob", "v1"));
        assert_ne!(CacheKey::new("Bob", "v1"), CacheKey::new("Bob", "v2"));
    }

    #[test]
    fn test_sanitize_removes_unsafe_chars() {
        assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j"), "abcdefghij");
        assert_eq!(sanitize("  ..line\nbreak.. "), "linebreak");
        assert_eq!(sanitize("张伟"), "张伟");
    }

    #[test]
    fn test_long_stems_are_digested() {
        let long = "名".repeat(300);
        let key = CacheKey::new(&long, "voice");
        assert!(key.as_str().len() <= MAX_STEM_BYTES);
        assert!(key.as_str().starts_with("voice_"));
        // Distinct long texts stay distinct
        let other = CacheKey::new(&format!("{long}!"), "voice");
        assert_ne!(key, other);
    }
}

//! Shared utility functions used across the codebase.

/// Find the largest valid UTF-8 char boundary at or before `pos`.
///
/// Polyfill for `str::floor_char_boundary` (nightly-only). Use when
/// truncating strings by byte position to avoid panicking on multi-byte
/// characters.
pub fn floor_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut i = pos;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Find the smallest valid UTF-8 char boundary at or after `pos`.
pub fn ceil_char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut i = pos;
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// The trailing window of at most `max_bytes` of `s`, cut on a char boundary.
pub fn tail_window(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    &s[ceil_char_boundary(s, s.len() - max_bytes)..]
}

/// Strip everything except alphanumeric characters.
///
/// Used to compare paragraph *content* while ignoring punctuation,
/// whitespace, and formatting differences.
pub fn simplify_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_boundary_on_multibyte() {
        let s = "a\u{4e16}\u{754c}"; // 1 + 3 + 3 bytes
        assert_eq!(floor_char_boundary(s, 2), 1);
        assert_eq!(floor_char_boundary(s, 4), 4);
        assert_eq!(floor_char_boundary(s, 100), s.len());
    }

    #[test]
    fn ceil_boundary_on_multibyte() {
        let s = "a\u{4e16}\u{754c}";
        assert_eq!(ceil_char_boundary(s, 2), 4);
        assert_eq!(ceil_char_boundary(s, 0), 0);
        assert_eq!(ceil_char_boundary(s, 100), s.len());
    }

    #[test]
    fn tail_window_respects_boundaries() {
        let s = "ab\u{4e16}\u{754c}cd";
        let tail = tail_window(s, 4);
        assert!(tail.len() <= 4);
        assert!(s.ends_with(tail));
        assert_eq!(tail_window(s, 1000), s);
    }

    #[test]
    fn simplify_drops_punctuation() {
        assert_eq!(simplify_alphanumeric("Hello, world! 42"), "Helloworld42");
        assert_eq!(simplify_alphanumeric("...\n\n"), "");
    }
}

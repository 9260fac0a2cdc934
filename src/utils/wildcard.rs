//! Glob matching used by every level of the member filter.
//!
//! Patterns only support `*`, which matches zero or more characters. There
//! are no character classes and no escaping. A pattern must match the whole
//! literal.

/// Returns true if `literal` matches `pattern`.
pub fn matches(
    pattern: &str,
    literal: &str,
) -> bool {
    let pattern = pattern.as_bytes();
    let literal = literal.as_bytes();

    let mut p = 0;
    let mut l = 0;
    // Position of the last '*' seen in the pattern, and the literal position
    // it is currently assumed to match up to.
    let mut star: Option<usize> = None;
    let mut star_literal = 0;

    while l < literal.len() {
        if p < pattern.len() && pattern[p] == b'*' {
            star = Some(p);
            star_literal = l;
            p += 1;
        } else if p < pattern.len() && pattern[p] == literal[l] {
            p += 1;
            l += 1;
        } else if let Some(s) = star {
            // Backtrack: let the last star swallow one more byte.
            p = s + 1;
            star_literal += 1;
            l = star_literal;
        } else {
            return false;
        }
    }

    // Trailing stars match the empty suffix.
    while p < pattern.len() && pattern[p] == b'*' {
        p += 1;
    }
    p == pattern.len()
}

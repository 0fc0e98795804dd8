//! Log text sanitization.
//!
//! Handler diagnostics can carry binary garbage (a panic payload, a chunk of
//! a failed response body). Entries are stored as JSONB, and Postgres rejects
//! `\u0000` inside JSONB strings, so NULs are dropped along with ill-formed
//! byte sequences.

/// Sanitize arbitrary bytes into storable log text: ill-formed UTF-8 is
/// replaced with U+FFFD, NULs are dropped, and the result is trimmed.
pub fn sanitize_bytes(input: &[u8]) -> String {
    let text = String::from_utf8_lossy(input);
    text.chars().filter(|&c| c != '\0').collect::<String>().trim().to_string()
}

/// Sanitize an already-valid string (trims and strips NULs).
pub fn sanitize(input: &str) -> String {
    sanitize_bytes(input.as_bytes())
}

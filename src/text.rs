//! Shared text normalization
//!
//! Disclaimer confirmation and admin command parsing must apply the exact
//! same rule: strip a fixed punctuation set, collapse whitespace, case-fold.

/// Punctuation stripped before matching. Fixed set; do not extend casually,
/// both the disclaimer matcher and the admin grammar depend on it.
pub const STRIPPED_PUNCTUATION: &[char] = &[
    '.', ',', '?', '/', '#', '!', '$', '%', '^', '&', '*', ';', ':', '{', '}', '=', '-', '_', '`',
    '~', '(', ')',
];

/// Normalize free text for matching: strip punctuation, collapse runs of
/// whitespace to single spaces, trim, lowercase.
pub fn normalize(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !STRIPPED_PUNCTUATION.contains(c))
        .collect();
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether a voter message counts as agreeing to the program disclaimer.
pub fn is_agreement(input: &str) -> bool {
    normalize(input) == "agree"
}

/// Strip chat-platform link wrapping from an argument token.
///
/// The platform rewrites phone numbers and URLs as `<tel:+1555|+1555>`,
/// `<url|label>`, or bare `<url>`. Returns the inner value plus whether any
/// unwrapping happened, so callers can log the raw form when it was wrapped.
/// Unwrapped input passes through unchanged, which makes the operation
/// idempotent.
pub fn strip_link_wrapping(token: &str) -> (String, bool) {
    let Some(inner) = token
        .strip_prefix('<')
        .and_then(|rest| rest.strip_suffix('>'))
    else {
        return (token.to_string(), false);
    };

    let cleaned = match inner.split_once('|') {
        // `<tel:+1555|+1555>` and `<url|label>` keep the display side
        Some((_, label)) => label,
        None => inner.strip_prefix("tel:").unwrap_or(inner),
    };
    (cleaned.to_string(), true)
}

//! Merchant key normalization
//!
//! Bank descriptions carry store numbers, reference codes and city names
//! around the merchant itself:
//!
//! ```text
//! MCDONALD'S #41147 OSHAWA        -> MCDONALDS
//! PRESTO APPL/Q8BPBPZ5Z2 TORONTO  -> PRESTOAPPL
//! TST-Nest Uxbridge               -> TSTNEST
//! ```
//!
//! The key is the first two alphabetic words once digits and punctuation are
//! gone, glued together. Two words keeps "PRESTO APPL" apart from other
//! PRESTO charges while still dropping the trailing location.

use std::sync::OnceLock;

use regex::Regex;

/// Key used when a description has no usable letters
pub const UNKNOWN_MERCHANT: &str = "UNKNOWN";

/// Number of leading words kept in a merchant key
const KEY_WORDS: usize = 2;

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("valid regex"))
}

fn non_alpha_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Z\s]").expect("valid regex"))
}

/// Map a raw transaction description to a stable merchant key.
///
/// Never fails: descriptions with nothing left after cleanup map to
/// [`UNKNOWN_MERCHANT`].
pub fn normalize(description_raw: &str) -> String {
    let upper = description_raw.trim().to_uppercase();
    if upper.is_empty() {
        return UNKNOWN_MERCHANT.to_string();
    }

    let without_digits = digits_re().replace_all(&upper, "");
    let letters_only = non_alpha_re().replace_all(&without_digits, " ");

    let key: String = letters_only
        .split_whitespace()
        .take(KEY_WORDS)
        .collect::<Vec<_>>()
        .concat();

    if key.is_empty() {
        UNKNOWN_MERCHANT.to_string()
    } else {
        key
    }
}

/// Human-readable merchant label: the raw description, trimmed and capped
pub fn display_name(description_raw: &str, max_chars: usize) -> String {
    let trimmed = description_raw.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_chars).collect()
    }
}

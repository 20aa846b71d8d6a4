//! Compiled-in allow-lists and file signatures
//!
//! Everything the validation gate trusts lives here as static data. None of it
//! is read from configuration: widening the set of accepted files is a code
//! change, reviewed like one.
//!
//! # Examples
//!
//! ```rust
//! use acton_ingest::signatures;
//!
//! assert!(signatures::is_allowed_mime_type("image/png"));
//! assert!(signatures::is_allowed_extension("jpeg"));
//! assert_eq!(signatures::signatures_for("image/png"), Some(&["89504e47"][..]));
//!
//! // Text formats have no reliable magic number
//! assert_eq!(signatures::signatures_for("text/plain"), None);
//! ```

use once_cell::sync::Lazy;
use phf::phf_map;
use regex::RegexSet;

/// Maximum accepted file size in bytes (100 MiB)
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Number of leading bytes inspected for the magic-number check
pub const SIGNATURE_LENGTH: usize = 4;

/// Declared MIME types accepted by the gate
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "application/zip",
    "text/plain",
    "application/json",
];

/// Filename extensions accepted by the gate (lower-case, without the dot)
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "pdf", "zip", "txt", "json",
];

/// Hex-encoded leading-byte prefixes per declared MIME type
///
/// Types missing from this map (`text/plain`, `application/json`, `image/webp`)
/// skip the signature check.
static SIGNATURES: phf::Map<&'static str, &'static [&'static str]> = phf_map! {
    "image/jpeg" => &["ffd8ffe0", "ffd8ffe1", "ffd8ffe2"],
    "image/png" => &["89504e47"],
    "image/gif" => &["47494638"],
    "application/pdf" => &["25504446"],
    "application/zip" => &["504b0304", "504b0506"],
};

/// Content patterns rejected in `text/*` uploads, paired with a label for logs
pub const MALICIOUS_PATTERNS: &[(&str, &str)] = &[
    (r"(?i)<script", "<script"),
    (r"(?i)javascript:", "javascript:"),
    (r"(?i)<iframe", "<iframe"),
    (r"(?i)eval\(", "eval("),
    (r"(?i)onclick=", "onclick="),
];

// Compiled from the literals above; `test_pattern_set_compiles` guards them
static MALICIOUS_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(MALICIOUS_PATTERNS.iter().map(|(pattern, _)| *pattern))
        .expect("malicious content patterns must compile")
});

/// Returns true if `mime_type` is on the MIME allow-list
#[must_use]
pub fn is_allowed_mime_type(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type)
}

/// Returns true if `extension` (already lower-cased) is on the extension allow-list
#[must_use]
pub fn is_allowed_extension(extension: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension)
}

/// Returns the registered signature prefixes for a declared MIME type
#[must_use]
pub fn signatures_for(mime_type: &str) -> Option<&'static [&'static str]> {
    SIGNATURES.get(mime_type).copied()
}

/// Returns the label of the first malicious pattern found in `text`
#[must_use]
pub fn find_malicious_pattern(text: &str) -> Option<&'static str> {
    MALICIOUS_SET
        .matches(text)
        .iter()
        .next()
        .map(|index| MALICIOUS_PATTERNS[index].1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_set_compiles() {
        let set = RegexSet::new(MALICIOUS_PATTERNS.iter().map(|(pattern, _)| *pattern));
        assert!(set.is_ok());
        assert_eq!(MALICIOUS_SET.len(), MALICIOUS_PATTERNS.len());
    }

    #[test]
    fn test_signature_table() {
        assert_eq!(
            signatures_for("image/jpeg"),
            Some(&["ffd8ffe0", "ffd8ffe1", "ffd8ffe2"][..])
        );
        assert_eq!(signatures_for("application/zip").map(<[_]>::len), Some(2));
        assert_eq!(signatures_for("application/json"), None);
        assert_eq!(signatures_for("image/webp"), None);
    }

    #[test]
    fn test_every_signed_type_is_allowed() {
        for mime in SIGNATURES.keys() {
            assert!(is_allowed_mime_type(mime), "{mime} has a signature but is not allowed");
        }
    }

    #[test]
    fn test_allow_lists() {
        assert!(is_allowed_mime_type("application/json"));
        assert!(!is_allowed_mime_type("application/x-msdownload"));
        assert!(!is_allowed_mime_type("IMAGE/PNG"));

        assert!(is_allowed_extension("txt"));
        assert!(!is_allowed_extension("exe"));
        assert!(!is_allowed_extension("svg"));
    }

    #[test]
    fn test_find_malicious_pattern() {
        assert_eq!(find_malicious_pattern("hello <ScRiPt>alert(1)"), Some("<script"));
        assert_eq!(find_malicious_pattern("a href=JAVASCRIPT:void(0)"), Some("javascript:"));
        assert_eq!(find_malicious_pattern("x = EVAL(y)"), Some("eval("));
        assert_eq!(find_malicious_pattern("<div OnClick=go()>"), Some("onclick="));
        assert_eq!(find_malicious_pattern("<IFRAME src=x>"), Some("<iframe"));
        assert_eq!(find_malicious_pattern("plain old notes"), None);
        assert_eq!(find_malicious_pattern("evaluation (draft)"), None);
    }
}

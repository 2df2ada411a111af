//! Positional URL validation.

use url::Url;

/// Splits inputs into parseable URLs and rejected entries, keeping order.
///
/// Any absolute URL is accepted, including engine pseudo-URLs such as
/// `ytsearch:query`; the engine decides what it supports.
pub(crate) fn partition_urls(inputs: &[String]) -> (Vec<String>, Vec<String>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for input in inputs {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        match Url::parse(trimmed) {
            Ok(_) => accepted.push(trimmed.to_string()),
            Err(_) => rejected.push(trimmed.to_string()),
        }
    }
    (accepted, rejected)
}

//! Error message sanitization to keep context data and credentials out of logs.
//!
//! Transport failures usually carry the request URL, and the fetch URL carries
//! the whole evaluation context as query parameters. This module strips:
//!
//! - URL query strings
//! - Unleash client keys (`<project>:<environment>.<secret>`)
//! - IPv4 addresses
//! - Email addresses

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Patterns applied in order; the query string goes first so that
    /// context values inside it are removed as a whole.
    static ref PATTERNS: Vec<(Regex, &'static str)> = vec![
        // Query strings (e.g., ?appName=app&userId=u1)
        (Regex::new(r"\?[^\s)\]]+").unwrap(), "?[QUERY]"),
        // Client keys (e.g., *:development.5a2b1c...)
        (Regex::new(r"[\w*\[\]-]+:[\w-]+\.[A-Za-z0-9]{16,}").unwrap(), "[CLIENT_KEY]"),
        // IPv4 addresses
        (Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap(), "[IP]"),
        // Email addresses (including + for plus addressing)
        (Regex::new(r"[\w.+-]+@[\w.-]+\.\w+").unwrap(), "[EMAIL]"),
    ];
}

/// Sanitize an error message by removing sensitive information.
///
/// ```
/// use unleash_proxy_client::error::sanitize_message;
///
/// let message = "error sending request for url (https://proxy.example.com/api?userId=u1)";
/// let sanitized = sanitize_message(message);
/// assert!(!sanitized.contains("userId"));
/// ```
pub fn sanitize_message(message: &str) -> String {
    let mut result = message.to_string();

    for (pattern, replacement) in PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }

    result
}

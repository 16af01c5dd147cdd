//! Request headers shared by the toggle fetch and the metrics post.

use std::collections::HashMap;

use super::transport::HttpRequest;

pub const SDK_NAME: &str = "unleash-client-rust";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HEADER_APP_NAME: &str = "unleash-appname";
pub const HEADER_CONNECTION_ID: &str = "unleash-connection-id";
pub const HEADER_SDK: &str = "unleash-sdk";

/// Headers the client sets itself. Custom headers with these names are
/// dropped, whatever their case.
pub const RESERVED_HEADERS: [&str; 10] = [
    "content-type",
    "authorization",
    "if-none-match",
    "accept",
    "cache",
    "cache-control",
    HEADER_APP_NAME,
    HEADER_CONNECTION_ID,
    HEADER_SDK,
    "host",
];

/// Value of the sdk header, `<client-name>:<semver>`.
pub fn sdk_identifier() -> String {
    format!("{}:{}", SDK_NAME, SDK_VERSION)
}

pub fn is_reserved(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// Supplies extra headers at request time, e.g. short-lived tokens.
pub trait CustomHeadersProvider: Send + Sync {
    fn custom_headers(&self) -> HashMap<String, String>;
}

/// Provider that adds nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCustomHeadersProvider;

impl CustomHeadersProvider for DefaultCustomHeadersProvider {
    fn custom_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Append caller-supplied headers to a request, skipping reserved names.
///
/// Static headers go first, provider headers after them, each set in sorted
/// key order so requests are reproducible. A later header replaces an
/// earlier one whose name differs only in case, so provider headers win.
pub fn merge_custom_headers(
    mut request: HttpRequest,
    static_headers: &HashMap<String, String>,
    provider: &dyn CustomHeadersProvider,
) -> HttpRequest {
    let dynamic = provider.custom_headers();

    for headers in [static_headers, &dynamic] {
        let mut names: Vec<&String> = headers.keys().collect();
        names.sort();

        for name in names {
            if is_reserved(name) {
                tracing::debug!("Ignoring custom header {} that overrides a reserved header", name);
                continue;
            }
            request
                .headers
                .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            request = request.header(name.clone(), headers[name].clone());
        }
    }

    request
}

mod client;
pub mod headers;
pub mod transport;

pub use client::ReqwestTransport;
pub use headers::{
    merge_custom_headers, sdk_identifier, CustomHeadersProvider, DefaultCustomHeadersProvider,
    SDK_NAME, SDK_VERSION,
};
pub use transport::{HttpRequest, HttpResponse, Method, Transport};

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::transport::{HttpRequest, HttpResponse, Method, Transport};
use crate::error::{ErrorCode, Result, UnleashError};

/// [`Transport`] backed by a shared `reqwest` client.
///
/// reqwest keeps no response cache, so conditional requests always reach the
/// server.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            UnleashError::with_source_sanitized(
                ErrorCode::HttpInitFailed,
                "Failed to create HTTP client",
                e,
            )
        })?;

        Ok(Self { client })
    }

    /// Wrap an existing client, e.g. one configured with a proxy.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn convert_error(&self, error: reqwest::Error) -> UnleashError {
        let message = if error.is_timeout() {
            "Request timed out"
        } else if error.is_connect() {
            "Connection failed"
        } else {
            "Request failed"
        };
        UnleashError::with_source_sanitized(ErrorCode::NoResponse, message, error)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| self.convert_error(e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        let bytes = response.bytes().await.map_err(|e| self.convert_error(e))?;
        let body = if bytes.is_empty() {
            None
        } else {
            Some(bytes.to_vec())
        };

        tracing::debug!("{} request completed with status {}", request.method.as_str(), status);

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

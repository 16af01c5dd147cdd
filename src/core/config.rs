use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::bootstrap::Bootstrap;
use super::metrics::DEFAULT_METRICS_INTERVAL_SECS;
use super::poller::DEFAULT_REFRESH_INTERVAL_SECS;
use crate::error::{ErrorCode, Result, UnleashError};
use crate::http::{CustomHeadersProvider, DefaultCustomHeadersProvider};
use crate::types::DEFAULT_APP_NAME;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS);
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(DEFAULT_METRICS_INTERVAL_SECS);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_ENVIRONMENT: &str = "default";

#[derive(Clone)]
pub struct UnleashOptions {
    pub url: String,
    pub client_key: String,
    /// Zero fetches once on start and never again.
    pub refresh_interval: Duration,
    pub metrics_interval: Duration,
    pub disable_metrics: bool,
    pub app_name: String,
    pub environment: Option<String>,
    /// Initial context fields, merged the same way as `update_context`.
    pub context: HashMap<String, String>,
    pub custom_headers: HashMap<String, String>,
    pub custom_headers_provider: Arc<dyn CustomHeadersProvider>,
    /// Seeds the store at construction.
    pub bootstrap: Bootstrap,
    pub timeout: Duration,
}

impl fmt::Debug for UnleashOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnleashOptions")
            .field("url", &self.url)
            .field("client_key", &"[REDACTED]")
            .field("refresh_interval", &self.refresh_interval)
            .field("metrics_interval", &self.metrics_interval)
            .field("disable_metrics", &self.disable_metrics)
            .field("app_name", &self.app_name)
            .field("environment", &self.environment)
            .field("context", &self.context)
            .field("custom_headers", &self.custom_headers.keys().collect::<Vec<_>>())
            .field("bootstrap", &self.bootstrap)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl UnleashOptions {
    pub fn new(url: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_key: client_key.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            metrics_interval: DEFAULT_METRICS_INTERVAL,
            disable_metrics: false,
            app_name: DEFAULT_APP_NAME.to_string(),
            environment: Some(DEFAULT_ENVIRONMENT.to_string()),
            context: HashMap::new(),
            custom_headers: HashMap::new(),
            custom_headers_provider: Arc::new(DefaultCustomHeadersProvider),
            bootstrap: Bootstrap::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(UnleashError::config_error(
                ErrorCode::ConfigMissingRequired,
                "Unleash URL is required",
            ));
        }

        let url = Url::parse(&self.url).map_err(|e| {
            UnleashError::config_error(
                ErrorCode::ConfigInvalidUrl,
                format!("Invalid Unleash URL {}: {}", self.url, e),
            )
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UnleashError::config_error(
                ErrorCode::ConfigInvalidUrl,
                format!("Unsupported URL scheme: {}", url.scheme()),
            ));
        }

        if self.client_key.is_empty() {
            return Err(UnleashError::config_error(
                ErrorCode::ConfigMissingRequired,
                "Client key is required",
            ));
        }

        if self.metrics_interval.is_zero() && !self.disable_metrics {
            return Err(UnleashError::config_error(
                ErrorCode::ConfigInvalidInterval,
                "Metrics interval must be positive",
            ));
        }

        Ok(())
    }

    pub fn builder(url: impl Into<String>, client_key: impl Into<String>) -> UnleashOptionsBuilder {
        UnleashOptionsBuilder::new(url, client_key)
    }
}

pub struct UnleashOptionsBuilder {
    options: UnleashOptions,
}

impl UnleashOptionsBuilder {
    /// Start from the defaults for `url` and `client_key`.
    pub fn new(url: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            options: UnleashOptions::new(url, client_key),
        }
    }

    /// Set the refresh interval. Zero disables the recurring fetch.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.options.refresh_interval = interval;
        self
    }

    /// Set the metrics flush interval.
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.options.metrics_interval = interval;
        self
    }

    /// Turn metrics collection off.
    pub fn disable_metrics(mut self, disabled: bool) -> Self {
        self.options.disable_metrics = disabled;
        self
    }

    /// Set the app name.
    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.options.app_name = app_name.into();
        self
    }

    /// Set the environment.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.options.environment = Some(environment.into());
        self
    }

    /// Send no environment.
    pub fn no_environment(mut self) -> Self {
        self.options.environment = None;
        self
    }

    /// Set the initial context fields.
    pub fn context(mut self, context: HashMap<String, String>) -> Self {
        self.options.context = context;
        self
    }

    /// Add one static custom header.
    pub fn custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.custom_headers.insert(name.into(), value.into());
        self
    }

    /// Replace all static custom headers.
    pub fn custom_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.options.custom_headers = headers;
        self
    }

    /// Set the provider queried for headers on every request.
    pub fn custom_headers_provider(mut self, provider: Arc<dyn CustomHeadersProvider>) -> Self {
        self.options.custom_headers_provider = provider;
        self
    }

    /// Seed the store before the first fetch.
    pub fn bootstrap(mut self, bootstrap: impl Into<Bootstrap>) -> Self {
        self.options.bootstrap = bootstrap.into();
        self
    }

    /// Set the HTTP request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Build the options.
    pub fn build(self) -> UnleashOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://app.unleash-hosted.com/hosted/api/proxy";

    #[test]
    fn test_defaults() {
        let options = UnleashOptions::new(URL, "key");

        assert_eq!(options.refresh_interval, Duration::from_secs(15));
        assert_eq!(options.metrics_interval, Duration::from_secs(30));
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.app_name, DEFAULT_APP_NAME);
        assert_eq!(options.environment.as_deref(), Some("default"));
        assert!(!options.disable_metrics);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let options = UnleashOptions::new("not a url", "key");
        assert_eq!(options.validate().unwrap_err().code, ErrorCode::ConfigInvalidUrl);

        let options = UnleashOptions::new("ftp://example.com", "key");
        assert_eq!(options.validate().unwrap_err().code, ErrorCode::ConfigInvalidUrl);
    }

    #[test]
    fn test_missing_client_key() {
        let options = UnleashOptions::new(URL, "");
        assert_eq!(
            options.validate().unwrap_err().code,
            ErrorCode::ConfigMissingRequired
        );
    }

    #[test]
    fn test_zero_metrics_interval() {
        let options = UnleashOptions::builder(URL, "key")
            .metrics_interval(Duration::ZERO)
            .build();
        assert_eq!(
            options.validate().unwrap_err().code,
            ErrorCode::ConfigInvalidInterval
        );

        let options = UnleashOptions::builder(URL, "key")
            .metrics_interval(Duration::ZERO)
            .disable_metrics(true)
            .build();
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_client_key() {
        let options = UnleashOptions::new(URL, "super-secret");
        let debug = format!("{:?}", options);

        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}

use thiserror::Error;

pub mod sanitizer;

pub use sanitizer::sanitize_message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Fetch cycle classifications
    Url,
    NoResponse,
    Network,
    Decoding,
    UnhandledStatusCode,

    // Metrics delivery
    Serialization,
    MetricsSendFailed,

    // Configuration errors
    ConfigInvalidUrl,
    ConfigMissingRequired,
    ConfigInvalidInterval,

    // Bootstrap
    BootstrapLoadFailed,

    // Transport setup
    HttpInitFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Url => "URL",
            ErrorCode::NoResponse => "NO_RESPONSE",
            ErrorCode::Network => "NETWORK",
            ErrorCode::Decoding => "DECODING",
            ErrorCode::UnhandledStatusCode => "UNHANDLED_STATUS_CODE",
            ErrorCode::Serialization => "SERIALIZATION",
            ErrorCode::MetricsSendFailed => "METRICS_SEND_FAILED",
            ErrorCode::ConfigInvalidUrl => "CONFIG_INVALID_URL",
            ErrorCode::ConfigMissingRequired => "CONFIG_MISSING_REQUIRED",
            ErrorCode::ConfigInvalidInterval => "CONFIG_INVALID_INTERVAL",
            ErrorCode::BootstrapLoadFailed => "BOOTSTRAP_LOAD_FAILED",
            ErrorCode::HttpInitFailed => "HTTP_INIT_FAILED",
        }
    }

    /// Whether this code is one of the fetch cycle classifications.
    pub fn is_fetch_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::Url
                | ErrorCode::NoResponse
                | ErrorCode::Network
                | ErrorCode::Decoding
                | ErrorCode::UnhandledStatusCode
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ErrorCode::ConfigInvalidUrl
                | ErrorCode::ConfigMissingRequired
                | ErrorCode::ConfigInvalidInterval
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("[{code}] {message}")]
pub struct UnleashError {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status of the response that produced this error, when there was one.
    pub status: Option<u16>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl UnleashError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            source: Some(Box::new(source)),
        }
    }

    /// Create an error whose message (and the source's rendering folded into
    /// it) has been passed through [`sanitize_message`].
    ///
    /// The source itself is dropped: its `Display` output is what leaks.
    pub fn with_source_sanitized(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error,
    ) -> Self {
        let message = format!("{}: {}", message.into(), source);
        Self::new(code, sanitize_message(&message))
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn config_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }

    pub fn url(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Url, message)
    }

    pub fn no_response(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NoResponse, message)
    }

    pub fn network(status: u16) -> Self {
        Self::new(
            ErrorCode::Network,
            format!("Server responded with status {}", status),
        )
        .with_status(status)
    }

    pub fn unhandled_status(status: u16) -> Self {
        Self::new(
            ErrorCode::UnhandledStatusCode,
            format!("Unhandled status code {}", status),
        )
        .with_status(status)
    }

    pub fn decoding(source: serde_json::Error) -> Self {
        Self::with_source(
            ErrorCode::Decoding,
            format!("Failed to decode toggles: {}", source),
            source,
        )
    }

    pub fn is_fetch_error(&self) -> bool {
        self.code.is_fetch_error()
    }

    pub fn is_config_error(&self) -> bool {
        self.code.is_config_error()
    }
}

pub type Result<T> = std::result::Result<T, UnleashError>;

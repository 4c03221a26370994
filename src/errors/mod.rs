//! Error types for the OFSC client.

use std::fmt;
use thiserror::Error;

/// Result type alias for OFSC operations.
pub type OfscResult<T> = Result<T, OfscError>;

/// Error kinds for categorizing OFSC errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfscErrorKind {
    // Caller input
    /// Malformed caller input, rejected before any network call.
    ValidationError,
    /// Invalid client configuration.
    InvalidConfiguration,
    /// Credentials are missing from the configuration or environment.
    MissingCredentials,

    // Authentication
    /// The credential exchange failed, or a renewed token was rejected again.
    AuthError,

    // Request outcomes
    /// Terminal non-success HTTP response.
    RequestError,
    /// Still rate limited after the retry budget ran out.
    RateLimitExhausted,

    // Network
    /// Connection failed.
    ConnectionFailed,
    /// Request timeout.
    Timeout,

    // Payloads
    /// Failed to deserialize a response body.
    DeserializationError,
    /// Malformed XML handed to the export helpers.
    XmlParseError,

    // Local store
    /// Item already present in the local store.
    AlreadyExists,
}

impl fmt::Display for OfscErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationError => write!(f, "validation_error"),
            Self::InvalidConfiguration => write!(f, "invalid_configuration"),
            Self::MissingCredentials => write!(f, "missing_credentials"),
            Self::AuthError => write!(f, "auth_error"),
            Self::RequestError => write!(f, "request_error"),
            Self::RateLimitExhausted => write!(f, "rate_limit_exhausted"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::DeserializationError => write!(f, "deserialization_error"),
            Self::XmlParseError => write!(f, "xml_parse_error"),
            Self::AlreadyExists => write!(f, "already_exists"),
        }
    }
}

/// OFSC error with detailed information.
#[derive(Error, Debug)]
pub struct OfscError {
    /// Error kind.
    kind: OfscErrorKind,
    /// Error message.
    message: String,
    /// HTTP status code.
    status_code: Option<u16>,
    /// Response body text of the failed request.
    body: Option<String>,
    /// Last Retry-After hint in seconds.
    retry_after: Option<u64>,
    /// Underlying cause.
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for OfscError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)?;
        if let Some(code) = self.status_code {
            write!(f, " (HTTP {})", code)?;
        }
        if let Some(ref body) = self.body {
            if !body.is_empty() {
                write!(f, ": {}", body)?;
            }
        }
        Ok(())
    }
}

impl OfscError {
    /// Creates a new OFSC error.
    pub fn new(kind: OfscErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            body: None,
            retry_after: None,
            cause: None,
        }
    }

    /// Sets the HTTP status code.
    pub fn with_status(mut self, code: u16) -> Self {
        self.status_code = Some(code);
        self
    }

    /// Sets the response body text.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets the Retry-After hint.
    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    /// Sets the underlying cause.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &OfscErrorKind {
        &self.kind
    }

    /// Gets the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the HTTP status code.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Gets the response body text.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Gets the Retry-After hint in seconds.
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// Returns true for credential exchange failures and repeated 401s.
    pub fn is_auth_error(&self) -> bool {
        self.kind == OfscErrorKind::AuthError
    }

    /// Returns true for terminal HTTP outcomes, rate-limit exhaustion included.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self.kind,
            OfscErrorKind::RequestError | OfscErrorKind::RateLimitExhausted
        )
    }

    /// Returns true if a caller may reasonably try the whole operation again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            OfscErrorKind::RateLimitExhausted
                | OfscErrorKind::ConnectionFailed
                | OfscErrorKind::Timeout
        ) || matches!(self.status_code, Some(500..=599))
    }

    // Convenience constructors

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(OfscErrorKind::ValidationError, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(OfscErrorKind::InvalidConfiguration, message)
    }

    /// Creates an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(OfscErrorKind::AuthError, message)
    }

    /// Creates a terminal request error from a status and body.
    pub fn request(status: u16, body: impl Into<String>) -> Self {
        Self::new(OfscErrorKind::RequestError, "Request failed")
            .with_status(status)
            .with_body(body)
    }

    /// Creates a rate limit exhaustion error.
    pub fn rate_limit_exhausted(retries: u32, body: impl Into<String>) -> Self {
        Self::new(
            OfscErrorKind::RateLimitExhausted,
            format!("Still rate limited after {} retries", retries),
        )
        .with_status(429)
        .with_body(body)
    }

    /// Creates a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(OfscErrorKind::Timeout, message)
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::new(OfscErrorKind::DeserializationError, message)
    }
}

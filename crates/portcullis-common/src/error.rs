//! Error types for transport and request construction

use smol_str::SmolStr;

/// Transport-level errors that occur during HTTP communication
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// Failed to establish connection to server
    #[error("Connection error: {0}")]
    #[diagnostic(code(portcullis::transport::connect))]
    Connect(String),

    /// Request timed out
    #[error("Request timeout")]
    #[diagnostic(
        code(portcullis::transport::timeout),
        help("raise `TransportOptions::timeout` if the provider is slow")
    )]
    Timeout,

    /// Redirect limit exceeded
    #[error("Too many redirects")]
    #[diagnostic(code(portcullis::transport::redirects))]
    TooManyRedirects,

    /// Request construction failed (malformed URI, headers, etc.)
    #[error("Invalid request: {0}")]
    #[diagnostic(code(portcullis::transport::invalid_request))]
    InvalidRequest(String),

    /// Other transport error
    #[error("Transport error: {0}")]
    #[diagnostic(code(portcullis::transport::other))]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wrap an arbitrary client error.
    pub fn other(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(e))
    }
}

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_redirect() {
            Self::TooManyRedirects
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() || e.is_request() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Other(Box::new(e))
        }
    }
}

/// Malformed caller input, rejected before anything touches the network.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("invalid request: {message}")]
#[diagnostic(code(portcullis::request::invalid))]
pub struct InvalidRequestError {
    message: SmolStr,
    #[help]
    help: Option<SmolStr>,
}

impl InvalidRequestError {
    /// Create a new error with the given message.
    pub fn new(message: impl Into<SmolStr>) -> Self {
        Self {
            message: message.into(),
            help: None,
        }
    }

    /// Add help text to this error.
    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<http::Error> for InvalidRequestError {
    fn from(e: http::Error) -> Self {
        Self::new(e.to_string()).with_help("verify request URIs and headers are valid")
    }
}

impl From<url::ParseError> for InvalidRequestError {
    fn from(e: url::ParseError) -> Self {
        Self::new(format!("malformed URI: {e}"))
    }
}

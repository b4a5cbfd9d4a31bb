use portcullis_common::error::{InvalidRequestError, TransportError};
use portcullis_common::storage::{StorageError, TokenKey};
use smol_str::SmolStr;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Longest response excerpt carried in error details.
pub const MAX_BODY_EXCERPT: usize = 512;

/// OAuth protocol error for token exchanges and authorized requests
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
#[error("{kind}")]
pub struct OAuthError {
    #[diagnostic_source]
    kind: OAuthErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<SmolStr>,
    context: Option<SmolStr>,
    details: Option<SmolStr>,
}

/// Error categories for OAuth operations
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum OAuthErrorKind {
    /// Provider response was malformed or carried an error
    #[error("token response error: {0}")]
    #[diagnostic(
        code(portcullis_oauth::token_response),
        help("inspect the response excerpt in the error details")
    )]
    TokenResponse(SmolStr),

    /// No token in storage for an authorized call
    #[error("no token stored for {0}")]
    #[diagnostic(
        code(portcullis_oauth::token_not_found),
        help("complete the authorization flow first")
    )]
    TokenNotFound(TokenKey),

    /// Stored token is past its end of life
    #[error("token for {0} has expired")]
    #[diagnostic(
        code(portcullis_oauth::token_expired),
        help("refresh the token or re-run the authorization flow")
    )]
    TokenExpired(TokenKey),

    /// OAuth2 anti-forgery state mismatch
    #[error("authorization state mismatch")]
    #[diagnostic(code(portcullis_oauth::state_verification))]
    StateVerification,

    /// Refresh requested for a token without a refresh token
    #[error("no refresh token available")]
    #[diagnostic(code(portcullis_oauth::missing_refresh_token))]
    MissingRefreshToken,

    /// Malformed caller input
    #[error("invalid request")]
    #[diagnostic(code(portcullis_oauth::invalid_request))]
    InvalidRequest,

    /// Transport failure, the source is the transport error unchanged
    #[error("transport error")]
    #[diagnostic(code(portcullis_oauth::transport))]
    Transport,

    /// Token storage failure
    #[error("storage error")]
    #[diagnostic(code(portcullis_oauth::storage))]
    Storage,
}

impl OAuthError {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: OAuthErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
            details: None,
        }
    }

    /// Get the error kind
    pub fn kind(&self) -> &OAuthErrorKind {
        &self.kind
    }

    /// Get the source error if present
    pub fn source_err(&self) -> Option<&BoxError> {
        self.source.as_ref()
    }

    /// Get the context string if present
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Get the details if present (response excerpts live here)
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Add help text to this error
    pub fn with_help(mut self, help: impl Into<SmolStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add context to this error
    pub fn with_context(mut self, context: impl Into<SmolStr>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add details to this error
    pub fn with_details(mut self, details: impl Into<SmolStr>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Malformed or error-carrying provider response; keeps a body excerpt.
    pub fn token_response(message: impl Into<SmolStr>, body: &[u8]) -> Self {
        Self::new(OAuthErrorKind::TokenResponse(message.into()), None)
            .with_details(body_excerpt(body))
    }

    pub fn token_not_found(key: TokenKey) -> Self {
        Self::new(OAuthErrorKind::TokenNotFound(key), None)
    }

    pub fn token_expired(key: TokenKey) -> Self {
        Self::new(OAuthErrorKind::TokenExpired(key), None)
    }

    pub fn state_verification() -> Self {
        Self::new(OAuthErrorKind::StateVerification, None)
    }

    pub fn missing_refresh_token() -> Self {
        Self::new(OAuthErrorKind::MissingRefreshToken, None)
    }

    pub fn invalid_request(message: impl Into<SmolStr>) -> Self {
        Self::new(OAuthErrorKind::InvalidRequest, None).with_context(message)
    }
}

/// First [`MAX_BODY_EXCERPT`] bytes of a body, cut on a char boundary.
pub fn body_excerpt(body: &[u8]) -> SmolStr {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_BODY_EXCERPT {
        return SmolStr::new(text);
    }
    let mut end = MAX_BODY_EXCERPT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    smol_str::format_smolstr!("{}...", &text[..end])
}

// From impls for common error types

impl From<TransportError> for OAuthError {
    fn from(e: TransportError) -> Self {
        Self::new(OAuthErrorKind::Transport, Some(Box::new(e)))
    }
}

impl From<InvalidRequestError> for OAuthError {
    fn from(e: InvalidRequestError) -> Self {
        let msg = SmolStr::new(e.message());
        Self::new(OAuthErrorKind::InvalidRequest, Some(Box::new(e))).with_context(msg)
    }
}

impl From<StorageError> for OAuthError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::TokenNotFound(key) => Self::token_not_found(key),
            e => {
                let msg = smol_str::format_smolstr!("{:?}", e);
                Self::new(OAuthErrorKind::Storage, Some(Box::new(e)))
                    .with_context(msg)
                    .with_help("verify token storage is accessible and writable")
            }
        }
    }
}

impl From<url::ParseError> for OAuthError {
    fn from(e: url::ParseError) -> Self {
        let msg = smol_str::format_smolstr!("malformed URI: {e}");
        Self::new(OAuthErrorKind::InvalidRequest, Some(Box::new(e))).with_context(msg)
    }
}

impl From<serde_json::Error> for OAuthError {
    fn from(e: serde_json::Error) -> Self {
        let msg = smol_str::format_smolstr!("{:?}", e);
        Self::new(OAuthErrorKind::InvalidRequest, Some(Box::new(e)))
            .with_context(msg)
            .with_help("check OAuth request parameters are serializable")
    }
}

pub type Result<T> = core::result::Result<T, OAuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_truncates_on_char_boundary() {
        let body = "é".repeat(400);
        let excerpt = body_excerpt(body.as_bytes());
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.len() <= MAX_BODY_EXCERPT + 3);
    }

    #[test]
    fn token_response_keeps_body() {
        let err = OAuthError::token_response("unable to parse response", b"<html>");
        assert_eq!(err.details(), Some("<html>"));
        assert!(matches!(err.kind(), OAuthErrorKind::TokenResponse(_)));
    }

    #[test]
    fn storage_miss_maps_to_token_not_found() {
        let key = TokenKey::new("svc", "default");
        let err = OAuthError::from(StorageError::TokenNotFound(key.clone()));
        assert!(matches!(err.kind(), OAuthErrorKind::TokenNotFound(k) if *k == key));
    }
}

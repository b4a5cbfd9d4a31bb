use smol_str::SmolStr;
use url::Url;

/// The registered application's key/secret pair, plus the callback the
/// provider redirects the user to after consent.
#[derive(Clone, PartialEq, Eq)]
pub struct ConsumerCredentials {
    key: SmolStr,
    secret: SmolStr,
    callback_url: Option<Url>,
}

impl ConsumerCredentials {
    /// Create credentials without a callback (OAuth1 falls back to `oob`).
    pub fn new(key: impl Into<SmolStr>, secret: impl Into<SmolStr>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            callback_url: None,
        }
    }

    /// Create credentials with a callback URL.
    pub fn with_callback(
        key: impl Into<SmolStr>,
        secret: impl Into<SmolStr>,
        callback_url: Url,
    ) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
            callback_url: Some(callback_url),
        }
    }

    /// Consumer key (OAuth1) or client id (OAuth2).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consumer secret (OAuth1) or client secret (OAuth2).
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Callback / redirect URI, if configured.
    pub fn callback_url(&self) -> Option<&Url> {
        self.callback_url.as_ref()
    }
}

impl std::fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .field("callback_url", &self.callback_url.as_ref().map(Url::as_str))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let creds = ConsumerCredentials::new("key", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("key"));
        assert!(!shown.contains("hunter2"));
    }
}

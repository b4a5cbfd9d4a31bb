use portcullis_common::token::{EndOfLife, ExtraParams};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Where an OAuth1 token sits in the three-legged flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    /// Temporary credentials; the user has not authorized yet.
    Request,
    /// Final credentials for API requests.
    Access,
}

/// OAuth 1.0a token pair(s).
///
/// A request-phase token carries only the temporary pair. After the
/// access-token exchange both pairs are populated.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuth1Token {
    pub request_token: SmolStr,
    pub request_token_secret: SmolStr,
    pub access_token: Option<SmolStr>,
    pub access_token_secret: Option<SmolStr>,
    #[serde(default)]
    pub end_of_life: EndOfLife,
    #[serde(default)]
    pub extra_params: ExtraParams,
}

impl OAuth1Token {
    /// Temporary credentials from a request-token response.
    pub fn request(token: impl Into<SmolStr>, secret: impl Into<SmolStr>) -> Self {
        Self {
            request_token: token.into(),
            request_token_secret: secret.into(),
            access_token: None,
            access_token_secret: None,
            end_of_life: EndOfLife::Unknown,
            extra_params: ExtraParams::new(),
        }
    }

    /// Final credentials. The request pair mirrors the access pair, which is
    /// what providers hand back in the access-token response.
    pub fn access(token: impl Into<SmolStr>, secret: impl Into<SmolStr>) -> Self {
        let token = token.into();
        let secret = secret.into();
        Self {
            request_token: token.clone(),
            request_token_secret: secret.clone(),
            access_token: Some(token),
            access_token_secret: Some(secret),
            end_of_life: EndOfLife::NeverExpires,
            extra_params: ExtraParams::new(),
        }
    }

    pub fn phase(&self) -> TokenPhase {
        match (&self.access_token, &self.access_token_secret) {
            (Some(_), Some(_)) => TokenPhase::Access,
            _ => TokenPhase::Request,
        }
    }

    pub fn set_request_token(&mut self, token: impl Into<SmolStr>) {
        self.request_token = token.into();
    }

    pub fn set_request_token_secret(&mut self, secret: impl Into<SmolStr>) {
        self.request_token_secret = secret.into();
    }

    pub fn set_access_token(&mut self, token: impl Into<SmolStr>) {
        self.access_token = Some(token.into());
    }

    pub fn set_access_token_secret(&mut self, secret: impl Into<SmolStr>) {
        self.access_token_secret = Some(secret.into());
    }

    pub fn set_end_of_life(&mut self, end_of_life: EndOfLife) {
        self.end_of_life = end_of_life;
    }

    pub fn set_extra_params(&mut self, params: ExtraParams) {
        self.extra_params = params;
    }

    /// Access token secret, empty during the request phase.
    pub fn access_secret(&self) -> &str {
        self.access_token_secret.as_deref().unwrap_or_default()
    }

    pub fn is_expired(&self) -> bool {
        self.end_of_life.is_expired()
    }
}

/// OAuth 2.0 bearer token.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Token {
    pub access_token: SmolStr,
    pub refresh_token: Option<SmolStr>,
    #[serde(default)]
    pub end_of_life: EndOfLife,
    #[serde(default)]
    pub extra_params: ExtraParams,
}

impl OAuth2Token {
    pub fn new(access_token: impl Into<SmolStr>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            end_of_life: EndOfLife::Unknown,
            extra_params: ExtraParams::new(),
        }
    }

    pub fn set_access_token(&mut self, token: impl Into<SmolStr>) {
        self.access_token = token.into();
    }

    pub fn set_refresh_token(&mut self, token: impl Into<SmolStr>) {
        self.refresh_token = Some(token.into());
    }

    pub fn set_end_of_life(&mut self, end_of_life: EndOfLife) {
        self.end_of_life = end_of_life;
    }

    /// Expire `seconds` from now. A zero lifetime means the token never
    /// expires.
    pub fn set_lifetime(&mut self, seconds: i64) {
        self.end_of_life = match seconds {
            0 => EndOfLife::NeverExpires,
            seconds => EndOfLife::from_lifetime(seconds),
        };
    }

    pub fn set_extra_params(&mut self, params: ExtraParams) {
        self.extra_params = params;
    }

    pub fn is_expired(&self) -> bool {
        self.end_of_life.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oauth1_phases() {
        let mut token = OAuth1Token::request("rt", "rs");
        assert_eq!(token.phase(), TokenPhase::Request);
        assert_eq!(token.access_secret(), "");
        token.set_access_token("at");
        assert_eq!(token.phase(), TokenPhase::Request);
        token.set_access_token_secret("as");
        assert_eq!(token.phase(), TokenPhase::Access);
        assert_eq!(token.access_secret(), "as");
    }

    #[test]
    fn oauth2_lifetime() {
        let mut token = OAuth2Token::new("abc");
        assert!(!token.is_expired());
        token.set_lifetime(-1);
        assert!(token.is_expired());
        token.set_lifetime(0);
        assert_eq!(token.end_of_life, EndOfLife::NeverExpires);
    }

    #[test]
    fn tokens_survive_json() {
        let mut token = OAuth1Token::access("at", "as");
        token.extra_params.insert("user_id", "42");
        let json = serde_json::to_string(&token).unwrap();
        let back: OAuth1Token = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }
}

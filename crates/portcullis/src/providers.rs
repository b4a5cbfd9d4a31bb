//! Built-in provider profiles.
//!
//! Each function returns a fresh profile; adjust fields before handing it to
//! a service if a provider moves an endpoint.

use portcullis_common::token::{EndOfLife, ExtraParams};
use portcullis_oauth::error::{OAuthError, Result};
use portcullis_oauth::profile::{
    ApiEndpoint, AuthorizationMode, OAuth1Profile, OAuth2Profile,
    parse_oauth2_access_token_response,
};
use portcullis_oauth::types::OAuth2Token;
use serde_json::Value;
use url::Url;

fn endpoint(url: &'static str) -> Url {
    Url::parse(url).expect("built-in endpoint URL is valid")
}

/// BitBucket (OAuth 1.0a). Request tokens must confirm the callback.
pub fn bitbucket() -> OAuth1Profile {
    OAuth1Profile::builder()
        .name("bitbucket")
        .request_token_endpoint(endpoint(
            "https://bitbucket.org/!api/1.0/oauth/request_token",
        ))
        .authorization_endpoint(endpoint(
            "https://bitbucket.org/!api/1.0/oauth/authenticate",
        ))
        .access_token_endpoint(endpoint("https://bitbucket.org/!api/1.0/oauth/access_token"))
        .base_api_uri(endpoint("https://bitbucket.org/api/1.0/"))
        .require_callback_confirmed(true)
        .build()
}

/// Etsy (OAuth 1.0a). Scopes ride on the request-token endpoint as `scope`.
pub fn etsy() -> OAuth1Profile {
    OAuth1Profile::builder()
        .name("etsy")
        .request_token_endpoint(endpoint("https://openapi.etsy.com/v2/oauth/request_token"))
        .authorization_endpoint(endpoint("https://openapi.etsy.com/v2/"))
        .access_token_endpoint(endpoint("https://openapi.etsy.com/v2/oauth/access_token"))
        .base_api_uri(endpoint("https://openapi.etsy.com/v2/"))
        .require_callback_confirmed(true)
        .scope_param("scope")
        .build()
}

/// Foursquare (OAuth 2.0). Tokens never expire.
pub fn foursquare() -> OAuth2Profile {
    OAuth2Profile::builder()
        .name("foursquare")
        .authorization_endpoint(endpoint("https://foursquare.com/oauth2/authorize"))
        .access_token_endpoint(endpoint("https://foursquare.com/oauth2/access_token"))
        .api_endpoint(ApiEndpoint::Fixed(endpoint("https://api.foursquare.com/v2/")))
        .default_end_of_life(EndOfLife::NeverExpires)
        .build()
}

/// Mailchimp (OAuth 2.0).
///
/// The API host depends on the account's data center, so the base is
/// resolved per token from the metadata endpoint. Tokens never expire and
/// carry no extras.
pub fn mailchimp() -> OAuth2Profile {
    OAuth2Profile::builder()
        .name("mailchimp")
        .authorization_endpoint(endpoint("https://login.mailchimp.com/oauth2/authorize"))
        .access_token_endpoint(endpoint("https://login.mailchimp.com/oauth2/token"))
        .api_endpoint(ApiEndpoint::Metadata {
            uri: endpoint("https://login.mailchimp.com/oauth2/metadata"),
            token_param: "oauth_token".into(),
            resolve: resolve_mailchimp_metadata,
        })
        .authorization_mode(AuthorizationMode::QueryStringV3)
        .default_end_of_life(EndOfLife::NeverExpires)
        .parse_access_token(parse_mailchimp_token)
        .build()
}

/// Pinterest scope values.
pub mod pinterest_scopes {
    /// Read a user's pins, boards and likes.
    pub const READ_PUBLIC: &str = "read_public";
    /// Write pins, boards and likes.
    pub const WRITE_PUBLIC: &str = "write_public";
    /// Read a user's follows.
    pub const READ_RELATIONSHIPS: &str = "read_relationships";
    /// Follow boards, users and interests.
    pub const WRITE_RELATIONSHIPS: &str = "write_relationships";
}

/// Pinterest (OAuth 2.0). Bearer header, anti-forgery state.
pub fn pinterest() -> OAuth2Profile {
    use pinterest_scopes::*;
    OAuth2Profile::builder()
        .name("pinterest")
        .authorization_endpoint(endpoint("https://api.pinterest.com/oauth/"))
        .access_token_endpoint(endpoint("https://api.pinterest.com/v1/oauth/token"))
        .api_endpoint(ApiEndpoint::Fixed(endpoint("https://api.pinterest.com/")))
        .authorization_mode(AuthorizationMode::HeaderBearer)
        .state_in_auth_url(true)
        .scopes(
            [
                ("READ_PUBLIC", READ_PUBLIC),
                ("WRITE_PUBLIC", WRITE_PUBLIC),
                ("READ_RELATIONSHIPS", READ_RELATIONSHIPS),
                ("WRITE_RELATIONSHIPS", WRITE_RELATIONSHIPS),
            ]
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .collect(),
        )
        .build()
}

fn parse_mailchimp_token(profile: &OAuth2Profile, body: &[u8]) -> Result<OAuth2Token> {
    let mut token = parse_oauth2_access_token_response(profile, body)?;
    token.set_end_of_life(EndOfLife::NeverExpires);
    token.set_extra_params(ExtraParams::new());
    Ok(token)
}

fn resolve_mailchimp_metadata(body: &[u8]) -> Result<Url> {
    let dc = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|meta| meta.get("dc").and_then(Value::as_str).map(str::to_owned))
        .filter(|dc| !dc.is_empty() && dc.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'))
        .ok_or_else(|| OAuthError::token_response("metadata has no usable `dc`", body))?;
    Ok(Url::parse(&format!("https://{dc}.api.mailchimp.com/2.0/"))?)
}

/// Every built-in OAuth 1.0a profile.
pub fn oauth1_profiles() -> Vec<OAuth1Profile> {
    vec![bitbucket(), etsy()]
}

/// Every built-in OAuth 2.0 profile.
pub fn oauth2_profiles() -> Vec<OAuth2Profile> {
    vec![foursquare(), mailchimp(), pinterest()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_oauth::error::OAuthErrorKind;

    #[test]
    fn mailchimp_tokens_drop_extras() {
        let token = (mailchimp().parse_access_token)(
            &mailchimp(),
            br#"{"access_token":"abc","expires_in":0,"scope":null}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.end_of_life, EndOfLife::NeverExpires);
        assert!(token.extra_params.is_empty());
    }

    #[test]
    fn mailchimp_metadata() {
        assert_eq!(
            resolve_mailchimp_metadata(br#"{"dc":"us5","accountname":"x"}"#)
                .unwrap()
                .as_str(),
            "https://us5.api.mailchimp.com/2.0/"
        );
        for body in [&b"{}"[..], b"not json", br#"{"dc":"evil.com/x"}"#] {
            let err = resolve_mailchimp_metadata(body).unwrap_err();
            assert!(matches!(err.kind(), OAuthErrorKind::TokenResponse(_)));
        }
    }

    #[test]
    fn foursquare_tokens_never_expire() {
        let profile = foursquare();
        let token = (profile.parse_access_token)(&profile, br#"{"access_token":"abc"}"#).unwrap();
        assert_eq!(token.end_of_life, EndOfLife::NeverExpires);
        assert!(token.extra_params.is_empty());
    }

    #[test]
    fn pinterest_scope_catalogue() {
        let profile = pinterest();
        assert_eq!(profile.resolve_scope("read_relationships"), "read_relationships");
        assert_eq!(profile.resolve_scope("WRITE_PUBLIC"), "write_public");
        assert!(profile.state_in_auth_url);
    }
}

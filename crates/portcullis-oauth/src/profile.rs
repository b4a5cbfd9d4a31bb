//! Provider profiles: the per-provider data the protocol services run on.
//!
//! A profile is plain configuration. Endpoints, the authorization mode,
//! the scope catalogue and lifetime defaults are fields; response parsing is
//! a `fn` pointer so providers with odd token responses swap in their own
//! parser and keep everything else.

use http::Method;
use portcullis_common::error::InvalidRequestError;
use portcullis_common::request::PreparedRequest;
use portcullis_common::token::{EndOfLife, ExtraParams};
use portcullis_common::uri::Uri;
use serde_json::{Map, Value};
use smol_str::{SmolStr, format_smolstr};
use url::Url;

use crate::error::{OAuthError, Result};
use crate::types::{OAuth1Token, OAuth2Token};

/// Parses an OAuth1 token endpoint response body.
pub type OAuth1ResponseParser = fn(&OAuth1Profile, &[u8]) -> Result<OAuth1Token>;
/// Parses an OAuth2 token endpoint response body.
pub type OAuth2ResponseParser = fn(&OAuth2Profile, &[u8]) -> Result<OAuth2Token>;
/// Turns a metadata document into the API base URI.
pub type MetadataResolver = fn(&[u8]) -> Result<Url>;

/// How an OAuth2 access token is attached to API requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationMode {
    /// `Authorization: OAuth <token>`
    #[default]
    HeaderOAuth,
    /// `Authorization: Bearer <token>`
    HeaderBearer,
    /// `?access_token=<token>`
    QueryString,
    /// `?oauth2_access_token=<token>`
    QueryStringV2,
    /// `?apikey=<token>`
    QueryStringV3,
}

impl AuthorizationMode {
    /// Attach `access_token` to `request`.
    pub fn authorize(
        &self,
        request: &mut PreparedRequest,
        access_token: &str,
    ) -> core::result::Result<(), InvalidRequestError> {
        match self {
            Self::HeaderOAuth => {
                request.set_header("Authorization", &format!("OAuth {access_token}"))
            }
            Self::HeaderBearer => {
                request.set_header("Authorization", &format!("Bearer {access_token}"))
            }
            Self::QueryString | Self::QueryStringV2 | Self::QueryStringV3 => {
                let key = self.query_key().unwrap_or("access_token");
                request.uri_mut().add_to_query(key, access_token);
                Ok(())
            }
        }
    }

    /// Query parameter name for the query-string modes.
    pub fn query_key(&self) -> Option<&'static str> {
        match self {
            Self::QueryString => Some("access_token"),
            Self::QueryStringV2 => Some("oauth2_access_token"),
            Self::QueryStringV3 => Some("apikey"),
            Self::HeaderOAuth | Self::HeaderBearer => None,
        }
    }
}

/// Token request body encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyEncoding {
    #[default]
    Form,
    Json,
}

/// Method and encoding of the OAuth2 token exchange.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct TokenRequest {
    #[builder(default = Method::POST)]
    pub method: Method,
    #[builder(default)]
    pub encoding: BodyEncoding,
}

impl Default for TokenRequest {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Where API requests go once a token is in hand.
#[derive(Debug, Clone, Default)]
pub enum ApiEndpoint {
    /// Callers pass absolute URLs or set a base themselves.
    #[default]
    None,
    /// A fixed base URI.
    Fixed(Url),
    /// Per-token base, discovered from a metadata document fetched with the
    /// access token in `token_param`.
    Metadata {
        uri: Url,
        token_param: SmolStr,
        resolve: MetadataResolver,
    },
}

/// OAuth 1.0a provider description.
#[derive(Debug, Clone, bon::Builder)]
pub struct OAuth1Profile {
    /// Service name, also the storage key prefix.
    #[builder(into)]
    pub name: SmolStr,
    pub request_token_endpoint: Url,
    pub authorization_endpoint: Url,
    pub access_token_endpoint: Url,
    pub base_api_uri: Option<Url>,
    /// Reject request tokens unless `oauth_callback_confirmed=true`.
    #[builder(default)]
    pub require_callback_confirmed: bool,
    #[builder(default = EndOfLife::NeverExpires)]
    pub default_end_of_life: EndOfLife,
    /// Query parameter carrying scopes on the request-token endpoint.
    #[builder(into)]
    pub scope_param: Option<SmolStr>,
    #[builder(into, default = SmolStr::new_static(" "))]
    pub scope_separator: SmolStr,
    #[builder(default = parse_request_token_response as OAuth1ResponseParser)]
    pub parse_request_token: OAuth1ResponseParser,
    #[builder(default = parse_oauth1_access_token_response as OAuth1ResponseParser)]
    pub parse_access_token: OAuth1ResponseParser,
}

impl OAuth1Profile {
    /// Request-token endpoint, with scopes when the provider takes them.
    pub fn request_token_uri(&self, scopes: &[SmolStr]) -> Uri {
        let mut uri = Uri::from(self.request_token_endpoint.clone());
        if let Some(param) = &self.scope_param {
            if !scopes.is_empty() {
                uri.add_to_query(param, &scopes.join(self.scope_separator.as_str()));
            }
        }
        uri
    }
}

/// OAuth 2.0 provider description.
#[derive(Debug, Clone, bon::Builder)]
pub struct OAuth2Profile {
    /// Service name, also the storage key prefix.
    #[builder(into)]
    pub name: SmolStr,
    pub authorization_endpoint: Url,
    pub access_token_endpoint: Url,
    #[builder(default)]
    pub api_endpoint: ApiEndpoint,
    #[builder(default)]
    pub authorization_mode: AuthorizationMode,
    /// Known scopes as `(CONSTANT_NAME, value)`.
    #[builder(default)]
    pub scopes: Vec<(SmolStr, SmolStr)>,
    #[builder(into, default = SmolStr::new_static(" "))]
    pub scope_separator: SmolStr,
    /// Send and verify an anti-forgery `state`.
    #[builder(default)]
    pub state_in_auth_url: bool,
    #[builder(default)]
    pub token_request: TokenRequest,
    #[builder(default)]
    pub default_end_of_life: EndOfLife,
    #[builder(default = parse_oauth2_access_token_response as OAuth2ResponseParser)]
    pub parse_access_token: OAuth2ResponseParser,
}

impl OAuth2Profile {
    /// Map a scope alias onto the catalogue, case-insensitively. Unknown
    /// scopes pass through untouched.
    pub fn resolve_scope(&self, scope: &str) -> SmolStr {
        self.scopes
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(scope))
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| SmolStr::new(scope))
    }

    /// Fixed API base, if the profile has one.
    pub fn fixed_base_api_uri(&self) -> Option<&Url> {
        match &self.api_endpoint {
            ApiEndpoint::Fixed(url) => Some(url),
            _ => None,
        }
    }
}

/// Standard OAuth1 request-token parser.
pub fn parse_request_token_response(profile: &OAuth1Profile, body: &[u8]) -> Result<OAuth1Token> {
    let data = parse_form(body)?;
    if profile.require_callback_confirmed
        && lookup(&data, "oauth_callback_confirmed") != Some("true")
    {
        return Err(OAuthError::token_response("callback was not confirmed", body));
    }
    let data = data
        .into_iter()
        .filter(|(k, _)| k != "oauth_callback_confirmed")
        .collect();
    let (token, secret, extra) = take_oauth1_pair(data, body)?;
    let mut request = OAuth1Token::request(token, secret);
    request.set_extra_params(extra);
    Ok(request)
}

/// Standard OAuth1 access-token parser.
pub fn parse_oauth1_access_token_response(
    profile: &OAuth1Profile,
    body: &[u8],
) -> Result<OAuth1Token> {
    let data = parse_form(body)?;
    let (token, secret, mut extra) = take_oauth1_pair(data, body)?;
    let mut access = OAuth1Token::access(token, secret);
    let end_of_life = match extra.remove("oauth_expires_in") {
        Some(seconds) => match seconds.parse::<i64>() {
            Ok(seconds) => EndOfLife::from_lifetime(seconds),
            Err(_) => {
                return Err(OAuthError::token_response("invalid oauth_expires_in", body));
            }
        },
        None => profile.default_end_of_life,
    };
    access.set_end_of_life(end_of_life);
    access.set_extra_params(extra);
    Ok(access)
}

/// Standard OAuth2 JSON token parser.
pub fn parse_oauth2_access_token_response(
    profile: &OAuth2Profile,
    body: &[u8],
) -> Result<OAuth2Token> {
    let object = json_object(body)?;
    let access_token = object
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::token_response("missing access_token", body))?;

    let mut token = OAuth2Token::new(access_token);
    token.set_end_of_life(profile.default_end_of_life);
    let mut extra = ExtraParams::new();
    for (key, value) in &object {
        match key.as_str() {
            "access_token" => {}
            "expires_in" => match lifetime_seconds(value) {
                Some(seconds) => token.set_lifetime(seconds),
                None if value.is_null() => {}
                None => return Err(OAuthError::token_response("invalid expires_in", body)),
            },
            "refresh_token" => {
                if let Some(refresh) = value.as_str() {
                    token.set_refresh_token(refresh);
                }
            }
            _ => extra.insert(key.as_str(), json_text(value)),
        }
    }
    token.set_extra_params(extra);
    Ok(token)
}

/// Token exchanges with a non-2xx status fail even when the body parsed.
pub(crate) fn ensure_success(status: http::StatusCode, body: &[u8]) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(OAuthError::token_response(
            format_smolstr!("token endpoint returned {status}"),
            body,
        ))
    }
}

fn parse_form(body: &[u8]) -> Result<Vec<(String, String)>> {
    let data: Vec<(String, String)> = url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if data.is_empty() {
        return Err(OAuthError::token_response("unable to parse response", body));
    }
    if let Some(error) = lookup(&data, "error") {
        return Err(OAuthError::token_response(
            format_smolstr!("error in retrieving token: \"{error}\""),
            body,
        ));
    }
    Ok(data)
}

fn lookup<'a>(data: &'a [(String, String)], key: &str) -> Option<&'a str> {
    data.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn take_oauth1_pair(
    data: Vec<(String, String)>,
    body: &[u8],
) -> Result<(SmolStr, SmolStr, ExtraParams)> {
    let mut token = None;
    let mut secret = None;
    let mut extra = ExtraParams::new();
    for (key, value) in data {
        match key.as_str() {
            "oauth_token" => token = Some(value),
            "oauth_token_secret" => secret = Some(value),
            _ => extra.insert(key, value),
        }
    }
    match (token, secret) {
        (Some(token), Some(secret)) if !token.is_empty() && !secret.is_empty() => {
            Ok((token.into(), secret.into(), extra))
        }
        _ => Err(OAuthError::token_response(
            "missing oauth_token or oauth_token_secret",
            body,
        )),
    }
}

fn json_object(body: &[u8]) -> Result<Map<String, Value>> {
    let object = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => object,
        _ => return Err(OAuthError::token_response("unable to parse response", body)),
    };
    if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
        let message = match object.get("error_description").and_then(Value::as_str) {
            Some(description) => format_smolstr!(
                "error in retrieving token: \"{}\": {description}",
                json_text(error)
            ),
            None => format_smolstr!("error in retrieving token: \"{}\"", json_text(error)),
        };
        return Err(OAuthError::token_response(message, body));
    }
    Ok(object)
}

fn lifetime_seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OAuthErrorKind;
    use portcullis_common::request::RequestBody;

    fn oauth1(confirm: bool) -> OAuth1Profile {
        OAuth1Profile::builder()
            .name("test")
            .request_token_endpoint(Url::parse("https://example.com/request").unwrap())
            .authorization_endpoint(Url::parse("https://example.com/authorize").unwrap())
            .access_token_endpoint(Url::parse("https://example.com/access").unwrap())
            .require_callback_confirmed(confirm)
            .build()
    }

    fn oauth2() -> OAuth2Profile {
        OAuth2Profile::builder()
            .name("test")
            .authorization_endpoint(Url::parse("https://example.com/authorize").unwrap())
            .access_token_endpoint(Url::parse("https://example.com/token").unwrap())
            .scopes(vec![("READ_PUBLIC".into(), "read_public".into())])
            .default_end_of_life(EndOfLife::NeverExpires)
            .build()
    }

    fn is_token_response<T: std::fmt::Debug>(result: Result<T>) -> bool {
        matches!(result.unwrap_err().kind(), OAuthErrorKind::TokenResponse(_))
    }

    #[test]
    fn request_token_rejections() {
        let profile = oauth1(true);
        for body in ["", "notanarray", "foo=bar", "oauth_callback_confirmed=false"] {
            assert!(
                is_token_response(parse_request_token_response(&profile, body.as_bytes())),
                "{body:?} should be rejected"
            );
        }
    }

    #[test]
    fn request_token_valid() {
        let token = parse_request_token_response(
            &oauth1(true),
            b"oauth_callback_confirmed=true&oauth_token=foo&oauth_token_secret=bar",
        )
        .unwrap();
        assert_eq!(token.request_token, "foo");
        assert_eq!(token.request_token_secret, "bar");
        assert!(token.access_token.is_none());
        assert!(token.extra_params.is_empty());
    }

    #[test]
    fn request_token_without_confirmation_requirement() {
        let token =
            parse_request_token_response(&oauth1(false), b"oauth_token=foo&oauth_token_secret=bar")
                .unwrap();
        assert_eq!(token.request_token, "foo");
    }

    #[test]
    fn oauth1_access_token_keeps_extras_in_order() {
        let token = parse_oauth1_access_token_response(
            &oauth1(false),
            b"oauth_token=at&z_last=1&oauth_token_secret=as&a_first=2",
        )
        .unwrap();
        assert_eq!(token.access_token.as_deref(), Some("at"));
        assert_eq!(token.access_secret(), "as");
        assert_eq!(token.end_of_life, EndOfLife::NeverExpires);
        let extras: Vec<_> = token.extra_params.iter().collect();
        assert_eq!(extras, vec![("z_last", "1"), ("a_first", "2")]);
    }

    #[test]
    fn oauth1_access_token_error_field() {
        assert!(is_token_response(parse_oauth1_access_token_response(
            &oauth1(false),
            b"error=bar"
        )));
    }

    #[test]
    fn oauth1_expires_in_overrides_default() {
        let token = parse_oauth1_access_token_response(
            &oauth1(false),
            b"oauth_token=at&oauth_token_secret=as&oauth_expires_in=3600",
        )
        .unwrap();
        assert!(matches!(token.end_of_life, EndOfLife::At(_)));
        assert!(!token.extra_params.contains_key("oauth_expires_in"));
    }

    #[test]
    fn oauth2_minimal_response() {
        let token = parse_oauth2_access_token_response(&oauth2(), br#"{"access_token":"abc"}"#)
            .unwrap();
        assert_eq!(token.access_token, "abc");
        assert_eq!(token.end_of_life, EndOfLife::NeverExpires);
        assert!(token.extra_params.is_empty());
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn oauth2_full_response() {
        let token = parse_oauth2_access_token_response(
            &oauth2(),
            br#"{"access_token":"abc","expires_in":"3600","refresh_token":"r","token_type":"bearer","scope":["a","b"],"uid":7}"#,
        )
        .unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("r"));
        assert!(matches!(token.end_of_life, EndOfLife::At(_)));
        let extras: Vec<_> = token.extra_params.iter().collect();
        assert_eq!(
            extras,
            vec![("token_type", "bearer"), ("scope", "[\"a\",\"b\"]"), ("uid", "7")]
        );
    }

    #[test]
    fn oauth2_parses_its_own_serialization() {
        let mut original = OAuth2Token::new("abc");
        original.set_refresh_token("def");
        original.extra_params.insert("token_type", "bearer");
        original.extra_params.insert("uid", "42");

        let mut object = Map::new();
        object.insert("access_token".into(), original.access_token.as_str().into());
        if let Some(refresh) = &original.refresh_token {
            object.insert("refresh_token".into(), refresh.as_str().into());
        }
        for (k, v) in original.extra_params.iter() {
            object.insert(k.into(), v.into());
        }
        let body = serde_json::to_vec(&object).unwrap();

        let parsed = parse_oauth2_access_token_response(&oauth2(), &body).unwrap();
        assert_eq!(parsed.access_token, original.access_token);
        assert_eq!(parsed.refresh_token, original.refresh_token);
        assert_eq!(parsed.extra_params, original.extra_params);
    }

    #[test]
    fn oauth2_error_carries_description_and_body() {
        let err = parse_oauth2_access_token_response(
            &oauth2(),
            br#"{"error":"invalid_grant","error_description":"code expired"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid_grant"));
        assert!(err.to_string().contains("code expired"));
        assert!(err.details().unwrap().contains("invalid_grant"));
    }

    #[test]
    fn oauth2_rejects_non_objects() {
        for body in ["", "null", "[1,2]", "\"abc\"", "{\"token_type\":\"bearer\"}"] {
            assert!(
                is_token_response(parse_oauth2_access_token_response(&oauth2(), body.as_bytes())),
                "{body:?} should be rejected"
            );
        }
    }

    #[test]
    fn huge_lifetimes_never_expire() {
        let token = parse_oauth2_access_token_response(
            &oauth2(),
            br#"{"access_token":"abc","expires_in":9223372036854775807}"#,
        )
        .unwrap();
        assert_eq!(token.end_of_life, EndOfLife::NeverExpires);

        let token = parse_oauth2_access_token_response(
            &oauth2(),
            br#"{"access_token":"abc","expires_in":"-9223372036854775808"}"#,
        )
        .unwrap();
        assert!(token.is_expired());

        let token = parse_oauth1_access_token_response(
            &oauth1(false),
            b"oauth_token=t&oauth_token_secret=s&oauth_expires_in=99999999999999999",
        )
        .unwrap();
        assert_eq!(token.end_of_life, EndOfLife::NeverExpires);
    }

    #[test]
    fn scope_aliases_resolve() {
        let profile = oauth2();
        assert_eq!(profile.resolve_scope("read_public"), "read_public");
        assert_eq!(profile.resolve_scope("Read_Public"), "read_public");
        assert_eq!(profile.resolve_scope("custom:scope"), "custom:scope");
    }

    #[test]
    fn etsy_style_scope_query() {
        let profile = OAuth1Profile::builder()
            .name("etsy")
            .request_token_endpoint(
                Url::parse("https://openapi.etsy.com/v2/oauth/request_token").unwrap(),
            )
            .authorization_endpoint(Url::parse("https://openapi.etsy.com/v2/").unwrap())
            .access_token_endpoint(
                Url::parse("https://openapi.etsy.com/v2/oauth/access_token").unwrap(),
            )
            .scope_param("scope")
            .build();
        assert_eq!(
            profile.request_token_uri(&[]).absolute(),
            "https://openapi.etsy.com/v2/oauth/request_token"
        );
        let uri = profile.request_token_uri(&["email_r".into(), "cart_rw".into()]);
        assert_eq!(uri.query_param("scope").as_deref(), Some("email_r cart_rw"));
    }

    #[test]
    fn authorization_modes() {
        let cases = [
            (AuthorizationMode::HeaderOAuth, Some("OAuth t0k"), None),
            (AuthorizationMode::HeaderBearer, Some("Bearer t0k"), None),
            (AuthorizationMode::QueryString, None, Some("access_token")),
            (AuthorizationMode::QueryStringV2, None, Some("oauth2_access_token")),
            (AuthorizationMode::QueryStringV3, None, Some("apikey")),
        ];
        for (mode, header, query) in cases {
            let mut request = PreparedRequest::new(
                "GET",
                Uri::parse("https://api.example.com/me?x=1").unwrap(),
                [("Accept", "application/json")],
                RequestBody::Empty,
            )
            .unwrap();
            mode.authorize(&mut request, "t0k").unwrap();
            assert_eq!(
                request
                    .headers()
                    .get("authorization")
                    .map(|v| v.to_str().unwrap()),
                header
            );
            if let Some(key) = query {
                assert_eq!(request.uri().query_param(key).as_deref(), Some("t0k"));
                assert_eq!(request.uri().query_param("x").as_deref(), Some("1"));
            }
        }
    }
}

//! # OAuth 2.0 authorization-code flow
//!
//! ```text
//! Unauthenticated
//!   -- authorization_uri ------>  (user at provider, returns ?code&state)
//!   -- request_access_token --->  AccessTokenObtained (persisted)
//!   -- refresh_access_token --->  AccessTokenObtained (persisted)
//! ```

use http::header::{ACCEPT, CONTENT_TYPE};
use portcullis_common::consumer::ConsumerCredentials;
use portcullis_common::http_client::HttpClient;
use portcullis_common::request::{PreparedRequest, RequestBody, dispatch};
use portcullis_common::storage::{TokenKey, TokenStorage};
use portcullis_common::uri::Uri;
use smol_str::{SmolStr, format_smolstr};

use crate::DEFAULT_ACCOUNT;
use crate::error::{OAuthError, Result};
use crate::profile::{ApiEndpoint, BodyEncoding, OAuth2Profile, ensure_success};
use crate::types::OAuth2Token;
use crate::utils::{generate_state, resolve_api_uri};

/// API base discovered for a token, ready for
/// [`OAuth2Service::with_base_api_uri`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint(Uri);

impl ResolvedEndpoint {
    pub fn uri(&self) -> &Uri {
        &self.0
    }
}

impl From<ResolvedEndpoint> for Uri {
    fn from(endpoint: ResolvedEndpoint) -> Self {
        endpoint.0
    }
}

/// OAuth 2.0 client for one provider profile and one account.
pub struct OAuth2Service<C, S> {
    profile: OAuth2Profile,
    credentials: ConsumerCredentials,
    client: C,
    storage: S,
    scopes: Vec<SmolStr>,
    base_api_uri: Option<Uri>,
    account: SmolStr,
}

impl<C, S> OAuth2Service<C, S> {
    pub fn new(
        profile: OAuth2Profile,
        credentials: ConsumerCredentials,
        client: C,
        storage: S,
    ) -> Self {
        let base_api_uri = profile.fixed_base_api_uri().cloned().map(Uri::from);
        Self {
            profile,
            credentials,
            client,
            storage,
            scopes: Vec::new(),
            base_api_uri,
            account: SmolStr::new_static(DEFAULT_ACCOUNT),
        }
    }

    /// Scopes requested in the authorization URI, sent as given.
    pub fn with_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SmolStr>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Storage account label, `"default"` unless set.
    pub fn with_account(mut self, account: impl Into<SmolStr>) -> Self {
        self.account = account.into();
        self
    }

    /// Override the base that relative API paths resolve against.
    pub fn with_base_api_uri(mut self, uri: impl Into<Uri>) -> Self {
        self.base_api_uri = Some(uri.into());
        self
    }

    pub fn profile(&self) -> &OAuth2Profile {
        &self.profile
    }

    pub fn credentials(&self) -> &ConsumerCredentials {
        &self.credentials
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn scopes(&self) -> &[SmolStr] {
        &self.scopes
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn base_api_uri(&self) -> Option<&Uri> {
        self.base_api_uri.as_ref()
    }

    /// Key the token is stored under.
    pub fn storage_key(&self) -> TokenKey {
        TokenKey::new(self.profile.name.clone(), self.account.clone())
    }

    /// Build the user redirect. Returns the URI and the `state` it carries,
    /// if the profile uses one. A caller-supplied `state` extra is kept,
    /// otherwise one is generated.
    pub fn authorization_uri<K, V>(
        &self,
        extra: impl IntoIterator<Item = (K, V)>,
    ) -> (Uri, Option<SmolStr>)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let extra: Vec<(String, String)> = extra
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned()))
            .collect();
        let mut uri = Uri::from(self.profile.authorization_endpoint.clone());
        uri.add_to_query("client_id", self.credentials.key());
        if let Some(callback) = self.credentials.callback_url() {
            uri.add_to_query("redirect_uri", callback.as_str());
        }
        uri.add_to_query("response_type", "code");
        if !self.scopes.is_empty() {
            uri.add_to_query(
                "scope",
                &self.scopes.join(self.profile.scope_separator.as_str()),
            );
        }

        let state = if self.profile.state_in_auth_url {
            let state = extra
                .iter()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| SmolStr::new(v))
                .unwrap_or_else(generate_state);
            uri.add_to_query("state", &state);
            Some(state)
        } else {
            None
        };

        for (key, value) in &extra {
            uri.add_to_query(key, value);
        }
        (uri, state)
    }

    /// Attach `token` to `request` the way the profile expects.
    pub fn authorize_request(&self, request: &mut PreparedRequest, token: &OAuth2Token) -> Result<()> {
        self.profile
            .authorization_mode
            .authorize(request, &token.access_token)?;
        Ok(())
    }

    fn verify_state(&self, state: Option<&str>, expected: Option<&str>) -> Result<()> {
        if !self.profile.state_in_auth_url {
            return Ok(());
        }
        match (state, expected) {
            (Some(state), Some(expected)) if state == expected => Ok(()),
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!(service = %self.profile.name, "authorization state mismatch");
                Err(OAuthError::state_verification())
            }
        }
    }
}

impl<C, S> OAuth2Service<C, S>
where
    C: HttpClient + Sync,
    S: TokenStorage<OAuth2Token>,
{
    /// Exchange an authorization code for a token and persist it.
    ///
    /// With state verification on, `state` (from the redirect) must equal
    /// `expected_state` (from [`Self::authorization_uri`]).
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(service = %self.profile.name, account = %self.account)))]
    pub async fn request_access_token(
        &self,
        code: &str,
        state: Option<&str>,
        expected_state: Option<&str>,
    ) -> Result<OAuth2Token> {
        self.verify_state(state, expected_state)?;

        let mut params = vec![
            ("code", code.to_owned()),
            ("client_id", self.credentials.key().to_owned()),
            ("client_secret", self.credentials.secret().to_owned()),
        ];
        if let Some(callback) = self.credentials.callback_url() {
            params.push(("redirect_uri", callback.as_str().to_owned()));
        }
        params.push(("grant_type", "authorization_code".to_owned()));

        let token = self.exchange(params).await?;
        self.persist(token).await
    }

    /// Trade the refresh token for a new access token and persist it. The old
    /// refresh token is kept when the provider does not issue a new one.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(service = %self.profile.name, account = %self.account)))]
    pub async fn refresh_access_token(&self, token: &OAuth2Token) -> Result<OAuth2Token> {
        let refresh_token = token
            .refresh_token
            .clone()
            .ok_or_else(OAuthError::missing_refresh_token)?;
        let params = vec![
            ("grant_type", "refresh_token".to_owned()),
            ("client_id", self.credentials.key().to_owned()),
            ("client_secret", self.credentials.secret().to_owned()),
            ("refresh_token", refresh_token.to_string()),
        ];

        let mut refreshed = self.exchange(params).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.set_refresh_token(refresh_token);
        }
        self.persist(refreshed).await
    }

    /// Discover the API base for `token` according to the profile.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(service = %self.profile.name)))]
    pub async fn resolve_endpoint(&self, token: &OAuth2Token) -> Result<ResolvedEndpoint> {
        match &self.profile.api_endpoint {
            ApiEndpoint::None => Err(OAuthError::invalid_request(format_smolstr!(
                "{} has no API endpoint to resolve",
                self.profile.name
            ))),
            ApiEndpoint::Fixed(url) => Ok(ResolvedEndpoint(Uri::from(url.clone()))),
            ApiEndpoint::Metadata {
                uri,
                token_param,
                resolve,
            } => {
                let mut uri = Uri::from(uri.clone());
                uri.add_to_query(token_param, &token.access_token);
                let request = PreparedRequest::new(
                    "GET",
                    uri,
                    [(ACCEPT.as_str(), "application/json")],
                    RequestBody::Empty,
                )?;
                let response = dispatch(&self.client, request).await?;
                ensure_success(response.status(), response.body())?;
                Ok(ResolvedEndpoint(Uri::from(resolve(response.body())?)))
            }
        }
    }

    /// Send an authorized API request with the stored token.
    ///
    /// Relative `path`s resolve against the base API URI.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(service = %self.profile.name, method = %method, path = %path)))]
    pub async fn request<K, V>(
        &self,
        path: &str,
        method: &str,
        body: RequestBody,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Result<http::Response<Vec<u8>>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let uri = resolve_api_uri(self.base_api_uri.as_ref(), path)?;
        let key = self.storage_key();
        let token = self.storage.retrieve_access_token(&key).await?;
        if token.is_expired() {
            return Err(OAuthError::token_expired(key));
        }

        let mut request = PreparedRequest::new(method, uri, headers, body)?;
        self.authorize_request(&mut request, &token)?;
        Ok(dispatch(&self.client, request).await?)
    }

    async fn exchange(&self, params: Vec<(&str, String)>) -> Result<OAuth2Token> {
        let token_request = &self.profile.token_request;
        let uri = Uri::from(self.profile.access_token_endpoint.clone());
        let mut headers = vec![(ACCEPT.as_str(), "application/json")];
        let body = match token_request.encoding {
            BodyEncoding::Form => RequestBody::form(params),
            BodyEncoding::Json => {
                let object: serde_json::Map<String, serde_json::Value> = params
                    .into_iter()
                    .map(|(k, v)| (k.to_owned(), v.into()))
                    .collect();
                headers.push((CONTENT_TYPE.as_str(), "application/json"));
                RequestBody::Raw(serde_json::to_vec(&object)?)
            }
        };
        let request = PreparedRequest::new(token_request.method.as_str(), uri, headers, body)?;

        let response = dispatch(&self.client, request).await?;
        let token = (self.profile.parse_access_token)(&self.profile, response.body())?;
        ensure_success(response.status(), response.body())?;
        Ok(token)
    }

    async fn persist(&self, token: OAuth2Token) -> Result<OAuth2Token> {
        let key = self.storage_key();
        self.storage
            .store_access_token(key.clone(), token.clone())
            .await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(key = %key, "stored oauth2 access token");
        Ok(token)
    }
}

//! # OAuth 1.0a three-legged flow
//!
//! ```text
//! Unauthenticated
//!   -- request_request_token -->  RequestTokenObtained
//!   -- authorization_uri ------>  AuthorizationPending (user at provider)
//!   -- request_access_token --->  AccessTokenObtained (persisted)
//! ```
//!
//! The service itself is stateless: the request token travels through the
//! caller, the access token lives in [`TokenStorage`].

use http::Method;
use portcullis_common::consumer::ConsumerCredentials;
use portcullis_common::http_client::HttpClient;
use portcullis_common::request::{PreparedRequest, RequestBody, dispatch};
use portcullis_common::storage::{TokenKey, TokenStorage};
use portcullis_common::uri::Uri;
use smol_str::{SmolStr, format_smolstr};

use crate::DEFAULT_ACCOUNT;
use crate::error::{OAuthError, Result};
use crate::profile::{OAuth1Profile, ensure_success};
use crate::signature::{HmacSha1, Signature, SignatureMethod, percent_encode};
use crate::types::OAuth1Token;
use crate::utils::{generate_nonce, resolve_api_uri, timestamp};

const NO_HEADERS: [(&str, &str); 0] = [];

/// OAuth 1.0a client for one provider profile and one account.
pub struct OAuth1Service<C, S, M = HmacSha1> {
    profile: OAuth1Profile,
    credentials: ConsumerCredentials,
    client: C,
    storage: S,
    signature: Signature<M>,
    base_api_uri: Option<Uri>,
    account: SmolStr,
    scopes: Vec<SmolStr>,
}

impl<C, S> OAuth1Service<C, S, HmacSha1> {
    /// HMAC-SHA1 service for `profile`, using the profile's API base.
    pub fn new(
        profile: OAuth1Profile,
        credentials: ConsumerCredentials,
        client: C,
        storage: S,
    ) -> Self {
        let base_api_uri = profile.base_api_uri.clone().map(Uri::from);
        Self {
            profile,
            credentials,
            client,
            storage,
            signature: Signature::new(HmacSha1),
            base_api_uri,
            account: SmolStr::new_static(DEFAULT_ACCOUNT),
            scopes: Vec::new(),
        }
    }
}

impl<C, S, M> OAuth1Service<C, S, M> {
    /// Swap the signature method.
    pub fn with_signature<N: SignatureMethod>(self, method: N) -> OAuth1Service<C, S, N> {
        OAuth1Service {
            profile: self.profile,
            credentials: self.credentials,
            client: self.client,
            storage: self.storage,
            signature: Signature::new(method),
            base_api_uri: self.base_api_uri,
            account: self.account,
            scopes: self.scopes,
        }
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

    /// Scopes sent to providers whose profile takes them on the
    /// request-token endpoint.
    pub fn with_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SmolStr>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn profile(&self) -> &OAuth1Profile {
        &self.profile
    }

    pub fn credentials(&self) -> &ConsumerCredentials {
        &self.credentials
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn scopes(&self) -> &[SmolStr] {
        &self.scopes
    }

    pub fn base_api_uri(&self) -> Option<&Uri> {
        self.base_api_uri.as_ref()
    }

    /// Key the access token is stored under.
    pub fn storage_key(&self) -> TokenKey {
        TokenKey::new(self.profile.name.clone(), self.account.clone())
    }

    /// Request-token endpoint, including scopes where the profile wants them.
    pub fn request_token_uri(&self) -> Uri {
        self.profile.request_token_uri(&self.scopes)
    }

    /// Where to send the user. No network, no state change.
    pub fn authorization_uri<K, V>(
        &self,
        request_token: &str,
        extra: impl IntoIterator<Item = (K, V)>,
    ) -> Uri
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut uri = Uri::from(self.profile.authorization_endpoint.clone());
        uri.add_to_query("oauth_token", request_token);
        for (key, value) in extra {
            uri.add_to_query(key.as_ref(), value.as_ref());
        }
        uri
    }
}

impl<C, S, M: SignatureMethod> OAuth1Service<C, S, M> {
    /// Build the `Authorization` header value for `request`.
    ///
    /// `oauth_params` are protocol extras such as `oauth_callback`; `token`
    /// is the `(oauth_token, secret)` pair to sign with, if any. The query
    /// string and an urlencoded body are covered by the signature.
    pub fn authorization_header(
        &self,
        request: &PreparedRequest,
        oauth_params: &[(&str, &str)],
        token: Option<(&str, &str)>,
        nonce: &str,
        timestamp: &str,
    ) -> String {
        let mut oauth: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        oauth.extend([
            ("oauth_consumer_key".into(), self.credentials.key().into()),
            ("oauth_nonce".into(), nonce.into()),
            (
                "oauth_signature_method".into(),
                self.signature.method_name().into(),
            ),
            ("oauth_timestamp".into(), timestamp.into()),
            ("oauth_version".into(), "1.0".into()),
        ]);
        let token_secret = match token {
            Some((token, secret)) => {
                oauth.push(("oauth_token".into(), token.into()));
                secret
            }
            None => "",
        };

        let signature = self.signature.sign(
            request.method(),
            request.uri(),
            oauth
                .iter()
                .cloned()
                .chain(request.form_params().iter().cloned()),
            self.credentials.secret(),
            token_secret,
        );
        oauth.push(("oauth_signature".into(), signature));

        let fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    fn sign_request(
        &self,
        request: &mut PreparedRequest,
        oauth_params: &[(&str, &str)],
        token: Option<(&str, &str)>,
    ) -> Result<()> {
        let header =
            self.authorization_header(request, oauth_params, token, &generate_nonce(), &timestamp());
        request.set_header("Authorization", &header)?;
        Ok(())
    }
}

impl<C, S, M> OAuth1Service<C, S, M>
where
    C: HttpClient + Sync,
    S: TokenStorage<OAuth1Token>,
    M: SignatureMethod,
{
    /// Obtain temporary credentials. The result is returned, not stored.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(service = %self.profile.name)))]
    pub async fn request_request_token(&self) -> Result<OAuth1Token> {
        let callback = self
            .credentials
            .callback_url()
            .map(|url| url.as_str())
            .unwrap_or("oob");
        let mut request = PreparedRequest::new(
            Method::POST.as_str(),
            self.request_token_uri(),
            NO_HEADERS,
            RequestBody::Empty,
        )?;
        self.sign_request(&mut request, &[("oauth_callback", callback)], None)?;

        let response = dispatch(&self.client, request).await?;
        let token = (self.profile.parse_request_token)(&self.profile, response.body())?;
        ensure_success(response.status(), response.body())?;
        Ok(token)
    }

    /// Exchange an authorized request token for access credentials and
    /// persist them.
    ///
    /// `request_token` is the token from [`Self::request_request_token`];
    /// when `None` it is loaded from storage. Its public token must equal
    /// `token`.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(service = %self.profile.name, account = %self.account)))]
    pub async fn request_access_token(
        &self,
        token: &str,
        verifier: &str,
        request_token: Option<&OAuth1Token>,
    ) -> Result<OAuth1Token> {
        let key = self.storage_key();
        let stored;
        let request_token = match request_token {
            Some(request_token) => request_token,
            None => {
                stored = self.storage.retrieve_access_token(&key).await?;
                &stored
            }
        };
        if request_token.request_token != token {
            return Err(OAuthError::invalid_request(format_smolstr!(
                "request token {token:?} does not match the one issued"
            )));
        }

        let mut request = PreparedRequest::new(
            Method::POST.as_str(),
            Uri::from(self.profile.access_token_endpoint.clone()),
            NO_HEADERS,
            RequestBody::form([("oauth_verifier", verifier)]),
        )?;
        self.sign_request(
            &mut request,
            &[],
            Some((token, request_token.request_token_secret.as_str())),
        )?;

        let response = dispatch(&self.client, request).await?;
        let access = (self.profile.parse_access_token)(&self.profile, response.body())?;
        ensure_success(response.status(), response.body())?;

        self.storage
            .store_access_token(key.clone(), access.clone())
            .await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(key = %key, "stored oauth1 access token");
        Ok(access)
    }

    /// Send a signed API request with the stored access token.
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
        let (Some(access_token), Some(access_secret)) =
            (&token.access_token, &token.access_token_secret)
        else {
            return Err(OAuthError::token_not_found(key)
                .with_help("the stored token is a request token; finish the authorization flow"));
        };

        let mut request = PreparedRequest::new(method, uri, headers, body)?;
        self.sign_request(
            &mut request,
            &[],
            Some((access_token.as_str(), access_secret.as_str())),
        )?;
        Ok(dispatch(&self.client, request).await?)
    }
}

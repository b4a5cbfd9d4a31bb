//! # Portcullis
//!
//! OAuth 1.0a and OAuth 2.0 client engine.
//!
//! Portcullis drives the token dance against third-party providers and then
//! signs or authorizes your API requests with the result. Providers are plain
//! data ([`OAuth1Profile`], [`OAuth2Profile`]); the protocol lives in two
//! generic services. Tokens are persisted through [`TokenStorage`], and HTTP
//! goes through whatever [`HttpClient`] you hand in (`reqwest` by default).
//!
//! ## Crates
//!
//! - `portcullis-common`: credentials, token primitives, the URI builder, the
//!   transport trait, request normalization, token storage
//! - `portcullis-oauth`: the signature engine, provider profiles, the OAuth
//!   1.0a and OAuth 2.0 services
//! - `portcullis` (this crate): re-exports, built-in providers, and the
//!   name-based [`ServiceFactory`]
//!
//! ## Example
//!
//! ```no_run
//! use miette::IntoDiagnostic;
//! use portcullis::url::Url;
//! use portcullis::{
//!     ConsumerCredentials, MemoryTokenStorage, RequestBody, ServiceFactory, TransportOptions,
//! };
//!
//! # async fn run() -> miette::Result<()> {
//! let factory = ServiceFactory::with_builtin(&TransportOptions::default())?;
//! let credentials = ConsumerCredentials::with_callback(
//!     "client-id",
//!     "client-secret",
//!     Url::parse("https://app.example.com/callback").into_diagnostic()?,
//! );
//! let pinterest = factory
//!     .create_service("pinterest", credentials, MemoryTokenStorage::new(), &["read_public"])?
//!     .into_oauth2()
//!     .expect("pinterest is an OAuth 2.0 provider");
//!
//! // Send the user here, remember `state`.
//! let (redirect, state) = pinterest.authorization_uri([("display", "popup")]);
//! println!("visit {redirect}");
//!
//! // The provider redirects back with `?code=...&state=...`.
//! pinterest
//!     .request_access_token("code-from-redirect", Some("state-from-redirect"), state.as_deref())
//!     .await?;
//!
//! let response = pinterest
//!     .request("v1/me/", "GET", RequestBody::Empty, [("Accept", "application/json")])
//!     .await?;
//! println!("{}", String::from_utf8_lossy(response.body()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod factory;
pub mod providers;

pub use portcullis_common::*;
pub use portcullis_oauth as oauth;
pub use portcullis_oauth::{
    ApiEndpoint, AuthorizationMode, BodyEncoding, DEFAULT_ACCOUNT, HmacSha1, HmacSha256,
    OAuth1Profile, OAuth1Service, OAuth1Token, OAuth2Profile, OAuth2Service, OAuth2Token,
    OAuthError, OAuthErrorKind, PlainText, ResolvedEndpoint, Signature, SignatureMethod,
    TokenPhase, TokenRequest,
};

pub use factory::{FactoryError, ProviderProfile, ProviderRegistry, Service, ServiceFactory};

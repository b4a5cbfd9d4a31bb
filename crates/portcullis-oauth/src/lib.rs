//! OAuth 1.0a and OAuth 2.0 protocol engine for Portcullis.
//!
//! One generic service per protocol version, parameterized by a provider
//! profile. Transport and storage come from `portcullis-common`.

pub mod error;
pub mod oauth1;
pub mod oauth2;
pub mod profile;
pub mod signature;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::{OAuthError, OAuthErrorKind, Result};
pub use oauth1::OAuth1Service;
pub use oauth2::{OAuth2Service, ResolvedEndpoint};
pub use profile::{
    ApiEndpoint, AuthorizationMode, BodyEncoding, OAuth1Profile, OAuth2Profile, TokenRequest,
};
pub use signature::{HmacSha1, HmacSha256, PlainText, Signature, SignatureMethod};
pub use types::{OAuth1Token, OAuth2Token, TokenPhase};

/// Account label used when the caller does not pick one.
pub const DEFAULT_ACCOUNT: &str = "default";

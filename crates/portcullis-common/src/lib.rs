//! Common types for the portcullis OAuth client engine

#![warn(missing_docs)]
pub use smol_str;
pub use url;

/// Consumer (application) credentials.
pub mod consumer;
pub mod error;
/// HTTP client abstraction used by portcullis crates.
pub mod http_client;
/// Request normalization and dispatch.
pub mod request;
/// Token storage traits and reference backends.
pub mod storage;
/// Token lifetime and extra-parameter primitives shared by OAuth1 and OAuth2.
pub mod token;
/// Mutable URI builder.
pub mod uri;

pub use consumer::ConsumerCredentials;
pub use error::{InvalidRequestError, TransportError};
pub use http_client::{HttpClient, TransportOptions};
pub use request::{FilePart, FormValue, PreparedRequest, RequestBody, dispatch};
pub use storage::{FileTokenStorage, MemoryTokenStorage, StorageError, TokenKey, TokenStorage};
pub use token::{EndOfLife, ExtraParams};
pub use uri::Uri;

//! # OAuth 1.0a request signing
//!
//! Base string (RFC 5849 §3.4.1):
//!
//! ```text
//! METHOD & enc(scheme://host[:port]/path) & enc(k1=v1&k2=v2...)
//! ```
//!
//! where every key and value is percent-encoded over the unreserved set
//! `A-Z a-z 0-9 - . _ ~`, pairs are sorted by encoded key then encoded value
//! (stable), and the URI query folds into the parameter set. The signing key
//! is `enc(consumer_secret)&enc(token_secret)`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use http::Method;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use portcullis_common::uri::Uri;

/// Everything except the RFC 3986 unreserved characters.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode per RFC 5849 §3.6 (upper-case hex, space as `%20`).
pub fn percent_encode(input: &str) -> String {
    utf8_percent_encode(input, OAUTH_ENCODE_SET).to_string()
}

/// A MAC (or plaintext) algorithm producing the encoded `oauth_signature`.
pub trait SignatureMethod: Send + Sync {
    /// Value of `oauth_signature_method`.
    fn name(&self) -> &'static str;

    /// Sign `base_string` with `key`, returning the signature text.
    fn sign(&self, key: &[u8], base_string: &[u8]) -> String;
}

/// `HMAC-SHA1`, the method every provider supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HmacSha1;

impl SignatureMethod for HmacSha1 {
    fn name(&self) -> &'static str {
        "HMAC-SHA1"
    }

    fn sign(&self, key: &[u8], base_string: &[u8]) -> String {
        let mut mac =
            Hmac::<sha1::Sha1>::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(base_string);
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// `HMAC-SHA256`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HmacSha256;

impl SignatureMethod for HmacSha256 {
    fn name(&self) -> &'static str {
        "HMAC-SHA256"
    }

    fn sign(&self, key: &[u8], base_string: &[u8]) -> String {
        let mut mac =
            Hmac::<sha2::Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
        mac.update(base_string);
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

/// `PLAINTEXT`: the signature is the signing key itself. Only safe over TLS.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlainText;

impl SignatureMethod for PlainText {
    fn name(&self) -> &'static str {
        "PLAINTEXT"
    }

    fn sign(&self, key: &[u8], _base_string: &[u8]) -> String {
        String::from_utf8_lossy(key).into_owned()
    }
}

/// Per-call signing inputs. Built, signed and dropped; never stored.
#[derive(Debug, Clone)]
pub struct SignatureContext<'a> {
    pub method: &'a Method,
    pub normalized_uri: String,
    pub parameters: Vec<(String, String)>,
    pub consumer_secret: &'a str,
    pub token_secret: &'a str,
}

impl<'a> SignatureContext<'a> {
    /// Gather the signing inputs: request parameters plus the URI query.
    /// Any `oauth_signature` parameter is dropped.
    pub fn new<K, V>(
        method: &'a Method,
        uri: &Uri,
        parameters: impl IntoIterator<Item = (K, V)>,
        consumer_secret: &'a str,
        token_secret: &'a str,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let parameters = parameters
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .chain(uri.query_pairs())
            .filter(|(k, _)| k != "oauth_signature")
            .collect();
        Self {
            method,
            normalized_uri: normalize_uri(uri),
            parameters,
            consumer_secret,
            token_secret,
        }
    }

    /// Encoded, sorted, `&`-joined parameter string.
    pub fn normalized_parameters(&self) -> String {
        let mut encoded: Vec<(String, String)> = self
            .parameters
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v)))
            .collect();
        // sort_by is stable: equal pairs keep caller order
        encoded.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// The exact bytes that get signed.
    pub fn base_string(&self) -> String {
        format!(
            "{}&{}&{}",
            self.method.as_str(),
            percent_encode(&self.normalized_uri),
            percent_encode(&self.normalized_parameters())
        )
    }

    pub fn signing_key(&self) -> String {
        signing_key(self.consumer_secret, self.token_secret)
    }
}

/// `scheme://host[:port]/path`, lower-cased scheme and host, default port
/// dropped, query and fragment stripped.
pub fn normalize_uri(uri: &Uri) -> String {
    let scheme = uri.scheme().to_ascii_lowercase();
    let host = uri.host().unwrap_or_default().to_ascii_lowercase();
    let port = match (scheme.as_str(), uri.port()) {
        ("http", Some(80)) | ("https", Some(443)) | (_, None) => String::new(),
        (_, Some(port)) => format!(":{port}"),
    };
    format!("{scheme}://{host}{port}{}", uri.path())
}

/// `enc(consumer_secret)&enc(token_secret)`.
pub fn signing_key(consumer_secret: &str, token_secret: &str) -> String {
    format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    )
}

/// OAuth1 signature engine, generic over the MAC.
#[derive(Debug, Clone, Copy, Default)]
pub struct Signature<M = HmacSha1> {
    method: M,
}

impl<M: SignatureMethod> Signature<M> {
    pub fn new(method: M) -> Self {
        Self { method }
    }

    /// `oauth_signature_method` value for this engine.
    pub fn method_name(&self) -> &'static str {
        self.method.name()
    }

    /// Sign a request. Parameter order does not matter.
    pub fn sign<K, V>(
        &self,
        method: &Method,
        uri: &Uri,
        parameters: impl IntoIterator<Item = (K, V)>,
        consumer_secret: &str,
        token_secret: &str,
    ) -> String
    where
        K: Into<String>,
        V: Into<String>,
    {
        let context = SignatureContext::new(method, uri, parameters, consumer_secret, token_secret);
        self.sign_context(&context)
    }

    pub fn sign_context(&self, context: &SignatureContext<'_>) -> String {
        self.method.sign(
            context.signing_key().as_bytes(),
            context.base_string().as_bytes(),
        )
    }
}

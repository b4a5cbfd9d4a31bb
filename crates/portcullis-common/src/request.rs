//! # Request normalization and dispatch
//!
//! [`PreparedRequest::new`] turns loosely-typed caller input (method name,
//! header pairs, a [`RequestBody`]) into a normalized request:
//!
//! - the method is upper-cased and validated;
//! - header names are parsed case-insensitively into an [`http::HeaderMap`];
//! - a GET/HEAD form body is folded into the query string;
//! - any other form body without a content type becomes
//!   `application/x-www-form-urlencoded`, or `multipart/form-data` when it
//!   carries files;
//! - `Host` and `Connection: close` are always written last.
//!
//! The prepared request exposes its final URI and, when the body goes out
//! as `application/x-www-form-urlencoded`, its form pairs, so OAuth1 signing
//! runs over exactly what the server will see.

use http::header::{CONNECTION, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::error::{InvalidRequestError, TransportError};
use crate::http_client::HttpClient;
use crate::uri::Uri;

/// Urlencoded form content type.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
/// Multipart form content type (without boundary).
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// A file entry in a form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// File name reported to the server.
    pub file_name: String,
    /// Content type of the part, `application/octet-stream` when absent.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A single form value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    /// Plain text value.
    Text(String),
    /// File upload; forces multipart encoding.
    File(FilePart),
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<FilePart> for FormValue {
    fn from(value: FilePart) -> Self {
        Self::File(value)
    }
}

/// Caller-supplied request body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// Opaque bytes, sent verbatim.
    Raw(Vec<u8>),
    /// Key-value form.
    Form(Vec<(String, FormValue)>),
}

impl RequestBody {
    /// Build a text-only form from pairs.
    pub fn form<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), FormValue::Text(v.into())))
                .collect(),
        )
    }

    /// Whether there is anything to send.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Raw(bytes) => bytes.is_empty(),
            Self::Form(pairs) => pairs.is_empty(),
        }
    }

    fn has_files(&self) -> bool {
        matches!(self, Self::Form(pairs) if pairs.iter().any(|(_, v)| matches!(v, FormValue::File(_))))
    }
}

/// A normalized request ready for signing/authorization and dispatch.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Vec<u8>,
    form_params: Vec<(String, String)>,
}

impl PreparedRequest {
    /// Normalize caller input into a request.
    pub fn new<K, V>(
        method: &str,
        uri: Uri,
        headers: impl IntoIterator<Item = (K, V)>,
        body: RequestBody,
    ) -> Result<Self, InvalidRequestError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let method = parse_method(method)?;
        let mut uri = uri;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
            // last writer wins for duplicate caller headers
            header_map.insert(name, value);
        }

        let mut encoded = Vec::new();
        let mut form_params = Vec::new();

        if method == Method::GET || method == Method::HEAD {
            match body {
                body if body.is_empty() => {}
                RequestBody::Form(pairs) => {
                    for (key, value) in pairs {
                        match value {
                            FormValue::Text(value) => {
                                uri.add_to_query(&key, &value);
                            }
                            FormValue::File(_) => {
                                return Err(flat_body_error(&method));
                            }
                        }
                    }
                }
                _ => return Err(flat_body_error(&method)),
            }
        } else {
            let has_files = body.has_files();
            match body {
                RequestBody::Empty => {}
                RequestBody::Raw(bytes) => encoded = bytes,
                RequestBody::Form(pairs) if has_files => {
                    let boundary = generate_boundary();
                    encoded = encode_multipart(&boundary, &pairs);
                    let content_type = format!("{MULTIPART_FORM_DATA}; boundary={boundary}");
                    if header_map.contains_key(CONTENT_TYPE) {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("replacing caller content-type with multipart boundary");
                    }
                    header_map.insert(CONTENT_TYPE, header_value(&content_type)?);
                }
                RequestBody::Form(pairs) => {
                    let pairs: Vec<(String, String)> = pairs
                        .into_iter()
                        .filter_map(|(k, v)| match v {
                            FormValue::Text(v) => Some((k, v)),
                            FormValue::File(_) => None,
                        })
                        .collect();
                    encoded = serde_html_form::to_string(&pairs)
                        .map_err(|e| InvalidRequestError::new(format!("form encoding: {e}")))?
                        .into_bytes();
                    if !header_map.contains_key(CONTENT_TYPE) {
                        header_map.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
                    }
                    // only an urlencoded entity body carries signable parameters
                    if is_form_urlencoded(&header_map) {
                        form_params = pairs;
                    }
                }
            }
        }

        let host = uri
            .authority()
            .ok_or_else(|| InvalidRequestError::new(format!("URI has no host: {uri}")))?;
        overwrite_header(&mut header_map, HOST, header_value(&host)?);
        overwrite_header(&mut header_map, CONNECTION, HeaderValue::from_static("close"));

        Ok(Self {
            method,
            uri,
            headers: header_map,
            body: encoded,
            form_params,
        })
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Final request URI (including any folded query parameters).
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Mutable access to the URI, for query-based authorization.
    pub fn uri_mut(&mut self) -> &mut Uri {
        &mut self.uri
    }

    /// Normalized headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Encoded body bytes.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Pairs of an urlencoded form body. Empty for raw and multipart bodies
    /// and for forms sent under another content type.
    pub fn form_params(&self) -> &[(String, String)] {
        &self.form_params
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), InvalidRequestError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Convert into an [`http::Request`].
    pub fn into_http(self) -> Result<http::Request<Vec<u8>>, InvalidRequestError> {
        let mut request = http::Request::builder()
            .method(self.method)
            .uri(self.uri.absolute())
            .body(self.body)?;
        *request.headers_mut() = self.headers;
        Ok(request)
    }
}

fn is_form_urlencoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_URLENCODED))
}

/// Send a prepared request through the transport.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(method = %request.method(), uri = %request.uri())))]
pub async fn dispatch<C>(
    client: &C,
    request: PreparedRequest,
) -> Result<http::Response<Vec<u8>>, TransportError>
where
    C: HttpClient + Sync,
{
    let request = request
        .into_http()
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    client
        .send_http(request)
        .await
        .map_err(TransportError::other)
}

fn parse_method(method: &str) -> Result<Method, InvalidRequestError> {
    let upper = method.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(InvalidRequestError::new("empty HTTP method"));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| InvalidRequestError::new(format!("invalid HTTP method: {method:?}")))
}

fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), InvalidRequestError> {
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| InvalidRequestError::new(format!("invalid header name: {name:?}")))?;
    Ok((name, header_value(value)?))
}

fn header_value(value: &str) -> Result<HeaderValue, InvalidRequestError> {
    HeaderValue::from_str(value)
        .map_err(|_| InvalidRequestError::new(format!("invalid header value: {value:?}")))
}

fn overwrite_header(headers: &mut HeaderMap, name: HeaderName, value: HeaderValue) {
    if let Some(previous) = headers.insert(name.clone(), value.clone()) {
        if previous != value {
            #[cfg(feature = "tracing")]
            tracing::debug!(header = %name, "overriding caller-supplied header");
        }
    }
}

fn flat_body_error(method: &Method) -> InvalidRequestError {
    InvalidRequestError::new(format!("{method} body must be a flat key-value mapping"))
        .with_help("pass text form pairs; they are appended to the query string")
}

fn generate_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("------------------------{token}")
}

fn encode_multipart(boundary: &str, pairs: &[(String, FormValue)]) -> Vec<u8> {
    let mut out = Vec::new();
    for (name, value) in pairs {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match value {
            FormValue::Text(text) => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", quote(name))
                        .as_bytes(),
                );
                out.extend_from_slice(text.as_bytes());
            }
            FormValue::File(file) => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        quote(name),
                        quote(&file.file_name)
                    )
                    .as_bytes(),
                );
                let content_type = file
                    .content_type
                    .as_deref()
                    .unwrap_or("application/octet-stream");
                out.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                out.extend_from_slice(&file.bytes);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}

fn quote(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

//! Queued mock transport for tests.
//!
//! Responses are served in the order they were pushed and every request is
//! recorded. Running out of queued responses panics.

use std::collections::VecDeque;
use std::sync::Arc;

use http::{HeaderMap, Method};
use percent_encoding::percent_decode_str;
use portcullis_common::http_client::HttpClient;
use tokio::sync::Mutex;

/// A request as the transport saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body_text(&self) -> &str {
        std::str::from_utf8(&self.body).expect("request body is UTF-8")
    }

    /// First decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        url::Url::parse(&self.uri)
            .expect("recorded URI is absolute")
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Decoded fields of an `Authorization: OAuth ...` header.
    pub fn oauth_params(&self) -> Vec<(String, String)> {
        oauth_header_params(self.header("authorization").expect("request is signed"))
    }
}

/// Parse an `OAuth k="v", ...` header into decoded pairs.
pub fn oauth_header_params(header: &str) -> Vec<(String, String)> {
    let decode = |s: &str| {
        percent_decode_str(s)
            .decode_utf8()
            .expect("header field is UTF-8")
            .into_owned()
    };
    header
        .strip_prefix("OAuth ")
        .expect("OAuth scheme")
        .split(", ")
        .map(|field| {
            let (key, value) = field.split_once('=').expect("key=value field");
            (decode(key), decode(value.trim_matches('"')))
        })
        .collect()
}

/// Value for `key` in decoded pairs.
pub fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[derive(Clone, Default)]
pub struct MockClient {
    queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockClient {
    pub async fn push(&self, status: u16, body: &str) {
        let response = http::Response::builder()
            .status(status)
            .body(body.as_bytes().to_vec())
            .expect("valid status code");
        self.queue.lock().await.push_back(response);
    }

    pub async fn requests(&self) -> Vec<Recorded> {
        self.log.lock().await.clone()
    }

    pub async fn last(&self) -> Recorded {
        self.log
            .lock()
            .await
            .last()
            .cloned()
            .expect("no request sent")
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let queue = self.queue.clone();
        let log = self.log.clone();
        async move {
            let (parts, body) = request.into_parts();
            log.lock().await.push(Recorded {
                method: parts.method,
                uri: parts.uri.to_string(),
                headers: parts.headers,
                body,
            });
            Ok(queue
                .lock()
                .await
                .pop_front()
                .expect("no queued response"))
        }
    }
}

//! Minimal HTTP client abstraction shared across crates.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// HTTP client trait for sending raw HTTP requests.
///
/// Implementations own timeouts and redirect handling; the engine issues one
/// request per exchange and never retries.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait HttpClient {
    /// Error type returned by the HTTP client
    type Error: std::error::Error + Display + Send + Sync + 'static;

    /// Send an HTTP request and return the response.
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>>;
}

/// Transport limits applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, bon::Builder)]
pub struct TransportOptions {
    /// Upper bound on a single round trip.
    #[builder(default = Duration::from_secs(15))]
    pub timeout: Duration,
    /// Maximum number of redirects followed before giving up.
    #[builder(default = 5)]
    pub max_redirects: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[cfg(feature = "reqwest-client")]
impl TransportOptions {
    /// Build a `reqwest::Client` honoring these limits.
    pub fn reqwest_client(&self) -> Result<reqwest::Client, crate::error::TransportError> {
        let builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects));
        #[cfg(not(target_arch = "wasm32"))]
        let builder = builder.timeout(self.timeout);
        Ok(builder.build()?)
    }
}

#[cfg(feature = "reqwest-client")]
impl HttpClient for reqwest::Client {
    type Error = reqwest::Error;

    async fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> core::result::Result<http::Response<Vec<u8>>, Self::Error> {
        // Convert http::Request to reqwest::Request
        let (parts, body) = request.into_parts();

        let mut req = self.request(parts.method, parts.uri.to_string()).body(body);

        // Copy headers
        for (name, value) in parts.headers.iter() {
            req = req.header(name.as_str(), value.as_bytes());
        }

        let resp = req.send().await?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?.to_vec();

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl<T: HttpClient + Sync> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> + Send
    {
        self.as_ref().send_http(request)
    }
}

#[cfg(target_arch = "wasm32")]
impl<T: HttpClient> HttpClient for Arc<T> {
    type Error = T::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>> {
        self.as_ref().send_http(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_defaults() {
        let opts = TransportOptions::default();
        assert_eq!(opts.timeout, Duration::from_secs(15));
        assert_eq!(opts.max_redirects, 5);
    }

    #[test]
    fn transport_overrides() {
        let opts = TransportOptions::builder()
            .timeout(Duration::from_secs(3))
            .max_redirects(0)
            .build();
        assert_eq!(opts.timeout, Duration::from_secs(3));
        assert_eq!(opts.max_redirects, 0);
    }
}

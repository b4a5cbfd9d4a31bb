use std::fmt;
use std::str::FromStr;

use url::Url;

/// Mutable URI builder used for authorization redirects and API requests.
///
/// Query keys are unique: [`Uri::add_to_query`] replaces an existing value
/// rather than appending a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri(Url);

impl Uri {
    /// Parse an absolute URI.
    pub fn parse(input: &str) -> Result<Self, url::ParseError> {
        Url::parse(input).map(Self)
    }

    /// Scheme, lower-cased.
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Host, lower-cased for domain names.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    /// Explicit non-default port.
    pub fn port(&self) -> Option<u16> {
        self.0.port()
    }

    /// `host` or `host:port` when the port is not the scheme default.
    pub fn authority(&self) -> Option<String> {
        let host = self.host()?;
        Some(match self.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        })
    }

    /// Path component.
    pub fn path(&self) -> &str {
        self.0.path()
    }

    /// Raw query string, if any.
    pub fn query(&self) -> Option<&str> {
        self.0.query()
    }

    /// Fragment, if any.
    pub fn fragment(&self) -> Option<&str> {
        self.0.fragment()
    }

    /// Decoded query pairs in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<String> {
        self.0
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Set a query parameter, replacing any existing value for `key`.
    pub fn add_to_query(&mut self, key: &str, value: &str) -> &mut Self {
        let mut pairs = self.query_pairs();
        match pairs.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value.to_owned(),
            None => pairs.push((key.to_owned(), value.to_owned())),
        }
        self.0.query_pairs_mut().clear().extend_pairs(pairs);
        self
    }

    /// Remove a query parameter.
    pub fn remove_from_query(&mut self, key: &str) -> &mut Self {
        let pairs: Vec<_> = self
            .query_pairs()
            .into_iter()
            .filter(|(k, _)| k != key)
            .collect();
        if pairs.is_empty() {
            self.0.set_query(None);
        } else {
            self.0.query_pairs_mut().clear().extend_pairs(pairs);
        }
        self
    }

    /// Replace the fragment.
    pub fn set_fragment(&mut self, fragment: Option<&str>) -> &mut Self {
        self.0.set_fragment(fragment);
        self
    }

    /// Resolve `path` against this URI. Absolute URLs are returned as-is.
    pub fn join(&self, path: &str) -> Result<Self, url::ParseError> {
        self.0.join(path).map(Self)
    }

    /// The full absolute URI string.
    pub fn absolute(&self) -> &str {
        self.0.as_str()
    }

    /// Borrow the inner [`Url`].
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Take the inner [`Url`].
    pub fn into_url(self) -> Url {
        self.0
    }
}

impl From<Url> for Uri {
    fn from(url: Url) -> Self {
        Self(url)
    }
}

impl From<Uri> for Url {
    fn from(uri: Uri) -> Self {
        uri.0
    }
}

impl FromStr for Uri {
    type Err = url::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

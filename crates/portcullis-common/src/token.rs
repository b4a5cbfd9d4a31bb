use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// When a token stops being valid.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case", tag = "kind", content = "at")]
pub enum EndOfLife {
    /// Expires at the given instant.
    At(DateTime<Utc>),
    /// The provider declared the token permanent.
    NeverExpires,
    /// The provider said nothing about expiry.
    #[default]
    Unknown,
}

impl EndOfLife {
    /// Expiry `seconds` from now. Non-positive lifetimes are already expired.
    ///
    /// Lifetimes past the representable range clamp: far-future ones never
    /// expire, far-past ones expire at the earliest instant.
    pub fn from_lifetime(seconds: i64) -> Self {
        let now = Utc::now();
        match TimeDelta::try_seconds(seconds).and_then(|delta| now.checked_add_signed(delta)) {
            Some(at) => Self::At(at),
            None if seconds > 0 => Self::NeverExpires,
            None => Self::At(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// True only for a concrete instant that has passed.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Expiry check against an explicit clock.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::At(at) if *at <= now)
    }
}

/// Provider response fields the engine does not interpret, in response order.
///
/// Keys are unique; inserting an existing key replaces its value in place.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct ExtraParams(Vec<(SmolStr, SmolStr)>);

impl ExtraParams {
    /// Empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: impl Into<SmolStr>, value: impl Into<SmolStr>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    /// Remove a parameter, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<SmolStr> {
        let idx = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(idx).1)
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for ExtraParams
where
    K: Into<SmolStr>,
    V: Into<SmolStr>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extra_params_keep_order_and_unique_keys() {
        let mut params: ExtraParams = [("b", "1"), ("a", "2")].into_iter().collect();
        params.insert("b", "3");
        params.insert("c", "4");
        let pairs: Vec<_> = params.iter().collect();
        assert_eq!(pairs, vec![("b", "3"), ("a", "2"), ("c", "4")]);
        assert_eq!(params.remove("a").as_deref(), Some("2"));
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn end_of_life_expiry() {
        assert!(!EndOfLife::NeverExpires.is_expired());
        assert!(!EndOfLife::Unknown.is_expired());
        assert!(EndOfLife::from_lifetime(-10).is_expired());
        assert!(!EndOfLife::from_lifetime(3600).is_expired());
    }

    #[test]
    fn end_of_life_clamps_out_of_range_lifetimes() {
        assert_eq!(EndOfLife::from_lifetime(i64::MAX), EndOfLife::NeverExpires);
        assert_eq!(
            EndOfLife::from_lifetime(99_999_999_999_999_999),
            EndOfLife::NeverExpires
        );
        assert!(EndOfLife::from_lifetime(i64::MIN).is_expired());
    }

    #[test]
    fn end_of_life_serde() {
        let json = serde_json::to_string(&EndOfLife::NeverExpires).unwrap();
        assert_eq!(json, r#"{"kind":"never_expires"}"#);
        let back: EndOfLife = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EndOfLife::NeverExpires);
    }
}

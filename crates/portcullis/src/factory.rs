//! Provider lookup by name.
//!
//! [`ProviderRegistry`] maps provider names to profiles; [`ServiceFactory`]
//! turns a name plus credentials and storage into a ready service. When a
//! provider has both an OAuth 2.0 and an OAuth 1.0a profile, OAuth 2.0 wins.

use std::collections::HashMap;

use portcullis_common::consumer::ConsumerCredentials;
use portcullis_oauth::oauth1::OAuth1Service;
use portcullis_oauth::oauth2::OAuth2Service;
use portcullis_oauth::profile::{OAuth1Profile, OAuth2Profile};
use smol_str::SmolStr;

use crate::providers;

/// Errors from [`ServiceFactory::create_service`].
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum FactoryError {
    /// No profile is registered under this name
    #[error("unknown provider: {0}")]
    #[diagnostic(
        code(portcullis::factory::unknown_provider),
        help("register the profile with ProviderRegistry first")
    )]
    UnknownProvider(SmolStr),

    /// Scopes were passed for a provider that only speaks OAuth 1.0a
    #[error("scopes passed for OAuth 1.0a provider {0}")]
    #[diagnostic(
        code(portcullis::factory::scopes_not_supported),
        help("OAuth 1.0a services take scopes through OAuth1Service::with_scopes")
    )]
    ScopesNotSupported(SmolStr),
}

/// A profile of either protocol version.
#[derive(Debug, Clone)]
pub enum ProviderProfile {
    /// OAuth 1.0a provider
    OAuth1(OAuth1Profile),
    /// OAuth 2.0 provider
    OAuth2(OAuth2Profile),
}

/// Name to profile map. Names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    oauth1: HashMap<SmolStr, OAuth1Profile>,
    oauth2: HashMap<SmolStr, OAuth2Profile>,
}

impl ProviderRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with every profile in [`providers`].
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for profile in providers::oauth1_profiles() {
            registry.register_oauth1(profile);
        }
        for profile in providers::oauth2_profiles() {
            registry.register_oauth2(profile);
        }
        registry
    }

    /// Add or replace an OAuth 1.0a profile under its name.
    pub fn register_oauth1(&mut self, profile: OAuth1Profile) -> &mut Self {
        self.oauth1.insert(normalize(&profile.name), profile);
        self
    }

    /// Add or replace an OAuth 2.0 profile under its name.
    pub fn register_oauth2(&mut self, profile: OAuth2Profile) -> &mut Self {
        self.oauth2.insert(normalize(&profile.name), profile);
        self
    }

    /// Look a provider up, preferring its OAuth 2.0 profile.
    pub fn get(&self, name: &str) -> Option<ProviderProfile> {
        let key = normalize(name);
        self.oauth2
            .get(&key)
            .cloned()
            .map(ProviderProfile::OAuth2)
            .or_else(|| self.oauth1.get(&key).cloned().map(ProviderProfile::OAuth1))
    }

    /// Every registered name, sorted and deduplicated.
    pub fn names(&self) -> Vec<SmolStr> {
        let mut names: Vec<SmolStr> = self
            .oauth1
            .keys()
            .chain(self.oauth2.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn normalize(name: &str) -> SmolStr {
    SmolStr::new(name.trim().to_ascii_lowercase())
}

/// A service of either protocol version.
pub enum Service<C, S> {
    /// OAuth 1.0a service
    OAuth1(OAuth1Service<C, S>),
    /// OAuth 2.0 service
    OAuth2(OAuth2Service<C, S>),
}

impl<C, S> Service<C, S> {
    /// Provider name of the underlying profile.
    pub fn name(&self) -> &str {
        match self {
            Self::OAuth1(service) => service.profile().name.as_str(),
            Self::OAuth2(service) => service.profile().name.as_str(),
        }
    }

    /// The OAuth 1.0a service, if that is what was created.
    pub fn into_oauth1(self) -> Option<OAuth1Service<C, S>> {
        match self {
            Self::OAuth1(service) => Some(service),
            Self::OAuth2(_) => None,
        }
    }

    /// The OAuth 2.0 service, if that is what was created.
    pub fn into_oauth2(self) -> Option<OAuth2Service<C, S>> {
        match self {
            Self::OAuth2(service) => Some(service),
            Self::OAuth1(_) => None,
        }
    }
}

/// Builds services from registered profiles, sharing one transport.
#[derive(Debug, Clone)]
pub struct ServiceFactory<C> {
    client: C,
    registry: ProviderRegistry,
}

impl<C: Clone> ServiceFactory<C> {
    /// Factory over `registry` using `client` for every service.
    pub fn new(client: C, registry: ProviderRegistry) -> Self {
        Self { client, registry }
    }

    /// The registry services are created from.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Create a service for `name`.
    ///
    /// OAuth 2.0 scopes are matched against the profile's catalogue by
    /// constant name, ignoring case; unknown scopes pass through. Scopes for
    /// an OAuth 1.0a-only provider are an error.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip(self, credentials, storage, scopes)))]
    pub fn create_service<S>(
        &self,
        name: &str,
        credentials: ConsumerCredentials,
        storage: S,
        scopes: &[&str],
    ) -> Result<Service<C, S>, FactoryError> {
        match self.registry.get(name) {
            Some(ProviderProfile::OAuth2(profile)) => {
                let resolved: Vec<SmolStr> = scopes
                    .iter()
                    .map(|scope| profile.resolve_scope(scope))
                    .collect();
                Ok(Service::OAuth2(
                    OAuth2Service::new(profile, credentials, self.client.clone(), storage)
                        .with_scopes(resolved),
                ))
            }
            Some(ProviderProfile::OAuth1(profile)) => {
                if !scopes.is_empty() {
                    return Err(FactoryError::ScopesNotSupported(profile.name));
                }
                Ok(Service::OAuth1(OAuth1Service::new(
                    profile,
                    credentials,
                    self.client.clone(),
                    storage,
                )))
            }
            None => Err(FactoryError::UnknownProvider(SmolStr::new(name))),
        }
    }
}

#[cfg(feature = "reqwest-client")]
impl ServiceFactory<reqwest::Client> {
    /// Factory over the built-in providers with a reqwest client honoring
    /// `options`.
    pub fn with_builtin(
        options: &portcullis_common::http_client::TransportOptions,
    ) -> Result<Self, portcullis_common::error::TransportError> {
        Ok(Self::new(
            options.reqwest_client()?,
            ProviderRegistry::with_builtin(),
        ))
    }
}

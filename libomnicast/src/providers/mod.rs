//! Provider abstraction and implementations
//!
//! One capability interface covers everything the rest of the system needs
//! from a platform: building an authorize URL, exchanging an authorization
//! code, optionally upgrading to a long-lived token, fetching the account
//! profile, and publishing a post.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::error::{ProviderError, Result};
use crate::types::{ProviderProfile, ProviderTokens, ScheduledPost, SocialAccount};

pub mod instagram;
pub mod sandbox;

pub use instagram::InstagramAdapter;
pub use sandbox::SandboxAdapter;

/// Capability set every wired platform implements.
///
/// # Errors
///
/// Adapter calls fail with `ProviderError::Config` when required
/// credentials or configuration are absent, `ProviderError::Http` when the
/// upstream returns a non-success status, and `ProviderError::Network` for
/// transport failures, always tagged with the platform.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + std::fmt::Debug {
    /// Lowercase platform identifier (e.g. "instagram")
    fn platform(&self) -> &str;

    /// Build the provider's authorize URL embedding the given CSRF state.
    fn build_auth_url(&self, state: &str, redirect_uri: &str) -> Result<Url>;

    /// Exchange an authorization code for tokens at the token endpoint.
    ///
    /// `redirect_uri` must exactly equal the value used to build the
    /// authorize URL; providers reject mismatches.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<ProviderTokens>;

    /// Upgrade short-lived tokens to long-lived ones.
    ///
    /// Default is a passthrough; platforms with a separate upgrade step
    /// override this.
    async fn upgrade_token(&self, tokens: ProviderTokens) -> Result<ProviderTokens> {
        Ok(tokens)
    }

    /// Fetch the provider-side account id and display name.
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile>;

    /// Publish a post through the linked account, returning the
    /// platform-specific post id.
    async fn publish(&self, account: &SocialAccount, post: &ScheduledPost) -> Result<String>;
}

/// Registry mapping platform identifiers to adapter instances.
///
/// An unrecognized platform fails with `ProviderError::Unsupported`; there
/// is no implicit mock fallback.
#[derive(Debug)]
pub struct ProviderRegistry {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Build the registry from configuration.
    ///
    /// Wired providers come from `[providers.*]`; sandbox adapters are added
    /// only for platforms listed under `[sandbox]` and only when the sandbox
    /// toggle is on, each logged so the substitution is auditable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();

        for (platform, provider_config) in &config.providers {
            if !provider_config.enabled {
                continue;
            }
            match platform.as_str() {
                "instagram" => {
                    info!("Creating Instagram provider adapter");
                    registry.register(Arc::new(InstagramAdapter::from_config(provider_config)?));
                }
                other => {
                    return Err(ProviderError::Unsupported(other.to_string()).into());
                }
            }
        }

        if config.sandbox.enabled {
            for platform in &config.sandbox.platforms {
                if registry.adapters.contains_key(platform) {
                    continue;
                }
                info!("Sandbox mode: registering synthetic adapter for {}", platform);
                registry.register(Arc::new(SandboxAdapter::new(platform.clone())));
            }
        }

        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters
            .insert(adapter.platform().to_string(), adapter);
    }

    pub fn get(&self, platform: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(platform)
            .cloned()
            .ok_or_else(|| ProviderError::Unsupported(platform.to_string()).into())
    }

    pub fn platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

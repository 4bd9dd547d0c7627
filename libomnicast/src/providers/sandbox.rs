//! Sandbox provider adapter
//!
//! Synthesizes deterministic success payloads for platforms without a wired
//! integration, without touching the network. Only registered when the
//! config's explicit sandbox toggle is on; production registries never fall
//! back to it silently.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{ProviderError, Result};
use crate::providers::ProviderAdapter;
use crate::types::{ProviderProfile, ProviderTokens, ScheduledPost, SocialAccount};

const SANDBOX_AUTHORIZE_ENDPOINT: &str = "https://sandbox.invalid/oauth/authorize";

/// Token lifetimes the real platforms advertise, mirrored so sandbox
/// credentials age like live ones.
fn token_ttl_secs(platform: &str) -> i64 {
    match platform {
        "twitter" => 7_200,
        "tiktok" => 86_400,
        "linkedin" => 5_184_000,
        "facebook" | "instagram" | "threads" => 5_184_000,
        _ => 3_600,
    }
}

fn digest(input: &str) -> String {
    format!("{:x}", Sha256::digest(input.as_bytes()))
}

#[derive(Debug)]
pub struct SandboxAdapter {
    platform: String,
}

impl SandboxAdapter {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for SandboxAdapter {
    fn platform(&self) -> &str {
        &self.platform
    }

    fn build_auth_url(&self, state: &str, redirect_uri: &str) -> Result<Url> {
        let mut url =
            Url::parse(SANDBOX_AUTHORIZE_ENDPOINT).map_err(|e| ProviderError::Config {
                platform: self.platform.clone(),
                message: format!("invalid sandbox endpoint: {}", e),
            })?;

        url.query_pairs_mut()
            .append_pair("client_id", "sandbox")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("state", state);

        Ok(url)
    }

    async fn exchange_code(&self, code: &str, _redirect_uri: &str) -> Result<ProviderTokens> {
        let token = format!(
            "sandbox-token-{}-{}",
            self.platform,
            &digest(&format!("{}:{}", self.platform, code))[..16]
        );

        Ok(ProviderTokens::from_response(
            token,
            None,
            Some(token_ttl_secs(&self.platform)),
        ))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile> {
        let id = digest(&format!("{}:{}", self.platform, access_token))[..12].to_string();

        Ok(ProviderProfile {
            display_name: format!("sandbox_{}", &id[..8]),
            provider_account_id: id,
        })
    }

    async fn publish(&self, _account: &SocialAccount, post: &ScheduledPost) -> Result<String> {
        Ok(format!(
            "{}-sandbox-{}",
            self.platform,
            &digest(&post.id)[..12]
        ))
    }
}

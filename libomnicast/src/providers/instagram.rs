//! Instagram provider adapter
//!
//! Real OAuth integration: authorize URL with client id, redirect URI,
//! scopes and state; form-encoded code exchange; short-lived → long-lived
//! token upgrade; authenticated profile fetch; and the two-step media
//! container publish flow of the Graph API.

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::providers::ProviderAdapter;
use crate::types::{ProviderProfile, ProviderTokens, ScheduledPost, SocialAccount};

const PLATFORM: &str = "instagram";
const AUTHORIZE_ENDPOINT: &str = "https://api.instagram.com/oauth/authorize";
const TOKEN_ENDPOINT: &str = "https://api.instagram.com/oauth/access_token";
const GRAPH_BASE: &str = "https://graph.instagram.com";

#[derive(Debug)]
pub struct InstagramAdapter {
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl InstagramAdapter {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        if config.client_id.trim().is_empty() || config.client_secret.trim().is_empty() {
            return Err(ProviderError::Config {
                platform: PLATFORM.to_string(),
                message: "client_id and client_secret are required".to_string(),
            }
            .into());
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Network {
                platform: PLATFORM.to_string(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
            http,
        })
    }

    fn network_err(e: reqwest::Error) -> ProviderError {
        ProviderError::Network {
            platform: PLATFORM.to_string(),
            message: e.to_string(),
        }
    }

    /// Map a non-success response to `ProviderError::Http` with the upstream
    /// body preserved, otherwise parse the JSON payload.
    async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                platform: PLATFORM.to_string(),
                status: status.as_u16(),
                message: body,
            }
            .into());
        }

        let value = response.json().await.map_err(Self::network_err)?;
        Ok(value)
    }

    fn require_str(value: &serde_json::Value, field: &str) -> Result<String> {
        match &value[field] {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            _ => Err(ProviderError::Http {
                platform: PLATFORM.to_string(),
                status: 200,
                message: format!("response is missing field '{}'", field),
            }
            .into()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for InstagramAdapter {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn build_auth_url(&self, state: &str, redirect_uri: &str) -> Result<Url> {
        let mut url = Url::parse(AUTHORIZE_ENDPOINT).map_err(|e| ProviderError::Config {
            platform: PLATFORM.to_string(),
            message: format!("invalid authorize endpoint: {}", e),
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            // Instagram joins scopes with commas, not spaces.
            .append_pair("scope", &self.scopes.join(","))
            .append_pair("state", state);

        Ok(url)
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<ProviderTokens> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
            ("code", code),
        ];

        let response = self
            .http
            .post(TOKEN_ENDPOINT)
            .form(&form)
            .send()
            .await
            .map_err(Self::network_err)?;

        let data = Self::parse_response(response).await?;
        let access_token = Self::require_str(&data, "access_token")?;

        // The basic exchange yields a short-lived token with no lifetime in
        // the payload; upgrade_token turns it into a 60-day one.
        Ok(ProviderTokens::from_response(access_token, None, None))
    }

    async fn upgrade_token(&self, tokens: ProviderTokens) -> Result<ProviderTokens> {
        let url = format!("{}/access_token", GRAPH_BASE);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("grant_type", "ig_exchange_token"),
                ("client_secret", self.client_secret.as_str()),
                ("access_token", tokens.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(Self::network_err)?;

        let data = Self::parse_response(response).await?;
        let access_token = Self::require_str(&data, "access_token")?;
        let expires_in = data["expires_in"].as_i64();

        Ok(ProviderTokens::from_response(
            access_token,
            tokens.refresh_token,
            expires_in,
        ))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile> {
        let url = format!("{}/me", GRAPH_BASE);
        let response = self
            .http
            .get(&url)
            .query(&[("fields", "id,username"), ("access_token", access_token)])
            .send()
            .await
            .map_err(Self::network_err)?;

        let data = Self::parse_response(response).await?;

        Ok(ProviderProfile {
            provider_account_id: Self::require_str(&data, "id")?,
            display_name: Self::require_str(&data, "username")?,
        })
    }

    async fn publish(&self, account: &SocialAccount, post: &ScheduledPost) -> Result<String> {
        // Instagram publishes media containers; a caption-only post has
        // nothing to attach and the API would reject it anyway.
        let image_url = post.media_urls.first().ok_or_else(|| ProviderError::Http {
            platform: PLATFORM.to_string(),
            status: 400,
            message: "instagram requires at least one media url".to_string(),
        })?;

        let container_url = format!("{}/{}/media", GRAPH_BASE, account.provider_account_id);
        let response = self
            .http
            .post(&container_url)
            .query(&[
                ("image_url", image_url.as_str()),
                ("caption", post.content.as_str()),
                ("access_token", account.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(Self::network_err)?;

        let container = Self::parse_response(response).await?;
        let creation_id = Self::require_str(&container, "id")?;

        let publish_url = format!(
            "{}/{}/media_publish",
            GRAPH_BASE, account.provider_account_id
        );
        let response = self
            .http
            .post(&publish_url)
            .query(&[
                ("creation_id", creation_id.as_str()),
                ("access_token", account.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(Self::network_err)?;

        let published = Self::parse_response(response).await?;
        Self::require_str(&published, "id")
    }
}

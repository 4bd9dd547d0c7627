//! Account linking service
//!
//! Drives the OAuth state machine: authorize URL → callback → token
//! exchange → credential storage, plus disconnect. The CSRF session is
//! claimed atomically before any provider call, so a replayed callback
//! loses even while the first one is still mid-exchange.

use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{LinkError, Result};
use crate::providers::ProviderRegistry;
use crate::types::{OAuthSession, SocialAccount};

use super::events::{Event, EventBus};

/// One sign-in identity at the application's authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub provider: String,
    pub external_id: String,
}

/// The external identity layer that owns end-user authentication.
///
/// Disconnect consults it for the identity count and delegates the actual
/// unlink; its outcome is what the caller sees.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn list_identities(&self, user_id: &str) -> Result<Vec<Identity>>;
    async fn unlink_identity(&self, user_id: &str, provider: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct AuthUrlResponse {
    pub auth_url: String,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct CallbackRequest {
    pub platform: String,
    pub code: String,
    pub state: String,
    pub user_id: String,
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct LinkingService {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    identities: Arc<dyn IdentityProvider>,
    event_bus: EventBus,
}

impl LinkingService {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<ProviderRegistry>,
        identities: Arc<dyn IdentityProvider>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            registry,
            identities,
            event_bus,
        }
    }

    /// Start a linking attempt: invalidate any pending session for this
    /// (user, platform), store a fresh one, and return the provider's
    /// authorize URL embedding the new state token.
    pub async fn request_auth_url(
        &self,
        platform: &str,
        user_id: &str,
        redirect_uri: &str,
    ) -> Result<AuthUrlResponse> {
        let adapter = self.registry.get(platform)?;

        let state = generate_state();
        let auth_url = adapter.build_auth_url(&state, redirect_uri)?;

        let session = OAuthSession {
            state: state.clone(),
            platform: platform.to_string(),
            user_id: user_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            created_at: Utc::now(),
            used: false,
        };
        self.db.create_session(&session).await?;

        info!(platform, user_id, "created oauth session");

        Ok(AuthUrlResponse {
            auth_url: auth_url.to_string(),
            state,
        })
    }

    /// Complete a linking attempt from the provider callback.
    ///
    /// Returns the linked account's display name.
    ///
    /// # Errors
    ///
    /// `LinkError::InvalidState` when the session is missing, expired,
    /// already used, or bound to a different user or platform;
    /// `LinkError::RedirectUriMismatch` when the callback's redirect URI
    /// differs from the one the authorize URL was built with (fatal,
    /// non-retryable). Provider failures bubble up tagged with the
    /// platform; the session stays consumed either way because
    /// authorization codes are single-use.
    pub async fn handle_callback(&self, request: CallbackRequest) -> Result<String> {
        let session = self
            .db
            .get_session(&request.state)
            .await?
            .ok_or(LinkError::InvalidState)?;

        if session.user_id != request.user_id || session.platform != request.platform {
            return Err(LinkError::InvalidState.into());
        }

        // Single-use claim before anything else; the atomic update decides
        // the winner between concurrent deliveries of the same state.
        if !self.db.consume_session(&request.state, Utc::now()).await? {
            return Err(LinkError::InvalidState.into());
        }

        if session.redirect_uri != request.redirect_uri {
            return Err(LinkError::RedirectUriMismatch.into());
        }

        let adapter = self.registry.get(&request.platform)?;

        let tokens = adapter
            .exchange_code(&request.code, &request.redirect_uri)
            .await?;
        let tokens = adapter.upgrade_token(tokens).await?;
        let profile = adapter.fetch_profile(&tokens.access_token).await?;

        let account = SocialAccount {
            user_id: request.user_id.clone(),
            platform: request.platform.clone(),
            provider_account_id: profile.provider_account_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at: tokens.expires_at,
            display_name: profile.display_name.clone(),
            linked_at: Utc::now(),
        };
        self.db.upsert_account(&account).await?;

        info!(
            platform = %request.platform,
            user_id = %request.user_id,
            "linked account {}",
            profile.display_name
        );
        self.event_bus.emit(Event::AccountLinked {
            user_id: request.user_id,
            platform: request.platform,
            display_name: profile.display_name.clone(),
        });

        Ok(profile.display_name)
    }

    /// Disconnect a linked platform.
    ///
    /// Refuses to remove the user's only sign-in identity. The stored
    /// credential row is deleted best-effort; the identity layer's unlink
    /// outcome is authoritative.
    pub async fn disconnect(&self, user_id: &str, platform: &str) -> Result<()> {
        let identities = self.identities.list_identities(user_id).await?;

        if identities.len() <= 1 {
            return Err(LinkError::LastIdentity.into());
        }

        if !identities.iter().any(|i| i.provider == platform) {
            return Err(LinkError::AccountNotFound(platform.to_string()).into());
        }

        match self.db.delete_account(user_id, platform).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(platform, user_id, "no stored credential row to delete");
            }
            Err(e) => {
                warn!(platform, user_id, "failed to delete credential row: {}", e);
            }
        }

        self.identities.unlink_identity(user_id, platform).await?;

        info!(platform, user_id, "disconnected account");
        self.event_bus.emit(Event::AccountDisconnected {
            user_id: user_id.to_string(),
            platform: platform.to_string(),
        });

        Ok(())
    }

    /// All platforms currently linked for a user.
    pub async fn linked_accounts(&self, user_id: &str) -> Result<Vec<SocialAccount>> {
        self.db.list_accounts(user_id).await
    }
}

fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OmnicastError;
    use crate::providers::SandboxAdapter;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the external authentication layer.
    pub struct FakeIdentityProvider {
        identities: Mutex<HashMap<String, Vec<Identity>>>,
        fail_unlink: bool,
    }

    impl FakeIdentityProvider {
        pub fn with_identities(user_id: &str, providers: &[&str]) -> Self {
            let list = providers
                .iter()
                .map(|p| Identity {
                    provider: p.to_string(),
                    external_id: format!("{}-{}", p, user_id),
                })
                .collect();
            let mut map = HashMap::new();
            map.insert(user_id.to_string(), list);
            Self {
                identities: Mutex::new(map),
                fail_unlink: false,
            }
        }

        fn failing_unlink(mut self) -> Self {
            self.fail_unlink = true;
            self
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentityProvider {
        async fn list_identities(&self, user_id: &str) -> Result<Vec<Identity>> {
            Ok(self
                .identities
                .lock()
                .unwrap()
                .get(user_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn unlink_identity(&self, user_id: &str, provider: &str) -> Result<()> {
            if self.fail_unlink {
                return Err(LinkError::Identity("upstream rejected unlink".to_string()).into());
            }
            if let Some(list) = self.identities.lock().unwrap().get_mut(user_id) {
                list.retain(|i| i.provider != provider);
            }
            Ok(())
        }
    }

    async fn service_with(identities: FakeIdentityProvider) -> LinkingService {
        let db = Arc::new(Database::new(":memory:").await.unwrap());
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(SandboxAdapter::new("twitter")));
        registry.register(Arc::new(SandboxAdapter::new("facebook")));

        LinkingService::new(
            db,
            Arc::new(registry),
            Arc::new(identities),
            EventBus::new(16),
        )
    }

    fn callback(state: &str) -> CallbackRequest {
        CallbackRequest {
            platform: "twitter".to_string(),
            code: "auth-code-1".to_string(),
            state: state.to_string(),
            user_id: "user-1".to_string(),
            redirect_uri: "https://app.example/oauth/callback".to_string(),
        }
    }

    #[tokio::test]
    async fn test_full_link_flow() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        let response = service
            .request_auth_url("twitter", "user-1", "https://app.example/oauth/callback")
            .await
            .unwrap();
        assert!(response.auth_url.contains(&response.state));

        let name = service.handle_callback(callback(&response.state)).await.unwrap();
        assert!(name.starts_with("sandbox_"));

        let accounts = service.linked_accounts("user-1").await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].platform, "twitter");
        assert!(accounts[0].expires_at.is_some());
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        let err = service
            .request_auth_url("myspace", "user-1", "https://cb")
            .await
            .unwrap_err();
        assert!(matches!(err, OmnicastError::Provider(_)));
    }

    #[tokio::test]
    async fn test_second_auth_url_invalidates_first_state() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        let first = service
            .request_auth_url("twitter", "user-1", "https://app.example/oauth/callback")
            .await
            .unwrap();
        let second = service
            .request_auth_url("twitter", "user-1", "https://app.example/oauth/callback")
            .await
            .unwrap();

        let err = service.handle_callback(callback(&first.state)).await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Link(LinkError::InvalidState)
        ));

        assert!(service.handle_callback(callback(&second.state)).await.is_ok());
    }

    #[tokio::test]
    async fn test_replayed_callback_fails() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        let response = service
            .request_auth_url("twitter", "user-1", "https://app.example/oauth/callback")
            .await
            .unwrap();

        assert!(service.handle_callback(callback(&response.state)).await.is_ok());

        let err = service
            .handle_callback(callback(&response.state))
            .await
            .unwrap_err();
        assert!(matches!(err, OmnicastError::Link(LinkError::InvalidState)));
    }

    #[tokio::test]
    async fn test_unknown_state_fails() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        let err = service.handle_callback(callback("never-issued")).await.unwrap_err();
        assert!(matches!(err, OmnicastError::Link(LinkError::InvalidState)));
    }

    #[tokio::test]
    async fn test_callback_for_wrong_user_fails() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        let response = service
            .request_auth_url("twitter", "user-1", "https://app.example/oauth/callback")
            .await
            .unwrap();

        let mut request = callback(&response.state);
        request.user_id = "user-2".to_string();

        let err = service.handle_callback(request).await.unwrap_err();
        assert!(matches!(err, OmnicastError::Link(LinkError::InvalidState)));
    }

    #[tokio::test]
    async fn test_redirect_uri_mismatch_is_fatal() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        let response = service
            .request_auth_url("twitter", "user-1", "https://app.example/oauth/callback")
            .await
            .unwrap();

        let mut request = callback(&response.state);
        request.redirect_uri = "https://evil.example/oauth/callback".to_string();

        let err = service.handle_callback(request).await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Link(LinkError::RedirectUriMismatch)
        ));

        // The session was consumed by the failed attempt; the original
        // redirect URI cannot be retried with the same state.
        let err = service
            .handle_callback(callback(&response.state))
            .await
            .unwrap_err();
        assert!(matches!(err, OmnicastError::Link(LinkError::InvalidState)));
    }

    #[tokio::test]
    async fn test_relink_overwrites_credential() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["email"])).await;

        for code in ["code-a", "code-b"] {
            let response = service
                .request_auth_url("twitter", "user-1", "https://app.example/oauth/callback")
                .await
                .unwrap();
            let mut request = callback(&response.state);
            request.code = code.to_string();
            service.handle_callback(request).await.unwrap();
        }

        let accounts = service.linked_accounts("user-1").await.unwrap();
        assert_eq!(accounts.len(), 1, "re-link must overwrite, not duplicate");
    }

    #[tokio::test]
    async fn test_disconnect_refuses_last_identity() {
        let service =
            service_with(FakeIdentityProvider::with_identities("user-1", &["twitter"])).await;

        let err = service.disconnect("user-1", "twitter").await.unwrap_err();
        assert!(matches!(err, OmnicastError::Link(LinkError::LastIdentity)));
    }

    #[tokio::test]
    async fn test_disconnect_with_two_identities_succeeds() {
        let service = service_with(FakeIdentityProvider::with_identities(
            "user-1",
            &["email", "twitter"],
        ))
        .await;

        service.disconnect("user-1", "twitter").await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_unknown_platform_not_found() {
        let service = service_with(FakeIdentityProvider::with_identities(
            "user-1",
            &["email", "twitter"],
        ))
        .await;

        let err = service.disconnect("user-1", "facebook").await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Link(LinkError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_identity_failure_is_returned() {
        let service = service_with(
            FakeIdentityProvider::with_identities("user-1", &["email", "twitter"])
                .failing_unlink(),
        )
        .await;

        let err = service.disconnect("user-1", "twitter").await.unwrap_err();
        assert!(matches!(err, OmnicastError::Link(LinkError::Identity(_))));
    }

    #[tokio::test]
    async fn test_disconnect_survives_missing_credential_row() {
        // Identity exists upstream but no credential row is stored locally;
        // cleanup is best-effort and the unlink still proceeds.
        let service = service_with(FakeIdentityProvider::with_identities(
            "user-1",
            &["email", "twitter"],
        ))
        .await;

        service.disconnect("user-1", "twitter").await.unwrap();
    }

    #[test]
    fn test_generated_states_are_unique_and_opaque() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

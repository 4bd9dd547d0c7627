//! Core types for Omnicast

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A linked platform identity for one user.
///
/// At most one row exists per (user_id, platform); re-linking overwrites the
/// stored credential. Owned by the credential store, written only by the
/// linking flow on a successful exchange, deleted only by disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub user_id: String,
    pub platform: String,
    pub provider_account_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub display_name: String,
    pub linked_at: DateTime<Utc>,
}

/// Ephemeral CSRF-binding record for one pending authorization attempt.
///
/// Consumed (marked used) by exactly one successful callback; expired and
/// used sessions are rejected but kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSession {
    pub state: String,
    pub platform: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
    pub used: bool,
}

impl OAuthSession {
    /// Sessions older than this are rejected at callback time.
    pub const TTL_SECS: i64 = 600;

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Duration::seconds(Self::TTL_SECS)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Published,
    Error,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "published" => PostStatus::Published,
            "error" => PostStatus::Error,
            _ => PostStatus::Scheduled,
        }
    }

    /// Published and error are terminal; they never change without an
    /// explicit new user action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PostStatus::Published | PostStatus::Error)
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A content item with a future publish time awaiting dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub media_urls: Vec<String>,
    pub selected_accounts: Vec<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: PostStatus,
    pub created_at: DateTime<Utc>,
}

impl ScheduledPost {
    pub fn new(
        user_id: String,
        content: String,
        media_urls: Vec<String>,
        selected_accounts: Vec<String>,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            content,
            media_urls,
            selected_accounts,
            scheduled_for,
            status: PostStatus::Scheduled,
            created_at: Utc::now(),
        }
    }
}

/// Unvalidated input for creating a scheduled post.
#[derive(Debug, Clone, Default)]
pub struct NewPost {
    pub user_id: Option<String>,
    pub content: String,
    pub media_urls: Vec<String>,
    pub selected_accounts: Vec<String>,
    pub scheduled_for: DateTime<Utc>,
}

/// Outcome of one platform's publish attempt for a post.
///
/// Written only after a dispatch attempt; one row per selected platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformOutcome {
    pub id: Option<i64>,
    pub post_id: String,
    pub platform: String,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub message: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Token set returned by a provider's token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderTokens {
    /// Build from a wire response that reports lifetime as `expires_in`
    /// seconds relative to now.
    pub fn from_response(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// Normalized profile information fetched from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider_account_id: String,
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_post_new_defaults() {
        let scheduled_for = Utc::now() + Duration::hours(2);
        let post = ScheduledPost::new(
            "user-1".to_string(),
            "Hello from Omnicast".to_string(),
            vec![],
            vec!["instagram".to_string()],
            scheduled_for,
        );

        assert!(Uuid::parse_str(&post.id).is_ok(), "id should be a UUID");
        assert_eq!(post.status, PostStatus::Scheduled);
        assert_eq!(post.scheduled_for, scheduled_for);
        assert!(post.created_at <= Utc::now());
    }

    #[test]
    fn test_scheduled_post_unique_ids() {
        let when = Utc::now() + Duration::hours(1);
        let a = ScheduledPost::new("u".into(), "a".into(), vec![], vec!["x".into()], when);
        let b = ScheduledPost::new("u".into(), "b".into(), vec![], vec!["x".into()], when);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_post_status_round_trip() {
        for status in [PostStatus::Scheduled, PostStatus::Published, PostStatus::Error] {
            assert_eq!(PostStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_post_status_terminal() {
        assert!(!PostStatus::Scheduled.is_terminal());
        assert!(PostStatus::Published.is_terminal());
        assert!(PostStatus::Error.is_terminal());
    }

    #[test]
    fn test_post_status_serde_lowercase() {
        let json = serde_json::to_string(&PostStatus::Published).unwrap();
        assert_eq!(json, r#""published""#);

        let parsed: PostStatus = serde_json::from_str(r#""error""#).unwrap();
        assert_eq!(parsed, PostStatus::Error);
    }

    #[test]
    fn test_session_expiry() {
        let session = OAuthSession {
            state: "abc".to_string(),
            platform: "instagram".to_string(),
            user_id: "user-1".to_string(),
            redirect_uri: "https://app.example/callback".to_string(),
            created_at: Utc::now(),
            used: false,
        };

        assert!(!session.is_expired(session.created_at + Duration::minutes(9)));
        assert!(session.is_expired(session.created_at + Duration::minutes(11)));
    }

    #[test]
    fn test_provider_tokens_from_response() {
        let before = Utc::now();
        let tokens = ProviderTokens::from_response("tok".to_string(), None, Some(3600));
        let expires = tokens.expires_at.expect("expiry should be set");
        assert!(expires >= before + Duration::seconds(3599));
        assert!(expires <= Utc::now() + Duration::seconds(3601));

        let tokens = ProviderTokens::from_response("tok".to_string(), None, None);
        assert!(tokens.expires_at.is_none());
    }

    #[test]
    fn test_scheduled_post_serialization_uses_iso8601() {
        let post = ScheduledPost {
            id: "p-1".to_string(),
            user_id: "user-1".to_string(),
            content: "hi".to_string(),
            media_urls: vec!["https://cdn.example/a.png".to_string()],
            selected_accounts: vec!["instagram".to_string(), "facebook".to_string()],
            scheduled_for: DateTime::parse_from_rfc3339("2024-03-15T23:59:00Z")
                .unwrap()
                .with_timezone(&Utc),
            status: PostStatus::Scheduled,
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&post).unwrap();
        assert!(json.contains("2024-03-15T23:59:00Z"));

        let parsed: ScheduledPost = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.selected_accounts, post.selected_accounts);
        assert_eq!(parsed.scheduled_for, post.scheduled_for);
    }
}

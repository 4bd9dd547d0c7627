//! Scheduled post creation and lookup
//!
//! Enforces the business rules on post creation before anything is written:
//! content presence, account selection, an authenticated user, and the
//! schedule lead-time rule.

use chrono::Utc;
use std::sync::Arc;

use crate::db::Database;
use crate::error::{Result, ValidationError};
use crate::scheduling::{is_schedulable_at, MIN_LEAD_MINUTES};
use crate::types::{NewPost, PlatformOutcome, ScheduledPost};

#[derive(Clone)]
pub struct PostService {
    db: Arc<Database>,
}

impl PostService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Validate and store a new scheduled post.
    ///
    /// # Errors
    ///
    /// `ValidationError::EmptyContent` when content is blank and no media is
    /// attached, `ValidationError::NoAccounts` when no account is selected,
    /// `ValidationError::AuthRequired` without a user, and
    /// `ValidationError::ScheduleTooSoon` when the instant is not strictly
    /// later than now + 5 minutes. Nothing is written on rejection.
    pub async fn create(&self, request: NewPost) -> Result<ScheduledPost> {
        if request.content.trim().is_empty() && request.media_urls.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        if request.selected_accounts.is_empty() {
            return Err(ValidationError::NoAccounts.into());
        }

        let user_id = request
            .user_id
            .ok_or(ValidationError::AuthRequired)?;

        if !is_schedulable_at(request.scheduled_for, Utc::now()) {
            return Err(ValidationError::ScheduleTooSoon(MIN_LEAD_MINUTES).into());
        }

        let post = ScheduledPost::new(
            user_id,
            request.content,
            request.media_urls,
            request.selected_accounts,
            request.scheduled_for,
        );
        self.db.create_post(&post).await?;

        Ok(post)
    }

    pub async fn get(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        self.db.get_post(post_id).await
    }

    /// A post together with its per-platform outcomes, if any dispatch has
    /// run.
    pub async fn get_with_outcomes(
        &self,
        post_id: &str,
    ) -> Result<Option<(ScheduledPost, Vec<PlatformOutcome>)>> {
        let Some(post) = self.db.get_post(post_id).await? else {
            return Ok(None);
        };
        let outcomes = self.db.get_outcomes(post_id).await?;
        Ok(Some((post, outcomes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OmnicastError;
    use crate::types::PostStatus;
    use chrono::Duration;

    async fn service() -> PostService {
        PostService::new(Arc::new(Database::new(":memory:").await.unwrap()))
    }

    fn valid_request() -> NewPost {
        NewPost {
            user_id: Some("user-1".to_string()),
            content: "launch announcement".to_string(),
            media_urls: vec![],
            selected_accounts: vec!["twitter".to_string()],
            scheduled_for: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_create_stores_scheduled_post() {
        let service = service().await;
        let post = service.create(valid_request()).await.unwrap();

        assert_eq!(post.status, PostStatus::Scheduled);
        let stored = service.get(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "launch announcement");
    }

    #[tokio::test]
    async fn test_empty_content_without_media_rejected() {
        let service = service().await;
        let mut request = valid_request();
        request.content = "".to_string();

        let err = service.create(request).await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Validation(ValidationError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn test_whitespace_content_without_media_rejected() {
        let service = service().await;
        let mut request = valid_request();
        request.content = "   \n\t ".to_string();

        let err = service.create(request).await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Validation(ValidationError::EmptyContent)
        ));
    }

    #[tokio::test]
    async fn test_empty_content_with_media_accepted() {
        let service = service().await;
        let mut request = valid_request();
        request.content = "".to_string();
        request.media_urls = vec!["https://cdn.example/pic.png".to_string()];

        assert!(service.create(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_no_selected_accounts_rejected() {
        let service = service().await;
        let mut request = valid_request();
        request.selected_accounts = vec![];

        let err = service.create(request).await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Validation(ValidationError::NoAccounts)
        ));
    }

    #[tokio::test]
    async fn test_missing_user_rejected() {
        let service = service().await;
        let mut request = valid_request();
        request.user_id = None;

        let err = service.create(request).await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Validation(ValidationError::AuthRequired)
        ));
    }

    #[tokio::test]
    async fn test_schedule_too_soon_rejected() {
        let service = service().await;
        let mut request = valid_request();
        request.scheduled_for = Utc::now() + Duration::minutes(4);

        let err = service.create(request).await.unwrap_err();
        assert!(matches!(
            err,
            OmnicastError::Validation(ValidationError::ScheduleTooSoon(_))
        ));
    }

    #[tokio::test]
    async fn test_schedule_six_minutes_out_accepted() {
        let service = service().await;
        let mut request = valid_request();
        request.scheduled_for = Utc::now() + Duration::minutes(6);

        assert!(service.create(request).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejection_writes_nothing() {
        let service = service().await;
        let mut request = valid_request();
        request.selected_accounts = vec![];
        let _ = service.create(request).await;

        let db = Database::new(":memory:").await.unwrap();
        // Fresh store is empty; also assert the service's store has no rows
        // for the rejected user.
        assert!(db.list_posts("user-1").await.unwrap().is_empty());
        assert!(service
            .db
            .list_posts("user-1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_get_with_outcomes_before_dispatch() {
        let service = service().await;
        let post = service.create(valid_request()).await.unwrap();

        let (stored, outcomes) = service.get_with_outcomes(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.id, post.id);
        assert!(outcomes.is_empty(), "outcomes appear only after dispatch");
    }
}

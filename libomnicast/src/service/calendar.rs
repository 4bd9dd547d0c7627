//! Calendar query layer
//!
//! Read-side queries for the scheduling views: posts ordered by scheduled
//! time, and day bucketing for the calendar display. Buckets compare
//! calendar date components in UTC, never a time-range overlap, so two
//! posts minutes apart across midnight land on different days.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;
use crate::types::ScheduledPost;

#[derive(Clone)]
pub struct CalendarService {
    db: Arc<Database>,
}

impl CalendarService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// All of a user's posts, ascending by scheduled time.
    pub async fn list_all(&self, user_id: &str) -> Result<Vec<ScheduledPost>> {
        self.db.list_posts(user_id).await
    }

    /// Posts with `from <= scheduled_for < to`, ascending.
    pub async fn list_by_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>> {
        self.db.list_posts_in_range(user_id, from, to).await
    }

    /// Group posts by their UTC calendar day.
    pub fn day_buckets(posts: Vec<ScheduledPost>) -> BTreeMap<NaiveDate, Vec<ScheduledPost>> {
        let mut buckets: BTreeMap<NaiveDate, Vec<ScheduledPost>> = BTreeMap::new();
        for post in posts {
            buckets
                .entry(post.scheduled_for.date_naive())
                .or_default()
                .push(post);
        }
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostStatus;
    use chrono::Duration;

    fn post_at(user: &str, rfc3339: &str) -> ScheduledPost {
        ScheduledPost {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            content: format!("post at {}", rfc3339),
            media_urls: vec![],
            selected_accounts: vec!["twitter".to_string()],
            scheduled_for: DateTime::parse_from_rfc3339(rfc3339)
                .unwrap()
                .with_timezone(&Utc),
            status: PostStatus::Scheduled,
            created_at: Utc::now(),
        }
    }

    async fn service_with_posts(posts: &[ScheduledPost]) -> CalendarService {
        let db = Arc::new(Database::new(":memory:").await.unwrap());
        for post in posts {
            db.create_post(post).await.unwrap();
        }
        CalendarService::new(db)
    }

    #[tokio::test]
    async fn test_list_all_ascending() {
        let late = post_at("user-1", "2024-03-16T10:00:00Z");
        let early = post_at("user-1", "2024-03-15T10:00:00Z");
        let service = service_with_posts(&[late.clone(), early.clone()]).await;

        let posts = service.list_all("user-1").await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, early.id);
        assert_eq!(posts[1].id, late.id);
    }

    #[tokio::test]
    async fn test_list_by_range_half_open() {
        let inside = post_at("user-1", "2024-03-15T12:00:00Z");
        let at_end = post_at("user-1", "2024-03-16T00:00:00Z");
        let service = service_with_posts(&[inside.clone(), at_end.clone()]).await;

        let from = DateTime::parse_from_rfc3339("2024-03-15T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let posts = service
            .list_by_range("user-1", from, from + Duration::days(1))
            .await
            .unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, inside.id);
    }

    #[tokio::test]
    async fn test_midnight_straddling_posts_bucket_separately() {
        // Two minutes apart, different calendar days.
        let before = post_at("user-1", "2024-03-15T23:59:00Z");
        let after = post_at("user-1", "2024-03-16T00:01:00Z");
        let service = service_with_posts(&[before.clone(), after.clone()]).await;

        let posts = service.list_all("user-1").await.unwrap();
        let buckets = CalendarService::day_buckets(posts);

        assert_eq!(buckets.len(), 2);

        let day_one = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let day_two = NaiveDate::from_ymd_opt(2024, 3, 16).unwrap();
        assert_eq!(buckets[&day_one].len(), 1);
        assert_eq!(buckets[&day_one][0].id, before.id);
        assert_eq!(buckets[&day_two].len(), 1);
        assert_eq!(buckets[&day_two][0].id, after.id);
    }

    #[tokio::test]
    async fn test_same_day_posts_share_a_bucket() {
        let morning = post_at("user-1", "2024-03-15T09:00:00Z");
        let evening = post_at("user-1", "2024-03-15T21:00:00Z");
        let service = service_with_posts(&[morning, evening]).await;

        let posts = service.list_all("user-1").await.unwrap();
        let buckets = CalendarService::day_buckets(posts);

        assert_eq!(buckets.len(), 1);
        let day = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(buckets[&day].len(), 2);
    }

    #[test]
    fn test_empty_bucket_map() {
        assert!(CalendarService::day_buckets(vec![]).is_empty());
    }
}

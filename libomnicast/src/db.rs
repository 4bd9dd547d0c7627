//! Database operations for Omnicast

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{OAuthSession, PlatformOutcome, PostStatus, ScheduledPost, SocialAccount};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

fn to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
}

fn to_json(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values).map_err(DbError::EncodingError)?)
}

fn from_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            // Every pooled connection to :memory: would get its own empty
            // database, so pin the pool to one long-lived connection.
            sqlx::sqlite::SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            // Expand path and create parent directories
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
                }
            }

            // Forward slashes work for SQLite URLs on both Windows and Unix;
            // mode=rwc creates the file if it does not exist.
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Social accounts
    // ------------------------------------------------------------------

    /// Insert or replace the credential for (user, platform).
    ///
    /// A re-link overwrites the existing row; the unique key guarantees at
    /// most one active credential per pair.
    pub async fn upsert_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts
                (user_id, platform, provider_account_id, access_token,
                 refresh_token, expires_at, display_name, linked_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform) DO UPDATE SET
                provider_account_id = excluded.provider_account_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                display_name = excluded.display_name,
                linked_at = excluded.linked_at
            "#,
        )
        .bind(&account.user_id)
        .bind(&account.platform)
        .bind(&account.provider_account_id)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.expires_at.map(|t| t.timestamp()))
        .bind(&account.display_name)
        .bind(account.linked_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_account(
        &self,
        user_id: &str,
        platform: &str,
    ) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, provider_account_id, access_token,
                   refresh_token, expires_at, display_name, linked_at
            FROM social_accounts
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Self::account_from_row(&r)))
    }

    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<SocialAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, platform, provider_account_id, access_token,
                   refresh_token, expires_at, display_name, linked_at
            FROM social_accounts
            WHERE user_id = ?
            ORDER BY platform
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(Self::account_from_row).collect())
    }

    /// Returns true when a row was actually removed.
    pub async fn delete_account(&self, user_id: &str, platform: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM social_accounts WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    fn account_from_row(r: &sqlx::sqlite::SqliteRow) -> SocialAccount {
        SocialAccount {
            user_id: r.get("user_id"),
            platform: r.get("platform"),
            provider_account_id: r.get("provider_account_id"),
            access_token: r.get("access_token"),
            refresh_token: r.get("refresh_token"),
            expires_at: r.get::<Option<i64>, _>("expires_at").map(to_datetime),
            display_name: r.get("display_name"),
            linked_at: to_datetime(r.get("linked_at")),
        }
    }

    // ------------------------------------------------------------------
    // OAuth sessions
    // ------------------------------------------------------------------

    /// Store a fresh session, invalidating any unused session for the same
    /// (user, platform). Last write wins; prior states become unusable.
    pub async fn create_session(&self, session: &OAuthSession) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            UPDATE oauth_sessions SET used = 1
            WHERE user_id = ? AND platform = ? AND used = 0
            "#,
        )
        .bind(&session.user_id)
        .bind(&session.platform)
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO oauth_sessions (state, platform, user_id, redirect_uri, created_at, used)
            VALUES (?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&session.state)
        .bind(&session.platform)
        .bind(&session.user_id)
        .bind(&session.redirect_uri)
        .bind(session.created_at.timestamp())
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn get_session(&self, state: &str) -> Result<Option<OAuthSession>> {
        let row = sqlx::query(
            r#"
            SELECT state, platform, user_id, redirect_uri, created_at, used
            FROM oauth_sessions WHERE state = ?
            "#,
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| OAuthSession {
            state: r.get("state"),
            platform: r.get("platform"),
            user_id: r.get("user_id"),
            redirect_uri: r.get("redirect_uri"),
            created_at: to_datetime(r.get("created_at")),
            used: r.get::<i64, _>("used") != 0,
        }))
    }

    /// Atomically claim a session: mark it used if and only if it is still
    /// unused and unexpired. Returns true for the single winner; a replayed
    /// or concurrent callback gets false even while the winner is mid-flight.
    pub async fn consume_session(&self, state: &str, now: DateTime<Utc>) -> Result<bool> {
        let cutoff = now.timestamp() - OAuthSession::TTL_SECS;

        let result = sqlx::query(
            r#"
            UPDATE oauth_sessions SET used = 1
            WHERE state = ? AND used = 0 AND created_at >= ?
            "#,
        )
        .bind(state)
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    // ------------------------------------------------------------------
    // Scheduled posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &ScheduledPost) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_posts
                (id, user_id, content, media_urls, selected_accounts,
                 scheduled_for, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.content)
        .bind(to_json(&post.media_urls)?)
        .bind(to_json(&post.selected_accounts)?)
        .bind(post.scheduled_for.timestamp())
        .bind(post.status.as_str())
        .bind(post.created_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, content, media_urls, selected_accounts,
                   scheduled_for, status, created_at
            FROM scheduled_posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Self::post_from_row(&r)))
    }

    /// All of a user's posts, ordered by scheduled time ascending.
    pub async fn list_posts(&self, user_id: &str) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, media_urls, selected_accounts,
                   scheduled_for, status, created_at
            FROM scheduled_posts
            WHERE user_id = ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(Self::post_from_row).collect())
    }

    /// A user's posts with `from <= scheduled_for < to`, ascending.
    pub async fn list_posts_in_range(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, media_urls, selected_accounts,
                   scheduled_for, status, created_at
            FROM scheduled_posts
            WHERE user_id = ? AND scheduled_for >= ? AND scheduled_for < ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(user_id)
        .bind(from.timestamp())
        .bind(to.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(Self::post_from_row).collect())
    }

    /// Posts whose scheduled time has arrived and that nobody has dispatched
    /// yet.
    pub async fn due_posts(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, content, media_urls, selected_accounts,
                   scheduled_for, status, created_at
            FROM scheduled_posts
            WHERE status = 'scheduled' AND scheduled_for <= ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(Self::post_from_row).collect())
    }

    /// The single aggregated status write of a dispatch cycle.
    ///
    /// Conditional on the post still being `scheduled`; returns false when
    /// another cycle finalized it first, in which case the caller must not
    /// write outcome rows either.
    pub async fn finalize_post(&self, post_id: &str, status: PostStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET status = ?
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(status.as_str())
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    fn post_from_row(r: &sqlx::sqlite::SqliteRow) -> ScheduledPost {
        ScheduledPost {
            id: r.get("id"),
            user_id: r.get("user_id"),
            content: r.get("content"),
            media_urls: from_json(r.get::<String, _>("media_urls").as_str()),
            selected_accounts: from_json(r.get::<String, _>("selected_accounts").as_str()),
            scheduled_for: to_datetime(r.get("scheduled_for")),
            status: PostStatus::parse(r.get::<String, _>("status").as_str()),
            created_at: to_datetime(r.get("created_at")),
        }
    }

    // ------------------------------------------------------------------
    // Per-platform outcomes
    // ------------------------------------------------------------------

    pub async fn record_outcome(&self, outcome: &PlatformOutcome) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO post_outcomes
                (post_id, platform, success, platform_post_id, message, attempted_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&outcome.post_id)
        .bind(&outcome.platform)
        .bind(if outcome.success { 1 } else { 0 })
        .bind(&outcome.platform_post_id)
        .bind(&outcome.message)
        .bind(outcome.attempted_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_outcomes(&self, post_id: &str) -> Result<Vec<PlatformOutcome>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, platform, success, platform_post_id, message, attempted_at
            FROM post_outcomes
            WHERE post_id = ?
            ORDER BY platform
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| PlatformOutcome {
                id: r.get("id"),
                post_id: r.get("post_id"),
                platform: r.get("platform"),
                success: r.get::<i64, _>("success") != 0,
                platform_post_id: r.get("platform_post_id"),
                message: r.get("message"),
                attempted_at: to_datetime(r.get("attempted_at")),
            })
            .collect())
    }
}

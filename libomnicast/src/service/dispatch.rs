//! Publishing dispatcher
//!
//! Fans a due post out to the provider adapters for its selected accounts,
//! one concurrent attempt per platform, and aggregates the results into the
//! post's terminal status. Attempts are failure-isolated: one platform
//! erroring never cancels or rolls back another's publish.

use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{LinkError, Result};
use crate::providers::ProviderRegistry;
use crate::types::{PlatformOutcome, PostStatus, ScheduledPost};

use super::events::{Event, EventBus};

/// Result of one platform's publish attempt.
#[derive(Debug, Clone)]
pub struct PublishResult {
    pub platform: String,
    pub success: bool,
    pub platform_post_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct DispatchService {
    db: Arc<Database>,
    registry: Arc<ProviderRegistry>,
    event_bus: EventBus,
}

impl DispatchService {
    pub fn new(db: Arc<Database>, registry: Arc<ProviderRegistry>, event_bus: EventBus) -> Self {
        Self {
            db,
            registry,
            event_bus,
        }
    }

    /// Dispatch every due post once. Returns how many posts this cycle
    /// actually finalized.
    pub async fn dispatch_due(&self) -> Result<usize> {
        let due = self.db.due_posts(Utc::now()).await?;

        if due.is_empty() {
            return Ok(0);
        }

        info!("Found {} post(s) due for dispatch", due.len());

        let mut dispatched = 0;
        for post in due {
            if self.dispatch_post(&post).await? {
                dispatched += 1;
            }
        }

        Ok(dispatched)
    }

    /// Dispatch a single post.
    ///
    /// Returns false when the post was no longer `scheduled` at write time
    /// (another cycle won the finalize race); in that case no outcome rows
    /// are written either.
    pub async fn dispatch_post(&self, post: &ScheduledPost) -> Result<bool> {
        self.event_bus.emit(Event::DispatchStarted {
            post_id: post.id.clone(),
            platforms: post.selected_accounts.clone(),
        });

        let results = self.publish_all(post).await;

        let status = if !results.is_empty() && results.iter().all(|r| r.success) {
            PostStatus::Published
        } else {
            PostStatus::Error
        };

        // The single aggregated write of the cycle, conditional on the post
        // still being scheduled.
        if !self.db.finalize_post(&post.id, status).await? {
            warn!(
                post_id = %post.id,
                "post already finalized by another dispatch cycle, skipping"
            );
            return Ok(false);
        }

        let now = Utc::now();
        for result in &results {
            if let Err(e) = self
                .db
                .record_outcome(&PlatformOutcome {
                    id: None,
                    post_id: post.id.clone(),
                    platform: result.platform.clone(),
                    success: result.success,
                    platform_post_id: result.platform_post_id.clone(),
                    message: result.error.clone(),
                    attempted_at: now,
                })
                .await
            {
                warn!(
                    platform = %result.platform,
                    "failed to record outcome: {}", e
                );
            }

            if result.success {
                self.event_bus.emit(Event::PlatformPublished {
                    post_id: post.id.clone(),
                    platform: result.platform.clone(),
                    platform_post_id: result.platform_post_id.clone().unwrap_or_default(),
                });
            } else {
                self.event_bus.emit(Event::PlatformFailed {
                    post_id: post.id.clone(),
                    platform: result.platform.clone(),
                    error: result.error.clone().unwrap_or_default(),
                });
            }
        }

        info!(post_id = %post.id, status = %status, "dispatch complete");
        self.event_bus.emit(Event::DispatchCompleted {
            post_id: post.id.clone(),
            status: status.to_string(),
        });

        Ok(true)
    }

    /// One attempt per selected platform, all running concurrently. Every
    /// failure is captured in that platform's result; nothing propagates
    /// across attempts.
    async fn publish_all(&self, post: &ScheduledPost) -> Vec<PublishResult> {
        let attempts = post.selected_accounts.iter().map(|platform| {
            let platform = platform.clone();
            async move {
                match self.publish_one(&platform, post).await {
                    Ok(platform_post_id) => {
                        info!(platform = %platform, post_id = %post.id, "published");
                        PublishResult {
                            platform,
                            success: true,
                            platform_post_id: Some(platform_post_id),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(platform = %platform, post_id = %post.id, "publish failed: {}", e);
                        PublishResult {
                            platform,
                            success: false,
                            platform_post_id: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
        });

        join_all(attempts).await
    }

    async fn publish_one(&self, platform: &str, post: &ScheduledPost) -> Result<String> {
        let adapter = self.registry.get(platform)?;

        let account = self
            .db
            .get_account(&post.user_id, platform)
            .await?
            .ok_or_else(|| LinkError::AccountNotFound(platform.to_string()))?;

        adapter.publish(&account, post).await
    }
}

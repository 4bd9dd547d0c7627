//! Content generation collaborator contract
//!
//! The generator itself is an external service; this module only defines the
//! seam the rest of the system consumes it through. Failures surface as a
//! single [`GenerationError`] with a human-readable message.

use async_trait::async_trait;

use crate::error::GenerationError;

/// Content produced for a prompt: either text or a hosted image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedContent {
    Text(String),
    ImageUrl(String),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedContent, GenerationError>;
}

//! Omnicast - link social accounts once, publish everywhere on schedule
//!
//! This library provides the core functionality for linking third-party
//! social platform accounts via OAuth and dispatching scheduled content to
//! any subset of them.

pub mod config;
pub mod db;
pub mod error;
pub mod generation;
pub mod logging;
pub mod providers;
pub mod scheduling;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{LinkError, OmnicastError, ProviderError, Result, ValidationError};
pub use types::{PlatformOutcome, PostStatus, ScheduledPost, SocialAccount};

//! Service layer for Omnicast
//!
//! A facade (`OmnicastService`) coordinates specialized sub-services over
//! shared state, so CLIs, the daemon, and an API surface can consume the
//! same business logic:
//!
//! - `LinkingService`: the OAuth account-linking state machine
//! - `PostService`: scheduled post validation and creation
//! - `DispatchService`: fan-out publishing of due posts
//! - `CalendarService`: read-side calendar queries
//! - `EventBus`: progress event distribution

pub mod calendar;
pub mod dispatch;
pub mod events;
pub mod linking;
pub mod posts;

pub use dispatch::PublishResult;
pub use events::{Event, EventBus, EventReceiver};
pub use linking::{AuthUrlResponse, CallbackRequest, Identity, IdentityProvider};

use std::sync::Arc;

use self::calendar::CalendarService;
use self::dispatch::DispatchService;
use self::linking::LinkingService;
use self::posts::PostService;
use crate::providers::ProviderRegistry;
use crate::{Config, Database, Result};

/// Main service facade coordinating all sub-services.
///
/// Sub-services share the same `Arc<Database>` and provider registry;
/// callers that mutate state are expected to invalidate their own read
/// caches afterwards rather than rely on any implicit refresh.
pub struct OmnicastService {
    db: Arc<Database>,
    linking: LinkingService,
    posts: PostService,
    dispatch: DispatchService,
    calendar: CalendarService,
    event_bus: EventBus,
}

impl OmnicastService {
    /// Create a service from the default configuration location.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded, the database
    /// cannot be initialized, or the provider registry is misconfigured.
    pub async fn new(identities: Arc<dyn IdentityProvider>) -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config, identities).await
    }

    /// Create a service from an explicit configuration.
    pub async fn from_config(
        config: Config,
        identities: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let db = Arc::new(Database::new(&config.database.path).await?);
        let registry = Arc::new(ProviderRegistry::from_config(&config)?);
        let event_bus = EventBus::new(100);

        let linking = LinkingService::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            identities,
            event_bus.clone(),
        );
        let posts = PostService::new(Arc::clone(&db));
        let dispatch = DispatchService::new(
            Arc::clone(&db),
            Arc::clone(&registry),
            event_bus.clone(),
        );
        let calendar = CalendarService::new(Arc::clone(&db));

        Ok(Self {
            db,
            linking,
            posts,
            dispatch,
            calendar,
            event_bus,
        })
    }

    pub fn linking(&self) -> &LinkingService {
        &self.linking
    }

    pub fn posts(&self) -> &PostService {
        &self.posts
    }

    pub fn dispatch(&self) -> &DispatchService {
        &self.dispatch
    }

    pub fn calendar(&self) -> &CalendarService {
        &self.calendar
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }
}

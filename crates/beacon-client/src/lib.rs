//! # beacon-client
//!
//! Entity cache and subscription hub between a messaging backend and the
//! observers rendering its state.
//!
//! - [`EntityCache`] applies backend updates to the
//!   [`EntityStore`](beacon_store::EntityStore) and fans the resulting
//!   changes out to observers on the foreground thread.
//! - [`SubscriptionRegistry`] holds weak observer references per entity kind,
//!   globally or keyed by id.
//! - [`PresenceScheduler`] refreshes relative "last seen" labels without
//!   polling.
//! - Live locations and active calls are tracked for the platform layer
//!   through [`PlatformBridge`] and [`LocationBroadcaster`].

pub mod backend;
pub mod bridge;
pub mod cache;
pub mod calls;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod foreground;
pub mod live_location;
pub mod logging;
pub mod presence;
pub mod registry;

mod error;

pub use backend::{Backend, BackendCommand, ChannelBackend, ResultHandler};
pub use bridge::{LocationBroadcaster, NoopBridge, PlatformBridge};
pub use cache::{EntityCache, EntityCacheBuilder, FullInfoCallback};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use events::{
    BasicGroupListener, CallListener, Capabilities, ChatMemberStatusListener, MyUserListener,
    SecretChatListener, SupergroupListener, UserDataListener, UserStatusListener,
};
pub use foreground::{Foreground, ForegroundQueue, ForegroundTask};
pub use live_location::{LiveLocationShare, LiveLocations, SharesChanged};
pub use logging::init_tracing;
pub use presence::{PresenceScheduler, RefreshState};
pub use registry::{ListenerMap, Scope, ScopeKey, SubscriptionRegistry};

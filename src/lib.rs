//! # Event Pub
//!
//! An in-process publish/subscribe dispatcher routing events along
//! dot-separated hierarchical channels.
//!
//! ## Core Concepts
//!
//! - **Channels**: names like `orders.eu.created`; a subscriber on a prefix
//!   (`orders.eu`) receives events published on any deeper channel
//! - **Managers**: subscriptions on the empty path, invoked for every event
//! - **Recipients**: optional ids that deduplicate delivery across levels
//!   and allow targeted publishes
//! - **Lifecycle**: `subscribe` / `unsubscribe` notifications for registry
//!   changes
//!
//! ## Example
//!
//! ```ignore
//! use eventpub::{Dispatcher, Event, HandlerResult};
//! use serde_json::json;
//!
//! let dispatcher = Dispatcher::new();
//!
//! let key = dispatcher.subscribe("orders", |event: &Event| -> HandlerResult {
//!     println!("{} -> {}", event.path, event.data);
//!     Ok(())
//! })?;
//!
//! // Delivered to the "orders" subscriber.
//! let errors = dispatcher.publish("orders.eu.created", json!({"id": 42}))?;
//! assert!(errors.is_empty());
//!
//! dispatcher.unsubscribe("orders", &key);
//! ```

pub mod channel;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod keys;
pub mod lifecycle;
pub mod trie;
pub mod types;

// Re-exports
pub use channel::{ChannelDeliveryError, ChannelSubscription};
pub use config::{DispatcherConfig, DEFAULT_KEY_LENGTH};
pub use dispatcher::{Dispatcher, PublishOptions, SubscribeRequest};
pub use error::{DeliveryError, DeliveryFailure, PubSubError, Result};
pub use handler::{Handler, HandlerError, HandlerResult, SharedHandler};
pub use keys::generate_key;
pub use lifecycle::{
    LifecycleEmitter, LifecycleEvent, LifecycleKind, LifecycleSink, ListenerId, NoopSink,
};
pub use trie::{ChannelTrie, RemoveOutcome, SubscriptionRecord};
pub use types::{ChannelPath, Event, IntoChannelPath, Timestamp};

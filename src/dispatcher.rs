//! Dispatcher tying the channel trie, the manager registry and lifecycle
//! notifications together.

use crate::channel::{self, ChannelDeliveryError, ChannelSubscription};
use crate::config::DispatcherConfig;
use crate::error::{DeliveryError, DeliveryFailure, PubSubError, Result};
use crate::handler::{self, Handler, SharedHandler};
use crate::keys::generate_key;
use crate::lifecycle::{LifecycleEvent, LifecycleSink, NoopSink};
use crate::trie::{ChannelTrie, RemoveOutcome, SubscriptionRecord};
use crate::types::{ChannelPath, Event, IntoChannelPath, Timestamp, SEGMENT_SEPARATOR};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// A subscription to register.
///
/// An empty `path` registers a manager that sees every published event.
#[derive(Clone, Default)]
pub struct SubscribeRequest {
    pub path: String,
    pub handler: Option<SharedHandler>,
    /// Subscription key; generated when absent.
    pub key: Option<String>,
    /// Logical recipient for dedup and targeted delivery.
    pub recipient: Option<String>,
}

impl SubscribeRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn handler<H: Handler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: SharedHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }
}

/// Optional event metadata for [`Dispatcher::publish_with`].
#[derive(Clone, Debug, Default)]
pub struct PublishOptions {
    /// Event id; when absent one is generated and `event_date` is set to now.
    pub event_id: Option<String>,
    /// Only used together with a supplied `event_id`.
    pub event_date: Option<Timestamp>,
    pub source: Option<String>,
    /// Deliver only to trie subscribers with this recipient.
    pub target: Option<String>,
}

#[derive(Default)]
struct Registry {
    trie: ChannelTrie,
    /// Global listeners in registration order.
    managers: Vec<(String, SubscriptionRecord)>,
    /// Active subscription count per exact path string.
    counters: HashMap<String, usize>,
    /// Most recent key registered per path string.
    last_keys: HashMap<String, String>,
}

impl Registry {
    fn insert_manager(&mut self, key: String, record: SubscriptionRecord) {
        match self.managers.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = record,
            None => self.managers.push((key, record)),
        }
    }

    fn remove_manager(&mut self, key: &str) -> bool {
        let before = self.managers.len();
        self.managers.retain(|(k, _)| k != key);
        self.managers.len() != before
    }

    /// Returns true when the counter reached zero and was removed.
    fn release_counter(&mut self, path: &str) -> bool {
        let drained = match self.counters.get_mut(path) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => return false,
        };
        if drained {
            self.counters.remove(path);
        }
        drained
    }
}

/// In-process hierarchical publish/subscribe dispatcher.
///
/// Subscribing to `a.b` delivers events published on `a.b`, `a.b.c`,
/// `a.b.c.d` and so on. Subscriptions on the empty path are managers and
/// receive everything.
///
/// All registry state sits behind one mutex that is never held while a
/// handler or lifecycle listener runs, so handlers may subscribe,
/// unsubscribe and publish from inside a delivery.
pub struct Dispatcher {
    registry: Mutex<Registry>,
    sink: Arc<dyn LifecycleSink>,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher with default configuration and no lifecycle sink.
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            sink: Arc::new(NoopSink),
            config,
        }
    }

    /// Route lifecycle notifications to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn LifecycleSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // --- Subscribe / Unsubscribe ---

    /// Subscribe `handler` to `path` under a generated key.
    pub fn subscribe<H: Handler>(&self, path: &str, handler: H) -> Result<String> {
        self.subscribe_with(SubscribeRequest::new(path).handler(handler))
    }

    /// Register a subscription and return its key.
    ///
    /// Reusing a key at the same path replaces the earlier subscription.
    pub fn subscribe_with(&self, request: SubscribeRequest) -> Result<String> {
        let SubscribeRequest {
            path,
            handler,
            key,
            recipient,
        } = request;

        let handler = handler.ok_or(PubSubError::InvalidHandler)?;
        let channel = if path.is_empty() {
            None
        } else {
            Some(ChannelPath::parse(&path)?)
        };
        let key = key.unwrap_or_else(|| generate_key(self.config.key_length));
        let record = SubscriptionRecord { handler, recipient };

        {
            let mut guard = self.registry.lock();
            let registry = &mut *guard;
            match &channel {
                None => registry.insert_manager(key.clone(), record),
                Some(channel) => {
                    registry.trie.insert(channel.segments(), key.clone(), record);
                    *registry.counters.entry(path.clone()).or_insert(0) += 1;
                }
            }
            registry.last_keys.insert(path.clone(), key.clone());
        }

        tracing::debug!(path = %path, key = %key, manager = channel.is_none(), "Subscribed");
        self.sink.emit(&LifecycleEvent::Subscribe {
            path,
            key: key.clone(),
        });
        Ok(key)
    }

    /// Remove the subscription `key` registered at `path`.
    ///
    /// Never fails. When `path` does not lead to an existing trie node the
    /// key is looked up among managers instead and no notification is
    /// raised.
    pub fn unsubscribe(&self, path: &str, key: &str) {
        let segments: Vec<String> = path.split(SEGMENT_SEPARATOR).map(str::to_string).collect();

        let outcome = {
            let mut guard = self.registry.lock();
            let registry = &mut *guard;
            // The empty path never reaches the trie, even if a `""` node exists.
            let outcome = if path.is_empty() {
                RemoveOutcome::Unresolved
            } else {
                registry
                    .trie
                    .remove(&segments, key, self.config.prune_empty_nodes)
            };
            registry.release_counter(path);
            if registry.last_keys.get(path).map(String::as_str) == Some(key) {
                registry.last_keys.remove(path);
            }
            if outcome == RemoveOutcome::Unresolved {
                let removed = registry.remove_manager(key);
                tracing::debug!(path = %path, key = %key, removed, "Unsubscribed manager");
            }
            outcome
        };

        if let RemoveOutcome::Resolved { removed } = outcome {
            tracing::debug!(path = %path, key = %key, removed, "Unsubscribed");
            self.sink.emit(&LifecycleEvent::Unsubscribe {
                path: path.to_string(),
            });
        }
    }

    /// Subscribe a bounded queue to `path` with the configured buffer size.
    pub fn subscribe_channel(&self, path: &str) -> Result<ChannelSubscription> {
        self.subscribe_channel_bounded(path, self.config.channel_buffer_size)
    }

    /// Subscribe a queue holding at most `buffer_size` undelivered events.
    ///
    /// A `buffer_size` of zero is treated as one.
    pub fn subscribe_channel_bounded(
        &self,
        path: &str,
        buffer_size: usize,
    ) -> Result<ChannelSubscription> {
        let key = generate_key(self.config.key_length);
        let (handler, subscription) = channel::pair(key.clone(), path.to_string(), buffer_size);
        self.subscribe_with(SubscribeRequest::new(path).handler(handler).key(key))?;
        Ok(subscription)
    }

    // --- Publish ---

    /// Publish `data` on `path` with generated event metadata.
    pub fn publish(
        &self,
        path: impl IntoChannelPath,
        data: serde_json::Value,
    ) -> Result<Vec<DeliveryError>> {
        self.publish_with(path, data, PublishOptions::default())
    }

    /// Publish `data` on `path`.
    ///
    /// Managers run first, then subscribers along the path from the
    /// shallowest prefix down. A recipient registered at several levels is
    /// invoked once. Handler failures do not stop delivery; they are
    /// returned, keyed by subscription. An empty result means every handler
    /// succeeded.
    pub fn publish_with(
        &self,
        path: impl IntoChannelPath,
        data: serde_json::Value,
        options: PublishOptions,
    ) -> Result<Vec<DeliveryError>> {
        let path = path.into_channel_path()?;

        let (event_id, event_date) = match options.event_id {
            Some(id) => (id, options.event_date),
            None => (
                generate_key(self.config.key_length),
                Some(Timestamp::now()),
            ),
        };
        let event = Event {
            data,
            path,
            event_id,
            event_date,
            source: options.source,
            target: options.target,
        };

        let mut errors = Vec::new();
        let mut delivered = 0usize;
        // (path, key) of queue subscribers whose receiver is gone.
        let mut disconnected: Vec<(String, String)> = Vec::new();

        let managers = self.registry.lock().managers.clone();
        for (key, record) in &managers {
            if self.deliver(key, record, &event, &mut errors) {
                disconnected.push((String::new(), key.clone()));
            }
            delivered += 1;
        }

        // One level at a time: each node is snapshotted right before its
        // handlers run, so changes made to deeper levels by shallower
        // handlers are seen by this publish.
        let segments = event.path.segments();
        let mut reached: HashSet<String> = HashSet::new();
        for depth in 1..=event.path.depth() {
            let level = &segments[..depth];
            let Some(records) = self.registry.lock().trie.records_at(level) else {
                break;
            };

            for (key, record) in &records {
                if let Some(target) = &event.target {
                    if record.recipient.as_deref() != Some(target.as_str()) {
                        continue;
                    }
                }
                if let Some(recipient) = &record.recipient {
                    if !reached.insert(recipient.clone()) {
                        continue;
                    }
                }
                if self.deliver(key, record, &event, &mut errors) {
                    disconnected.push((level.join("."), key.clone()));
                }
                delivered += 1;
            }
        }

        for (path, key) in &disconnected {
            tracing::debug!(path = %path, key = %key, "Dropping disconnected channel subscriber");
            self.unsubscribe(path, key);
        }

        tracing::debug!(
            path = %event.path,
            event_id = %event.event_id,
            delivered,
            failed = errors.len(),
            "Published"
        );
        Ok(errors)
    }

    /// Invoke one handler, recording any failure. Returns true when the
    /// handler is a queue whose receiver has been dropped.
    fn deliver(
        &self,
        key: &str,
        record: &SubscriptionRecord,
        event: &Event,
        errors: &mut Vec<DeliveryError>,
    ) -> bool {
        let Err(failure) = handler::invoke(record.handler.as_ref(), event, self.config.catch_panics)
        else {
            return false;
        };

        match &failure {
            DeliveryFailure::Panicked(message) => {
                tracing::error!(key = %key, path = %event.path, %message, "Handler panicked");
            }
            other => {
                tracing::warn!(key = %key, path = %event.path, error = %other, "Handler failed");
            }
        }
        let gone = failure == DeliveryFailure::Channel(ChannelDeliveryError::Disconnected);
        errors.push(DeliveryError {
            key: key.to_string(),
            failure,
        });
        gone
    }

    // --- Introspection ---

    /// Active subscription count per path string.
    pub fn path_counters(&self) -> HashMap<String, usize> {
        self.registry.lock().counters.clone()
    }

    /// Most recent key registered per path string (managers under `""`).
    pub fn last_keys(&self) -> HashMap<String, String> {
        self.registry.lock().last_keys.clone()
    }

    pub fn manager_count(&self) -> usize {
        self.registry.lock().managers.len()
    }

    /// Number of subscriptions held in the trie and the manager registry.
    pub fn subscription_count(&self) -> usize {
        let registry = self.registry.lock();
        registry.trie.len() + registry.managers.len()
    }

    /// Keys of the trie subscribers a publish on `path` would visit, in
    /// delivery order, before recipient dedup and target filtering.
    pub fn subscribers_along(&self, path: impl IntoChannelPath) -> Result<Vec<String>> {
        let path = path.into_channel_path()?;
        let registry = self.registry.lock();
        Ok(registry
            .trie
            .collect_along_path(path.segments())
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// Number of trie nodes below the root.
    pub fn node_count(&self) -> usize {
        self.registry.lock().trie.node_count()
    }

    /// Whether `key` is currently registered at `path`.
    pub fn is_subscribed(&self, path: &str, key: &str) -> bool {
        let registry = self.registry.lock();
        if path.is_empty() {
            return registry.managers.iter().any(|(k, _)| k == key);
        }
        let segments: Vec<String> = path.split(SEGMENT_SEPARATOR).map(str::to_string).collect();
        registry.trie.get(&segments, key).is_some()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("Dispatcher")
            .field("subscriptions", &registry.trie.len())
            .field("managers", &registry.managers.len())
            .field("paths", &registry.counters.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerResult;
    use crate::lifecycle::{LifecycleEmitter, LifecycleKind};
    use serde_json::json;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, tag: &str) -> impl Handler {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |_: &Event| -> HandlerResult {
            log.lock().push(tag.clone());
            Ok(())
        }
    }

    #[test]
    fn test_subscribe_returns_generated_key() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let key = dispatcher.subscribe("a.b", recording(&log, "h")).unwrap();
        assert_eq!(key.len(), 24);
        assert!(dispatcher.is_subscribed("a.b", &key));
        assert_eq!(dispatcher.path_counters().get("a.b"), Some(&1));
        assert_eq!(dispatcher.last_keys().get("a.b"), Some(&key));
    }

    #[test]
    fn test_supplied_key_used_verbatim() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let key = dispatcher
            .subscribe_with(
                SubscribeRequest::new("a")
                    .handler(recording(&log, "h"))
                    .key("my-key"),
            )
            .unwrap();
        assert_eq!(key, "my-key");
    }

    #[test]
    fn test_key_length_from_config() {
        let dispatcher = Dispatcher::with_config(DispatcherConfig {
            key_length: 8,
            ..Default::default()
        });
        let log = Log::default();

        let key = dispatcher.subscribe("a", recording(&log, "h")).unwrap();
        assert_eq!(key.len(), 8);
    }

    #[test]
    fn test_missing_handler_rejected() {
        let dispatcher = Dispatcher::new();
        let result = dispatcher.subscribe_with(SubscribeRequest::new("a.b").key("k"));

        assert_eq!(result, Err(PubSubError::InvalidHandler));
        assert_eq!(dispatcher.subscription_count(), 0);
        assert!(dispatcher.path_counters().is_empty());
    }

    #[test]
    fn test_empty_segment_is_an_ordinary_node() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let key = dispatcher.subscribe("a..b", recording(&log, "h")).unwrap();
        assert!(dispatcher.is_subscribed("a..b", &key));
        assert_eq!(dispatcher.node_count(), 3);

        dispatcher.publish("a..b.c", json!(null)).unwrap();
        dispatcher.publish("a.b", json!(null)).unwrap();
        assert_eq!(*log.lock(), vec!["h"]);
    }

    #[test]
    fn test_empty_path_unsubscribe_skips_empty_segment_node() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        // A `""` segment node under the root must not swallow manager removal.
        dispatcher
            .subscribe_with(
                SubscribeRequest::new(".x")
                    .key("shared")
                    .handler(recording(&log, "trie")),
            )
            .unwrap();
        dispatcher
            .subscribe_with(
                SubscribeRequest::new("")
                    .key("shared")
                    .handler(recording(&log, "manager")),
            )
            .unwrap();

        dispatcher.unsubscribe("", "shared");
        assert_eq!(dispatcher.manager_count(), 0);
        assert!(dispatcher.is_subscribed(".x", "shared"));
    }

    #[test]
    fn test_empty_path_registers_manager() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let key = dispatcher.subscribe("", recording(&log, "m")).unwrap();
        assert_eq!(dispatcher.manager_count(), 1);
        assert_eq!(dispatcher.node_count(), 0);
        assert!(dispatcher.path_counters().is_empty());
        assert!(dispatcher.is_subscribed("", &key));
    }

    #[test]
    fn test_publish_invalid_path() {
        let dispatcher = Dispatcher::new();

        assert!(matches!(
            dispatcher.publish("", json!(null)),
            Err(PubSubError::InvalidPath(_))
        ));
        assert!(matches!(
            dispatcher.publish(Vec::<String>::new(), json!(null)),
            Err(PubSubError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_publish_generates_event_metadata() {
        let dispatcher = Dispatcher::new();
        let seen: Arc<Mutex<Vec<Event>>> = Arc::default();
        let sink = Arc::clone(&seen);
        dispatcher
            .subscribe("a", move |e: &Event| -> HandlerResult {
                sink.lock().push(e.clone());
                Ok(())
            })
            .unwrap();

        dispatcher.publish("a.b", json!({"x": 1})).unwrap();
        dispatcher
            .publish_with(
                "a",
                json!(2),
                PublishOptions {
                    event_id: Some("given".to_string()),
                    source: Some("node-1".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].event_id.len(), 24);
        assert!(seen[0].event_date.is_some());
        assert_eq!(seen[0].path.as_str(), "a.b");
        assert_eq!(seen[0].data, json!({"x": 1}));

        assert_eq!(seen[1].event_id, "given");
        assert!(seen[1].event_date.is_none());
        assert_eq!(seen[1].source.as_deref(), Some("node-1"));
    }

    #[test]
    fn test_managers_run_before_trie_subscribers() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        dispatcher.subscribe("a", recording(&log, "sub")).unwrap();
        dispatcher.subscribe("", recording(&log, "manager")).unwrap();

        dispatcher.publish("a", json!(null)).unwrap();
        dispatcher.publish("unrelated", json!(null)).unwrap();

        assert_eq!(*log.lock(), vec!["manager", "sub", "manager"]);
    }

    #[test]
    fn test_managers_ignore_target() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        dispatcher.subscribe("", recording(&log, "manager")).unwrap();

        dispatcher
            .publish_with(
                "a",
                json!(null),
                PublishOptions {
                    target: Some("someone".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(*log.lock(), vec!["manager"]);
    }

    #[test]
    fn test_manager_failure_isolated() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        dispatcher
            .subscribe_with(
                SubscribeRequest::new("")
                    .key("bad-manager")
                    .handler(|_: &Event| -> HandlerResult { Err("manager down".into()) }),
            )
            .unwrap();
        dispatcher.subscribe("", recording(&log, "manager")).unwrap();
        dispatcher.subscribe("a", recording(&log, "sub")).unwrap();

        let errors = dispatcher.publish("a", json!(null)).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, "bad-manager");
        assert_eq!(
            errors[0].failure,
            DeliveryFailure::Failed("manager down".to_string())
        );
        assert_eq!(*log.lock(), vec!["manager", "sub"]);
    }

    #[test]
    fn test_unsubscribe_manager_via_empty_path() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        let key = dispatcher.subscribe("", recording(&log, "m")).unwrap();

        dispatcher.unsubscribe("", &key);
        dispatcher.publish("a", json!(null)).unwrap();

        assert_eq!(dispatcher.manager_count(), 0);
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_is_silent() {
        let dispatcher = Dispatcher::new();
        dispatcher.unsubscribe("nonexistent.path", "nosuchkey");
        dispatcher.unsubscribe("", "nosuchkey");
        dispatcher.unsubscribe("a..b", "nosuchkey");
        assert_eq!(dispatcher.subscription_count(), 0);
    }

    #[test]
    fn test_counters_track_subscriptions() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let k1 = dispatcher.subscribe("a.b", recording(&log, "1")).unwrap();
        let k2 = dispatcher.subscribe("a.b", recording(&log, "2")).unwrap();
        assert_eq!(dispatcher.path_counters().get("a.b"), Some(&2));

        dispatcher.unsubscribe("a.b", &k1);
        assert_eq!(dispatcher.path_counters().get("a.b"), Some(&1));

        dispatcher.unsubscribe("a.b", &k2);
        assert!(dispatcher.path_counters().get("a.b").is_none());
        assert!(!dispatcher.is_subscribed("a.b", &k2));
    }

    #[test]
    fn test_unsubscribe_prunes_nodes() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();

        let key = dispatcher.subscribe("a.b.c", recording(&log, "h")).unwrap();
        assert_eq!(dispatcher.node_count(), 3);

        dispatcher.unsubscribe("a.b.c", &key);
        assert_eq!(dispatcher.node_count(), 0);
    }

    #[test]
    fn test_unsubscribe_without_pruning_keeps_nodes() {
        let dispatcher = Dispatcher::with_config(DispatcherConfig {
            prune_empty_nodes: false,
            ..Default::default()
        });
        let log = Log::default();

        let key = dispatcher.subscribe("a.b.c", recording(&log, "h")).unwrap();
        dispatcher.unsubscribe("a.b.c", &key);
        assert_eq!(dispatcher.node_count(), 3);
        assert_eq!(dispatcher.subscription_count(), 0);
    }

    #[test]
    fn test_lifecycle_notifications() {
        let emitter = Arc::new(LifecycleEmitter::new());
        let dispatcher = Dispatcher::new().with_sink(emitter.clone());

        let events: Arc<Mutex<Vec<LifecycleEvent>>> = Arc::default();
        for kind in [LifecycleKind::Subscribe, LifecycleKind::Unsubscribe] {
            let events = Arc::clone(&events);
            emitter.on(kind, move |e| events.lock().push(e.clone()));
        }

        let log = Log::default();
        let key = dispatcher.subscribe("a.b", recording(&log, "h")).unwrap();
        dispatcher.unsubscribe("a.b", &key);
        // Unresolved path: falls back to managers, no notification.
        dispatcher.unsubscribe("x.y", "nothing");

        let events = events.lock();
        assert_eq!(
            *events,
            vec![
                LifecycleEvent::Subscribe {
                    path: "a.b".to_string(),
                    key,
                },
                LifecycleEvent::Unsubscribe {
                    path: "a.b".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_channel_subscription_receives_events() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher.subscribe_channel("orders").unwrap();

        dispatcher.publish("orders.created", json!({"id": 7})).unwrap();

        let event = sub.try_recv().unwrap();
        assert_eq!(event.data, json!({"id": 7}));
        assert_eq!(event.path.as_str(), "orders.created");
        assert!(dispatcher.is_subscribed("orders", &sub.key));
    }

    #[test]
    fn test_full_channel_reported_as_delivery_error() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher.subscribe_channel_bounded("q", 1).unwrap();

        assert!(dispatcher.publish("q", json!(1)).unwrap().is_empty());
        let errors = dispatcher.publish("q", json!(2)).unwrap();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].key, sub.key);
        assert_eq!(
            errors[0].failure,
            DeliveryFailure::Channel(ChannelDeliveryError::Full)
        );
        assert_eq!(sub.pending(), 1);
        // A full queue stays subscribed.
        assert!(dispatcher.is_subscribed("q", &sub.key));
    }

    #[test]
    fn test_zero_buffer_channel_holds_one_event() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher.subscribe_channel_bounded("q", 0).unwrap();

        assert!(dispatcher.publish("q", json!(1)).unwrap().is_empty());
        assert_eq!(sub.pending(), 1);
    }

    #[test]
    fn test_disconnected_channel_removed_after_failure() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher.subscribe_channel("q").unwrap();
        let key = sub.key.clone();
        drop(sub);

        let errors = dispatcher.publish("q.child", json!(1)).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].failure,
            DeliveryFailure::Channel(ChannelDeliveryError::Disconnected)
        );
        assert!(!dispatcher.is_subscribed("q", &key));
        assert!(dispatcher.path_counters().get("q").is_none());
        assert_eq!(dispatcher.node_count(), 0);

        assert!(dispatcher.publish("q", json!(2)).unwrap().is_empty());
    }

    #[test]
    fn test_disconnected_manager_channel_removed() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher.subscribe_channel("").unwrap();
        drop(sub);

        assert_eq!(dispatcher.publish("a", json!(1)).unwrap().len(), 1);
        assert_eq!(dispatcher.manager_count(), 0);
    }

    #[test]
    fn test_subscribers_along_lists_chain() {
        let dispatcher = Dispatcher::new();
        let log = Log::default();
        for (path, key) in [("a.b", "mid"), ("a", "top"), ("a.b.c", "deep"), ("x", "other")] {
            dispatcher
                .subscribe_with(SubscribeRequest::new(path).key(key).handler(recording(&log, key)))
                .unwrap();
        }

        assert_eq!(
            dispatcher.subscribers_along("a.b.c.d").unwrap(),
            vec!["top", "mid", "deep"]
        );
        assert!(dispatcher.subscribers_along("").is_err());
    }

    #[test]
    fn test_shallow_handler_changes_deeper_level_mid_publish() {
        let dispatcher = Arc::new(Dispatcher::new());
        let log = Log::default();

        dispatcher
            .subscribe_with(
                SubscribeRequest::new("a.b")
                    .key("victim")
                    .handler(recording(&log, "victim@a.b")),
            )
            .unwrap();

        let weak = Arc::downgrade(&dispatcher);
        let late_log = Arc::clone(&log);
        dispatcher
            .subscribe("a", move |_: &Event| -> HandlerResult {
                if let Some(inner) = weak.upgrade() {
                    inner.subscribe_with(
                        SubscribeRequest::new("a.b")
                            .key("late")
                            .handler(recording(&late_log, "late@a.b")),
                    )?;
                    inner.unsubscribe("a.b", "victim");
                }
                Ok(())
            })
            .unwrap();

        dispatcher.publish("a.b", json!(null)).unwrap();
        assert_eq!(*log.lock(), vec!["late@a.b"]);
    }
}

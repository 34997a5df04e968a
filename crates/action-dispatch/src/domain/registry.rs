//! # Subscription Registry
//!
//! Tracks, per logical queue name, the set of local components currently
//! interested, so a broker-level subscription exists exactly while at
//! least one interested component is registered.
//!
//! The registry is pure bookkeeping. Its mutating operations return a
//! [`Directive`] naming the broker call the owner must make; the
//! dispatcher is the only component that executes those calls, which
//! keeps subscribe/unsubscribe on a single path.

use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

/// Prefix of local dispatch channels: `"actions.<queue-name>"`.
pub const CHANNEL_PREFIX: &str = "actions.";

/// Prefix of deterministic broker subscription identifiers.
///
/// The same queue always maps to the same subscription id, so a
/// duplicate subscribe is rejected by the broker instead of silently
/// duplicating delivery.
pub const SUBSCRIPTION_ID_PREFIX: &str = "sub-";

/// Reference to a registered local component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(Uuid);

impl ComponentId {
    /// Allocate a fresh component reference.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Broker subscription identifier for a queue.
#[must_use]
pub fn subscription_id(queue_name: &str) -> String {
    format!("{SUBSCRIPTION_ID_PREFIX}{queue_name}")
}

/// Recover the queue name from an inbound `subscription` header.
///
/// Returns `None` when the identifier does not carry the known prefix,
/// which the caller must treat as a protocol violation.
#[must_use]
pub fn queue_from_subscription(subscription: &str) -> Option<&str> {
    subscription.strip_prefix(SUBSCRIPTION_ID_PREFIX)
}

/// Recover the queue name from a logical channel (`"actions.<queue>"`).
#[must_use]
pub fn queue_from_channel(channel: &str) -> Option<&str> {
    channel.strip_prefix(CHANNEL_PREFIX)
}

/// Full broker destination for a queue, scoped by organization id.
#[must_use]
pub fn destination(org_id: &str, queue_name: &str) -> String {
    format!("actions.{org_id}.{queue_name}")
}

/// Broker call the registry owner must perform after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// The queue gained its first subscriber: subscribe (if connected).
    Subscribe,
    /// The queue lost its last subscriber: unsubscribe (if connected).
    Unsubscribe,
    /// No broker-visible change.
    None,
}

/// Errors from registry bookkeeping.
///
/// These are inconsistencies, not failures: the dispatcher logs them and
/// continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Unregister for a queue that was never registered.
    #[error("queue '{queue_name}' was not subscribed")]
    UnknownQueue { queue_name: String },

    /// Unregister for a component not in the queue's subscriber set.
    #[error("component {component} was not subscribed to '{queue_name}'")]
    UnknownComponent {
        queue_name: String,
        component: ComponentId,
    },
}

/// Per-queue subscriber sets.
///
/// Entries persist once created, even when their subscriber set becomes
/// empty, so re-registration does not re-derive broker metadata.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<String, HashSet<ComponentId>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component to the queue's subscriber set.
    ///
    /// Returns [`Directive::Subscribe`] when the set transitions from
    /// empty to non-empty.
    pub fn register(&mut self, queue_name: &str, component: ComponentId) -> Directive {
        let subscribers = self.entries.entry(queue_name.to_string()).or_default();
        let was_empty = subscribers.is_empty();
        subscribers.insert(component);
        if was_empty {
            Directive::Subscribe
        } else {
            Directive::None
        }
    }

    /// Remove a component from the queue's subscriber set.
    ///
    /// Returns [`Directive::Unsubscribe`] when the set becomes empty.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] when the queue has no entry or the
    /// component is not in its set; callers log this and continue.
    pub fn unregister(
        &mut self,
        queue_name: &str,
        component: ComponentId,
    ) -> Result<Directive, RegistryError> {
        let subscribers =
            self.entries
                .get_mut(queue_name)
                .ok_or_else(|| RegistryError::UnknownQueue {
                    queue_name: queue_name.to_string(),
                })?;
        if !subscribers.remove(&component) {
            return Err(RegistryError::UnknownComponent {
                queue_name: queue_name.to_string(),
                component,
            });
        }
        if subscribers.is_empty() {
            Ok(Directive::Unsubscribe)
        } else {
            Ok(Directive::None)
        }
    }

    /// Queues whose subscriber set is non-empty, in name order.
    ///
    /// Used for resubscription after a connect and for the unsubscribe
    /// sweep at stop.
    #[must_use]
    pub fn active_queues(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, subscribers)| !subscribers.is_empty())
            .map(|(queue, _)| queue.clone())
            .collect()
    }

    /// Number of subscribers for a queue (0 for unknown queues).
    #[must_use]
    pub fn subscriber_count(&self, queue_name: &str) -> usize {
        self.entries.get(queue_name).map_or(0, HashSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_register_subscribes() {
        let mut registry = SubscriptionRegistry::new();
        let a = ComponentId::new();
        let b = ComponentId::new();

        assert_eq!(registry.register("filelookup", a), Directive::Subscribe);
        assert_eq!(registry.register("filelookup", b), Directive::None);
        assert_eq!(registry.subscriber_count("filelookup"), 2);
    }

    #[test]
    fn test_last_unregister_unsubscribes() {
        let mut registry = SubscriptionRegistry::new();
        let a = ComponentId::new();
        let b = ComponentId::new();
        registry.register("filelookup", a);
        registry.register("filelookup", b);

        assert_eq!(
            registry.unregister("filelookup", a).unwrap(),
            Directive::None
        );
        assert_eq!(
            registry.unregister("filelookup", b).unwrap(),
            Directive::Unsubscribe
        );
        assert!(registry.active_queues().is_empty());
    }

    #[test]
    fn test_register_then_unregister_leaves_nothing_active() {
        let mut registry = SubscriptionRegistry::new();
        let a = ComponentId::new();
        registry.register("q", a);
        registry.unregister("q", a).unwrap();

        assert!(registry.active_queues().is_empty());
        // The entry persists for cheap re-registration.
        assert_eq!(registry.register("q", a), Directive::Subscribe);
    }

    #[test]
    fn test_unregister_unknown_queue() {
        let mut registry = SubscriptionRegistry::new();
        let err = registry.unregister("nope", ComponentId::new()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownQueue { .. }));
    }

    #[test]
    fn test_unregister_unknown_component() {
        let mut registry = SubscriptionRegistry::new();
        registry.register("q", ComponentId::new());
        let err = registry.unregister("q", ComponentId::new()).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownComponent { .. }));
    }

    #[test]
    fn test_duplicate_register_is_idempotent() {
        let mut registry = SubscriptionRegistry::new();
        let a = ComponentId::new();
        assert_eq!(registry.register("q", a), Directive::Subscribe);
        assert_eq!(registry.register("q", a), Directive::None);
        assert_eq!(registry.subscriber_count("q"), 1);
    }

    #[test]
    fn test_active_queues_sorted_and_filtered() {
        let mut registry = SubscriptionRegistry::new();
        let a = ComponentId::new();
        registry.register("zeta", a);
        registry.register("alpha", a);
        registry.register("mid", a);
        registry.unregister("mid", a).unwrap();

        assert_eq!(registry.active_queues(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_identifier_derivation_round_trip() {
        let id = subscription_id("filelookup");
        assert_eq!(id, "sub-filelookup");
        assert_eq!(queue_from_subscription(&id), Some("filelookup"));
        assert_eq!(queue_from_subscription("bogus-filelookup"), None);
    }

    #[test]
    fn test_channel_and_destination_derivation() {
        assert_eq!(queue_from_channel("actions.filelookup"), Some("filelookup"));
        assert_eq!(queue_from_channel("metrics.cpu"), None);
        assert_eq!(destination("201", "filelookup"), "actions.201.filelookup");
    }
}

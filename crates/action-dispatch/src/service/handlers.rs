//! # Handler Registration and Invocation
//!
//! Explicit routing: an ordered table from logical channel and event
//! name to registered handler closures, built at component-registration
//! time. There is no name-based reflection; a handler either carries an
//! event-name filter or is a default handler for its whole channel.

use crate::domain::event::{DispatchEvent, MessageHeaders};
use crate::domain::registry::ComponentId;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// A handler failure; its text becomes the failure reply body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Build a failure from any displayable value.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Future returned by one handler invocation.
///
/// `Ok(Some(text))` produces a new candidate reply text; `Ok(None)`
/// leaves the previous candidate standing.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Option<String>, HandlerError>> + Send>>;

/// A registered handler closure.
pub type ActionHandler = Arc<dyn Fn(ActionContext) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as an [`ActionHandler`].
pub fn action_handler<F, Fut>(f: F) -> ActionHandler
where
    F: Fn(ActionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<String>, HandlerError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// One handler to register on a channel.
pub struct HandlerSpec {
    pub(crate) name_filter: Option<String>,
    pub(crate) handler: ActionHandler,
}

impl HandlerSpec {
    /// Handler for every action event on the channel.
    #[must_use]
    pub fn default_handler(handler: ActionHandler) -> Self {
        Self {
            name_filter: None,
            handler,
        }
    }

    /// Handler only for events whose derived name equals `name`.
    #[must_use]
    pub fn named(name: impl Into<String>, handler: ActionHandler) -> Self {
        Self {
            name_filter: Some(name.into()),
            handler,
        }
    }
}

/// What one handler sees of the dispatch event, plus the progress sink.
///
/// The context clones cheaply; all handlers for one event share the same
/// progress slot, so the last note produced by the chain survives as the
/// candidate reply text.
#[derive(Clone)]
pub struct ActionContext {
    message: Arc<Value>,
    headers: MessageHeaders,
    action_id: u64,
    display_name: Arc<str>,
    event_name: Arc<str>,
    context_token: Option<Arc<str>>,
    last_value: Arc<Mutex<Option<String>>>,
}

impl ActionContext {
    /// Build the shared context for one dispatch event.
    #[must_use]
    pub(crate) fn for_event(event: &DispatchEvent) -> Self {
        Self {
            message: Arc::clone(event.message()),
            headers: event.headers().clone(),
            action_id: event.action_id(),
            display_name: Arc::from(event.display_name()),
            event_name: Arc::from(event.name()),
            context_token: event.context_token().map(Arc::from),
            last_value: Arc::new(Mutex::new(None)),
        }
    }

    /// The parsed message body.
    #[must_use]
    pub fn message(&self) -> &Value {
        &self.message
    }

    /// Mapping-based accessor for message fields.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.message.get(key)
    }

    /// The broker headers of the originating message.
    #[must_use]
    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    /// The resolved action id.
    #[must_use]
    pub fn action_id(&self) -> u64 {
        self.action_id
    }

    /// The action's display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The derived event name.
    #[must_use]
    pub fn event_name(&self) -> &str {
        &self.event_name
    }

    /// The optional context correlation token.
    #[must_use]
    pub fn context_token(&self) -> Option<&str> {
        self.context_token.as_deref()
    }

    /// Record an intermediate progress note.
    ///
    /// The note becomes the candidate reply text; a later note or a
    /// handler returning `Ok(Some(_))` replaces it. The dispatcher acts
    /// only on the terminal handler outcome.
    pub fn progress(&self, note: impl Into<String>) {
        let note = note.into();
        debug!(event = %self.event_name, note = %note, "Handler progress");
        if let Ok(mut slot) = self.last_value.lock() {
            *slot = Some(note);
        }
    }

    /// Replace the candidate reply text (used after a handler returns).
    pub(crate) fn record_value(&self, value: String) {
        if let Ok(mut slot) = self.last_value.lock() {
            *slot = Some(value);
        }
    }

    /// Take the final candidate reply text, if any value was produced.
    #[must_use]
    pub(crate) fn take_value(&self) -> Option<String> {
        self.last_value.lock().ok().and_then(|mut slot| slot.take())
    }
}

pub(crate) struct HandlerEntry {
    pub(crate) component: ComponentId,
    pub(crate) name_filter: Option<String>,
    pub(crate) handler: ActionHandler,
}

/// Ordered handler registrations per logical channel.
#[derive(Default)]
pub struct HandlerTable {
    channels: BTreeMap<String, Vec<HandlerEntry>>,
}

impl HandlerTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a component's handlers to a channel, in the given order.
    pub fn register(&mut self, channel: &str, component: ComponentId, specs: Vec<HandlerSpec>) {
        let entries = self.channels.entry(channel.to_string()).or_default();
        for spec in specs {
            entries.push(HandlerEntry {
                component,
                name_filter: spec.name_filter,
                handler: spec.handler,
            });
        }
    }

    /// Drop every handler a component registered on a channel.
    pub fn unregister(&mut self, channel: &str, component: ComponentId) {
        if let Some(entries) = self.channels.get_mut(channel) {
            entries.retain(|entry| entry.component != component);
        }
    }

    /// Handlers matching an event on a channel, in registration order.
    ///
    /// A handler matches when it has no name filter or its filter equals
    /// the event name.
    #[must_use]
    pub fn matching(&self, channel: &str, event_name: &str) -> Vec<ActionHandler> {
        self.channels
            .get(channel)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|entry| {
                        entry
                            .name_filter
                            .as_deref()
                            .map_or(true, |name| name == event_name)
                    })
                    .map(|entry| Arc::clone(&entry.handler))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::DispatchEvent;
    use serde_json::json;

    fn noop() -> ActionHandler {
        action_handler(|_ctx| async { Ok(None) })
    }

    fn tagged(tag: &'static str) -> ActionHandler {
        action_handler(move |_ctx| async move { Ok(Some(tag.to_string())) })
    }

    #[tokio::test]
    async fn test_matching_respects_name_filter_and_order() {
        let mut table = HandlerTable::new();
        let component = ComponentId::new();
        table.register(
            "actions.q",
            component,
            vec![
                HandlerSpec::named("manual_action", tagged("first")),
                HandlerSpec::default_handler(tagged("second")),
                HandlerSpec::named("other_action", tagged("third")),
            ],
        );

        let matched = table.matching("actions.q", "manual_action");
        assert_eq!(matched.len(), 2);

        let ctx = sample_context();
        assert_eq!(
            matched[0](ctx.clone()).await.unwrap(),
            Some("first".to_string())
        );
        assert_eq!(matched[1](ctx).await.unwrap(), Some("second".to_string()));
    }

    #[tokio::test]
    async fn test_unregister_removes_component_handlers() {
        let mut table = HandlerTable::new();
        let a = ComponentId::new();
        let b = ComponentId::new();
        table.register("actions.q", a, vec![HandlerSpec::default_handler(noop())]);
        table.register("actions.q", b, vec![HandlerSpec::default_handler(noop())]);

        table.unregister("actions.q", a);
        assert_eq!(table.matching("actions.q", "anything").len(), 1);

        table.unregister("actions.q", b);
        assert!(table.matching("actions.q", "anything").is_empty());
    }

    #[test]
    fn test_matching_unknown_channel_is_empty() {
        let table = HandlerTable::new();
        assert!(table.matching("actions.nope", "x").is_empty());
    }

    fn sample_context() -> ActionContext {
        let event = DispatchEvent::new(
            Arc::new(json!({"action_id": 14, "incident": {"id": 7}})),
            [("message-id", "m1")].into_iter().collect(),
            14,
            "Manual Action",
        );
        ActionContext::for_event(&event)
    }

    #[test]
    fn test_context_exposes_event_fields() {
        let ctx = sample_context();
        assert_eq!(ctx.action_id(), 14);
        assert_eq!(ctx.event_name(), "manual_action");
        assert_eq!(ctx.get("incident").unwrap()["id"], 7);
        assert!(ctx.get("artifact").is_none());
    }

    #[test]
    fn test_progress_notes_keep_last_value() {
        let ctx = sample_context();
        assert_eq!(ctx.take_value(), None);

        ctx.progress("step one");
        ctx.progress("step two");
        assert_eq!(ctx.take_value(), Some("step two".to_string()));

        // record_value overrides progress notes.
        ctx.progress("note");
        ctx.record_value("final".to_string());
        assert_eq!(ctx.take_value(), Some("final".to_string()));
    }
}

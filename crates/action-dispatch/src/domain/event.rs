//! # Dispatch Events
//!
//! The in-process representation of one inbound broker message being
//! routed to handlers, plus the event-name derivation rule.
//!
//! A dispatch event is owned exclusively by the dispatcher for the
//! duration of one message's processing and is never persisted. Once a
//! terminal outcome is recorded the event is latched: no further ack or
//! reply may be issued for it.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Header carrying the optional context correlation token.
pub const CONTEXT_TOKEN_HEADER: &str = "Co3ContextToken";

/// Errors from event construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A required broker header was absent.
    #[error("required message header '{name}' is missing")]
    MissingHeader { name: String },
}

/// Headers of one inbound broker message.
///
/// The values are opaque strings; `message-id`, `subscription`,
/// `reply-to` and `correlation-id` are echoed back verbatim in the ack
/// and reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    map: HashMap<String, String>,
}

impl MessageHeaders {
    /// Create an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.map.insert(name.into(), value.into());
    }

    /// Get a header value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    /// Get a header value, failing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::MissingHeader`] when the header is not set.
    pub fn require(&self, name: &str) -> Result<&str, EventError> {
        self.get(name).ok_or_else(|| EventError::MissingHeader {
            name: name.to_string(),
        })
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MessageHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            map: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Terminal state of one dispatch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No handler outcome recorded yet.
    Pending,
    /// Handler chain completed; reply carries status 0.
    Success,
    /// A handler failed; reply carries status 1.
    Failure,
}

impl Outcome {
    /// Status code carried in the reply body (`message_type`).
    #[must_use]
    pub fn status(self) -> u8 {
        match self {
            Self::Pending | Self::Success => 0,
            Self::Failure => 1,
        }
    }

    /// True once a terminal outcome has been recorded.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Derive an event name from an action's display name.
///
/// The rule is: trim, lowercase, then replace each maximal run of
/// non-word characters with a single `_`. Trailing underscores are not
/// stripped: `"Manual Action!!"` derives `"manual_action_"`.
#[must_use]
pub fn derive_event_name(display_name: &str) -> String {
    let lowered = display_name.trim().to_lowercase();
    let mut name = String::with_capacity(lowered.len());
    let mut in_run = false;
    for ch in lowered.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            name.push(ch);
            in_run = false;
        } else if !in_run {
            name.push('_');
            in_run = true;
        }
    }
    name
}

/// One inbound broker message being routed to handlers.
#[derive(Debug)]
pub struct DispatchEvent {
    /// The parsed JSON message body.
    message: Arc<Value>,
    /// The broker headers, echoed back in ack and reply.
    headers: MessageHeaders,
    /// Action id resolved from the message body.
    action_id: u64,
    /// Display name resolved via the action catalog.
    display_name: String,
    /// Derived event name; handler name filters match against this.
    name: String,
    /// Optional context correlation token, forwarded to handlers.
    context_token: Option<String>,
    /// At-most-once latch.
    outcome: Outcome,
}

impl DispatchEvent {
    /// Build an event for one inbound message.
    #[must_use]
    pub fn new(
        message: Arc<Value>,
        headers: MessageHeaders,
        action_id: u64,
        display_name: impl Into<String>,
    ) -> Self {
        let display_name = display_name.into();
        let name = derive_event_name(&display_name);
        let context_token = headers.get(CONTEXT_TOKEN_HEADER).map(str::to_string);
        Self {
            message,
            headers,
            action_id,
            display_name,
            name,
            context_token,
            outcome: Outcome::Pending,
        }
    }

    /// The parsed message body.
    #[must_use]
    pub fn message(&self) -> &Arc<Value> {
        &self.message
    }

    /// Mapping-based accessor for message fields (no reflection).
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.message.get(key)
    }

    /// The broker headers.
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
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The optional context correlation token.
    #[must_use]
    pub fn context_token(&self) -> Option<&str> {
        self.context_token.as_deref()
    }

    /// The recorded outcome.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Record a terminal outcome.
    ///
    /// Returns `true` if this call recorded the outcome, `false` if the
    /// event was already terminal. The caller may ack and reply only on
    /// `true`; this is the at-most-once latch.
    pub fn complete(&mut self, outcome: Outcome) -> bool {
        if self.outcome.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        self.outcome = outcome;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_headers() -> MessageHeaders {
        [
            ("message-id", "msg-1"),
            ("subscription", "sub-filelookup"),
            ("reply-to", "/queue/acks"),
            ("correlation-id", "corr-1"),
            (CONTEXT_TOKEN_HEADER, "tok-abc"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_derive_event_name_plain() {
        assert_eq!(derive_event_name("Manual Action"), "manual_action");
    }

    #[test]
    fn test_derive_event_name_trailing_punctuation() {
        // Trailing runs collapse to a single underscore, not stripped.
        assert_eq!(derive_event_name("Manual Action!!"), "manual_action_");
    }

    #[test]
    fn test_derive_event_name_collapses_runs() {
        assert_eq!(derive_event_name("  Look -- Up  "), "look_up");
        assert_eq!(derive_event_name("A/B (test)"), "a_b_test_");
    }

    #[test]
    fn test_derive_event_name_keeps_underscores_and_digits() {
        assert_eq!(derive_event_name("run_step 2"), "run_step_2");
    }

    #[test]
    fn test_headers_require() {
        let headers = sample_headers();
        assert_eq!(headers.require("message-id").unwrap(), "msg-1");
        assert_eq!(
            headers.require("missing"),
            Err(EventError::MissingHeader {
                name: "missing".to_string()
            })
        );
    }

    #[test]
    fn test_event_construction() {
        let message = Arc::new(json!({"action_id": 14, "incident": {"id": 42}}));
        let event = DispatchEvent::new(message, sample_headers(), 14, "Manual Action");

        assert_eq!(event.name(), "manual_action");
        assert_eq!(event.display_name(), "Manual Action");
        assert_eq!(event.action_id(), 14);
        assert_eq!(event.context_token(), Some("tok-abc"));
        assert_eq!(event.get("incident").unwrap()["id"], 42);
        assert!(event.get("artifact").is_none());
        assert_eq!(event.outcome(), Outcome::Pending);
    }

    #[test]
    fn test_outcome_latch_is_at_most_once() {
        let message = Arc::new(json!({"action_id": 14}));
        let mut event = DispatchEvent::new(message, sample_headers(), 14, "Manual Action");

        assert!(event.complete(Outcome::Success));
        // A racing completion for the same event is ignored.
        assert!(!event.complete(Outcome::Failure));
        assert!(!event.complete(Outcome::Success));
        assert_eq!(event.outcome(), Outcome::Success);
    }

    #[test]
    fn test_complete_with_pending_is_rejected() {
        let message = Arc::new(json!({}));
        let mut event = DispatchEvent::new(message, MessageHeaders::new(), 1, "X");
        assert!(!event.complete(Outcome::Pending));
        assert_eq!(event.outcome(), Outcome::Pending);
    }

    #[test]
    fn test_outcome_status_codes() {
        assert_eq!(Outcome::Success.status(), 0);
        assert_eq!(Outcome::Failure.status(), 1);
    }
}

//! # Dispatcher
//!
//! The orchestrator. Owns the broker session, the subscription registry,
//! the handler table and the action catalog; runs a single cooperative
//! loop over session notifications, registration commands and the
//! reconnect timer.
//!
//! Every inbound broker message becomes one dispatch event, is routed to
//! the handlers registered on its logical channel, and, after exactly
//! one terminal outcome, is acked and answered with a correlated reply.
//! Ordering follows outcome determination, not arrival; the broker's own
//! redelivery semantics govern anything left un-acked.

use crate::domain::action::ActionCatalog;
use crate::domain::event::{DispatchEvent, MessageHeaders, Outcome};
use crate::domain::registry::{
    destination, queue_from_channel, queue_from_subscription, subscription_id, ComponentId,
    Directive, SubscriptionRegistry, CHANNEL_PREFIX,
};
use crate::ports::broker::{BrokerSession, Credentials, SessionEvent};
use crate::service::handlers::{ActionContext, HandlerSpec, HandlerTable};
use crate::service::reconnect::{ConnectionState, ReconnectTimer, DEFAULT_RECONNECT_DELAY};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Reply text when the handler chain produced no value.
const DEFAULT_SUCCESS_MESSAGE: &str = "Processing complete";

/// Reply text when a handler failed without a message.
const DEFAULT_FAILURE_MESSAGE: &str = "Processing failed";

/// Errors from a [`DispatcherHandle`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// The dispatcher loop has stopped; commands can no longer be
    /// delivered.
    #[error("dispatcher is stopped")]
    Stopped,
}

/// Tuning for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Organization id scoping broker destinations.
    pub org_id: String,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl DispatchConfig {
    /// Config for an organization with the default reconnect delay.
    #[must_use]
    pub fn new(org_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

enum Command {
    Register {
        channel: String,
        component: ComponentId,
        handlers: Vec<HandlerSpec>,
    },
    Unregister {
        channel: String,
        component: ComponentId,
    },
    Stop,
}

/// Cloneable handle for registering components and stopping the loop.
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DispatcherHandle {
    /// Register a component's handlers on a logical channel.
    ///
    /// Channels named `actions.<queue>` also register broker-level
    /// interest in the queue; other channel names only populate the
    /// handler table.
    ///
    /// # Errors
    ///
    /// [`HandleError::Stopped`] if the dispatcher loop has exited.
    pub fn register(
        &self,
        channel: impl Into<String>,
        handlers: Vec<HandlerSpec>,
    ) -> Result<ComponentId, HandleError> {
        let component = ComponentId::new();
        self.commands
            .send(Command::Register {
                channel: channel.into(),
                component,
                handlers,
            })
            .map_err(|_| HandleError::Stopped)?;
        Ok(component)
    }

    /// Unregister a component from a channel.
    ///
    /// # Errors
    ///
    /// [`HandleError::Stopped`] if the dispatcher loop has exited.
    pub fn unregister(
        &self,
        channel: impl Into<String>,
        component: ComponentId,
    ) -> Result<(), HandleError> {
        self.commands
            .send(Command::Unregister {
                channel: channel.into(),
                component,
            })
            .map_err(|_| HandleError::Stopped)
    }

    /// Stop the dispatcher: unsubscribe active queues, disconnect, exit.
    ///
    /// # Errors
    ///
    /// [`HandleError::Stopped`] if the loop already exited.
    pub fn stop(&self) -> Result<(), HandleError> {
        self.commands
            .send(Command::Stop)
            .map_err(|_| HandleError::Stopped)
    }
}

#[derive(Serialize)]
struct ActionReply<'a> {
    message_type: u8,
    message: &'a str,
    complete: bool,
}

/// The action-message dispatcher.
pub struct Dispatcher<S: BrokerSession> {
    session: Arc<S>,
    catalog: ActionCatalog,
    registry: SubscriptionRegistry,
    handlers: HandlerTable,
    credentials: Credentials,
    org_id: String,
    state: ConnectionState,
    timer: ReconnectTimer,
    session_events: mpsc::UnboundedReceiver<SessionEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<S: BrokerSession> Dispatcher<S> {
    /// Build a dispatcher over a session and its notification channel.
    ///
    /// The catalog must already be loaded; a catalog load failure is
    /// fatal at startup and never reaches this constructor.
    #[must_use]
    pub fn new(
        session: Arc<S>,
        session_events: mpsc::UnboundedReceiver<SessionEvent>,
        catalog: ActionCatalog,
        credentials: Credentials,
        config: DispatchConfig,
    ) -> (Self, DispatcherHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            session,
            catalog,
            registry: SubscriptionRegistry::new(),
            handlers: HandlerTable::new(),
            credentials,
            org_id: config.org_id,
            state: ConnectionState::Disconnected,
            timer: ReconnectTimer::new(config.reconnect_delay),
            session_events,
            commands: command_rx,
        };
        (
            dispatcher,
            DispatcherHandle {
                commands: command_tx,
            },
        )
    }

    /// Run the dispatch loop until stopped.
    ///
    /// Starts in the disconnected state with the reconnect timer armed;
    /// the first connect attempt happens one delay after start.
    pub async fn run(mut self) {
        info!(org_id = %self.org_id, "Dispatcher starting");
        self.timer.arm();

        loop {
            // The fallback deadline is never awaited: the branch is
            // disabled unless the timer is armed.
            let deadline = self.timer.deadline().unwrap_or_else(Instant::now);
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(Command::Stop) | None => {
                            self.shutdown().await;
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                }
                event = self.session_events.recv() => {
                    match event {
                        Some(event) => self.handle_session_event(event).await,
                        None => {
                            warn!("Session notification channel closed; stopping");
                            self.shutdown().await;
                            break;
                        }
                    }
                }
                () = sleep_until(deadline), if self.timer.is_armed() => {
                    self.attempt_reconnect().await;
                }
            }
        }
        info!("Dispatcher stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Register {
                channel,
                component,
                handlers,
            } => {
                info!(%component, %channel, handlers = handlers.len(), "Component registered");
                self.handlers.register(&channel, component, handlers);

                let Some(queue_name) = queue_from_channel(&channel) else {
                    debug!(%channel, "Channel carries no queue interest");
                    return;
                };
                let queue_name = queue_name.to_string();
                if self.registry.register(&queue_name, component) == Directive::Subscribe {
                    self.subscribe_queue(&queue_name).await;
                }
            }
            Command::Unregister { channel, component } => {
                info!(%component, %channel, "Component unregistered");
                self.handlers.unregister(&channel, component);

                let Some(queue_name) = queue_from_channel(&channel) else {
                    return;
                };
                let queue_name = queue_name.to_string();
                match self.registry.unregister(&queue_name, component) {
                    Ok(Directive::Unsubscribe) => self.unsubscribe_queue(&queue_name).await,
                    Ok(_) => {}
                    // Bookkeeping inconsistency is logged, never fatal.
                    Err(err) => error!(%err, "Unregister ignored"),
                }
            }
            // Stop never reaches here; the run loop intercepts it.
            Command::Stop => {}
        }
    }

    async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected => {
                info!("Broker connected");
                self.state = ConnectionState::Connected;
                self.timer.disarm();
                self.resubscribe_all().await;
            }
            SessionEvent::Disconnected => {
                info!("Broker disconnected");
                self.state = ConnectionState::Disconnected;
                self.timer.arm();
            }
            SessionEvent::Error { headers, body } => {
                error!(detail = headers.get("message").unwrap_or(""), %body, "Broker error frame");
                // An error frame drops the logical connection, whether it
                // arrives mid-session or as an asynchronous connect
                // rejection; retry either way.
                if self.state != ConnectionState::Disconnected {
                    self.state = ConnectionState::Disconnected;
                    self.timer.arm();
                }
            }
            SessionEvent::Message { headers, body } => {
                self.on_message(headers, &body).await;
            }
        }
    }

    async fn attempt_reconnect(&mut self) {
        self.timer.disarm();
        if self.state == ConnectionState::Connected {
            // Idempotent no-op: a stale timer fired after a connect.
            error!("Reconnect requested while already connected");
            return;
        }

        debug!("Attempting broker connect");
        self.state = ConnectionState::Connecting;
        if let Err(err) = self.session.connect(&self.credentials).await {
            warn!(%err, delay = ?self.timer.delay(), "Connect failed; will retry");
            self.state = ConnectionState::Disconnected;
            self.timer.arm();
        }
        // On success the session emits Connected, which completes the
        // transition and triggers resubscription.
    }

    async fn resubscribe_all(&mut self) {
        for queue_name in self.registry.active_queues() {
            self.subscribe_queue(&queue_name).await;
        }
    }

    async fn subscribe_queue(&self, queue_name: &str) {
        if !self.session.is_connected() {
            // Subscription happens on the next connected notification.
            return;
        }
        info!(queue = %queue_name, "Subscribing");
        let id = subscription_id(queue_name);
        let dest = destination(&self.org_id, queue_name);
        if let Err(err) = self.session.subscribe(&id, &dest).await {
            error!(%err, queue = %queue_name, "Subscribe failed");
        }
    }

    async fn unsubscribe_queue(&self, queue_name: &str) {
        if !self.session.is_connected() {
            return;
        }
        info!(queue = %queue_name, "Unsubscribing");
        let id = subscription_id(queue_name);
        let dest = destination(&self.org_id, queue_name);
        if let Err(err) = self.session.unsubscribe(&id, &dest).await {
            error!(%err, queue = %queue_name, "Unsubscribe failed");
        }
    }

    async fn shutdown(&mut self) {
        self.timer.disarm();
        // The session can be live before the connected notification is
        // processed; ask it directly rather than trusting our state.
        if !self.session.is_connected() {
            return;
        }
        for queue_name in self.registry.active_queues() {
            self.unsubscribe_queue(&queue_name).await;
        }
        if let Err(err) = self.session.disconnect().await {
            error!(%err, "Disconnect failed during shutdown");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Decode one inbound message and route it to handlers.
    ///
    /// Protocol violations (bad subscription id, malformed body,
    /// unresolvable action id) are logged and leave the message un-acked
    /// for broker redelivery; they never poison the loop.
    async fn on_message(&mut self, headers: MessageHeaders, body: &str) {
        let subscription = match headers.require("subscription") {
            Ok(subscription) => subscription,
            Err(err) => {
                error!(%err, "Message dropped");
                return;
            }
        };
        let Some(queue_name) = queue_from_subscription(subscription) else {
            error!(%subscription, "Unknown subscription id format; message dropped");
            return;
        };
        let channel = format!("{CHANNEL_PREFIX}{queue_name}");
        debug!(%channel, "Message received");

        let message: Value = match serde_json::from_str(body) {
            Ok(message) => message,
            Err(err) => {
                error!(%err, %channel, "Message body is not valid JSON; not acked");
                return;
            }
        };
        let Some(action_id) = message.get("action_id").and_then(Value::as_u64) else {
            error!(%channel, "Message carries no action_id; not acked");
            return;
        };
        let display_name = match self.catalog.name_of(action_id) {
            Ok(name) => name.to_string(),
            Err(err) => {
                // Configuration drift; leave un-acked, keep dispatching.
                error!(%err, %channel, "Action lookup failed; not acked");
                return;
            }
        };

        let event = DispatchEvent::new(Arc::new(message), headers, action_id, display_name);
        self.fire(&channel, event).await;
    }

    /// Invoke the handler chain and perform the ack+reply sequence once.
    async fn fire(&mut self, channel: &str, mut event: DispatchEvent) {
        debug!(%channel, event = %event.name(), action_id = event.action_id(), "Dispatching");
        let chain = self.handlers.matching(channel, event.name());
        let ctx = ActionContext::for_event(&event);

        let mut failure: Option<String> = None;
        for handler in chain {
            match handler(ctx.clone()).await {
                Ok(Some(value)) => ctx.record_value(value),
                Ok(None) => {}
                Err(err) => {
                    // First failure ends the chain.
                    failure = Some(err.to_string());
                    break;
                }
            }
        }

        let (outcome, reply_text) = match failure {
            Some(text) => {
                let text = if text.is_empty() {
                    DEFAULT_FAILURE_MESSAGE.to_string()
                } else {
                    text
                };
                (Outcome::Failure, text)
            }
            None => {
                let text = ctx
                    .take_value()
                    .unwrap_or_else(|| DEFAULT_SUCCESS_MESSAGE.to_string());
                (Outcome::Success, text)
            }
        };
        self.finish(&mut event, outcome, &reply_text).await;
    }

    /// Record the outcome, then ack and reply exactly once.
    ///
    /// Ack or send failures are logged and not retried: the ack was not
    /// durably recorded by the broker either, so its redelivery and
    /// timeout semantics govern recovery.
    async fn finish(&self, event: &mut DispatchEvent, outcome: Outcome, reply_text: &str) {
        if !event.complete(outcome) {
            warn!(event = %event.name(), "Duplicate completion ignored");
            return;
        }

        let headers = event.headers();
        let (message_id, subscription) = match (
            headers.require("message-id"),
            headers.require("subscription"),
        ) {
            (Ok(message_id), Ok(subscription)) => (message_id, subscription),
            (Err(err), _) | (_, Err(err)) => {
                error!(%err, "Cannot ack message");
                return;
            }
        };
        if let Err(err) = self.session.ack(message_id, subscription).await {
            error!(%err, %message_id, "Ack failed");
        }

        let (reply_to, correlation_id) = match (
            headers.require("reply-to"),
            headers.require("correlation-id"),
        ) {
            (Ok(reply_to), Ok(correlation_id)) => (reply_to, correlation_id),
            (Err(err), _) | (_, Err(err)) => {
                error!(%err, "Cannot send reply");
                return;
            }
        };
        let reply = ActionReply {
            message_type: outcome.status(),
            message: reply_text,
            complete: true,
        };
        let body = match serde_json::to_string(&reply) {
            Ok(body) => body,
            Err(err) => {
                error!(%err, "Reply serialization failed");
                return;
            }
        };
        debug!(
            event = %event.name(),
            status = outcome.status(),
            %reply_to,
            "Acked and replying"
        );
        if let Err(err) = self.session.send(reply_to, &body, correlation_id).await {
            error!(%err, %reply_to, "Reply send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_body_shape() {
        let reply = ActionReply {
            message_type: 1,
            message: "bad value",
            complete: true,
        };
        let body = serde_json::to_string(&reply).unwrap();
        assert_eq!(body, r#"{"message_type":1,"message":"bad value","complete":true}"#);
    }

    #[test]
    fn test_default_messages() {
        assert_eq!(DEFAULT_SUCCESS_MESSAGE, "Processing complete");
        assert_eq!(DEFAULT_FAILURE_MESSAGE, "Processing failed");
    }
}

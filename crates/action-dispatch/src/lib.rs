//! # Action Dispatch
//!
//! A long-lived client for an action-message broker: one TLS-protected
//! pub/sub connection, many logical subscribers multiplexed over it,
//! typed dispatch events routed to local handlers, and an exactly-once
//! ack + correlated reply for every inbound message.
//!
//! ## Architecture
//!
//! The crate follows hexagonal layering:
//!
//! - **Domain:** pure logic: action catalog, dispatch events and
//!   event-name derivation, subscription bookkeeping, certificate
//!   hostname validation.
//! - **Ports:** the broker session and REST collaborator traits the host
//!   must satisfy.
//! - **Service:** the dispatcher run loop, handler table, and reconnect
//!   policy.
//! - **Adapters:** an in-memory broker session and a reqwest REST
//!   client.
//!
//! ## Flow
//!
//! ```text
//! ┌────────────┐  register/unregister   ┌──────────────────────┐
//! │ Components │ ─────────────────────► │      Dispatcher      │
//! └────────────┘                        │  registry ─ catalog  │
//!                                       │  handlers ─ timer    │
//!        handler chain ◄─ events ◄──────│                      │
//!        outcome ─► ack + reply ────────►│   BrokerSession     │
//!                                       └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use action_dispatch::{
//!     action_handler, ActionCatalog, ActionDefinition, Credentials, DispatchConfig,
//!     Dispatcher, HandlerSpec, InMemoryBroker, SessionConfig,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let catalog = ActionCatalog::from_definitions(vec![ActionDefinition {
//!     id: 14,
//!     name: "Manual Action".to_string(),
//! }]);
//! let (broker, events) = InMemoryBroker::new(SessionConfig::new("broker.example.com", 65001));
//! let credentials = Credentials {
//!     login: "user@example.com".to_string(),
//!     passcode: "secret".to_string(),
//! };
//!
//! let (dispatcher, handle) = Dispatcher::new(
//!     Arc::new(broker),
//!     events,
//!     catalog,
//!     credentials,
//!     DispatchConfig::new("201"),
//! );
//!
//! handle
//!     .register(
//!         "actions.filelookup",
//!         vec![HandlerSpec::default_handler(action_handler(|ctx| async move {
//!             ctx.progress("looking up");
//!             Ok(Some("field updated".to_string()))
//!         }))],
//!     )
//!     .unwrap();
//!
//! dispatcher.run().await;
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;

// Domain
pub use domain::{
    derive_event_name, destination, queue_from_channel, queue_from_subscription, subscription_id,
    validate_cert, ActionCatalog, ActionDefinition, CatalogError, CertCheck, CertValidator,
    ComponentId, DispatchEvent, Directive, EventError, MessageHeaders, Outcome, PeerCertificate,
    RegistryError, SubscriptionRegistry, CHANNEL_PREFIX, SUBSCRIPTION_ID_PREFIX,
};

// Ports
pub use ports::{
    ActionApi, BrokerError, BrokerSession, Credentials, RestError, SessionConfig, SessionEvent,
};

// Service
pub use service::dispatcher::DispatchConfig;
pub use service::{
    action_handler, ActionContext, ActionHandler, ConnectionState, Dispatcher, DispatcherHandle,
    HandleError, HandlerError, HandlerSpec, ReconnectTimer, DEFAULT_RECONNECT_DELAY,
};

// Adapters
pub use adapters::{BrokerOp, HttpActionApi, InMemoryBroker};

// Configuration
pub use config::{ConfigError, RelayConfig};

//! # Domain Layer
//!
//! Pure dispatch logic with no I/O: the action catalog, dispatch events,
//! subscription bookkeeping, and certificate hostname validation.

pub mod action;
pub mod cert;
pub mod event;
pub mod registry;

pub use action::{ActionCatalog, ActionDefinition, CatalogError};
pub use cert::{validate_cert, CertCheck, CertValidator, PeerCertificate};
pub use event::{derive_event_name, DispatchEvent, EventError, MessageHeaders, Outcome};
pub use registry::{
    destination, queue_from_channel, queue_from_subscription, subscription_id, ComponentId,
    Directive, RegistryError, SubscriptionRegistry, CHANNEL_PREFIX, SUBSCRIPTION_ID_PREFIX,
};

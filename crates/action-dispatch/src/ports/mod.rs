//! # Ports Layer
//!
//! Trait boundaries the host must satisfy: the broker session that owns
//! the physical connection, and the REST collaborator the action catalog
//! is loaded from.

pub mod broker;
pub mod rest;

pub use broker::{BrokerError, BrokerSession, Credentials, SessionConfig, SessionEvent};
pub use rest::{ActionApi, RestError};

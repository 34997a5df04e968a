//! # Adapters Layer
//!
//! Concrete implementations of the ports: an in-memory broker session
//! for tests and embedding, and a reqwest-backed REST client.

pub mod memory;
pub mod rest;

pub use memory::{BrokerOp, InMemoryBroker};
pub use rest::HttpActionApi;

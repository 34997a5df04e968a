//! # Broker Session Port
//!
//! The driven port wrapping one physical pub/sub connection. The
//! wire-level frame codec lives behind this boundary; implementations
//! expose connect/disconnect/subscribe/unsubscribe/ack/send and deliver
//! parsed header/body pairs as [`SessionEvent`]s over an mpsc channel.
//!
//! Acknowledgment is client-managed: the broker does not auto-ack on
//! delivery, and a message is only consumed once `ack` is called with
//! its message-id and subscription-id pair.

use crate::domain::cert::{validate_cert, CertValidator};
use crate::domain::event::MessageHeaders;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from broker session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The connect attempt was rejected; the reconnect loop retries it.
    #[error("connection failed: {reason}")]
    ConnectFailed { reason: String },

    /// The peer certificate failed hostname validation.
    #[error("peer certificate rejected: {detail}")]
    CertificateRejected { detail: String },

    /// An operation requiring a live connection was called while
    /// disconnected.
    #[error("session is not connected")]
    NotConnected,

    /// The underlying transport failed mid-operation.
    #[error("transport error: {reason}")]
    Transport { reason: String },
}

/// Login credentials for the broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name (the account email in the original service).
    pub login: String,
    /// Passcode.
    pub passcode: String,
}

/// Connection parameters handed to a session implementation.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker hostname; also the name the certificate is checked against.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional CA bundle for the TLS trust root.
    pub ca_file: Option<PathBuf>,
    /// Certificate validator invoked at connect time.
    pub cert_validator: CertValidator,
}

impl SessionConfig {
    /// Config for `host:port` with the default hostname validator.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ca_file: None,
            cert_validator: validate_cert,
        }
    }

    /// Set the CA bundle path.
    #[must_use]
    pub fn with_ca_file(mut self, path: PathBuf) -> Self {
        self.ca_file = Some(path);
        self
    }

    /// Replace the certificate validator.
    #[must_use]
    pub fn with_cert_validator(mut self, validator: CertValidator) -> Self {
        self.cert_validator = validator;
        self
    }
}

/// Asynchronous notifications surfaced by the session.
///
/// Delivered to the dispatcher over an mpsc channel; all four are
/// processed on the single dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection reached the connected state.
    Connected,
    /// The connection was lost.
    Disconnected,
    /// The broker produced an error frame.
    Error {
        /// Error frame headers.
        headers: MessageHeaders,
        /// Error frame body.
        body: String,
    },
    /// The broker delivered a message.
    Message {
        /// Message headers (message-id, subscription, reply-to,
        /// correlation-id, optional context token).
        headers: MessageHeaders,
        /// Raw message body; expected to be JSON.
        body: String,
    },
}

/// The single broker connection owned by the dispatcher.
///
/// No component other than the dispatcher may call these operations.
#[async_trait]
pub trait BrokerSession: Send + Sync {
    /// Attempt to connect with the given credentials.
    ///
    /// # Errors
    ///
    /// [`BrokerError::ConnectFailed`] or
    /// [`BrokerError::CertificateRejected`] on a rejected attempt; the
    /// reconnect loop re-arms its timer and retries.
    async fn connect(&self, credentials: &Credentials) -> Result<(), BrokerError>;

    /// Disconnect the session.
    async fn disconnect(&self) -> Result<(), BrokerError>;

    /// Subscribe `destination` under the deterministic id `id`.
    async fn subscribe(&self, id: &str, destination: &str) -> Result<(), BrokerError>;

    /// Remove the subscription `id` for `destination`.
    async fn unsubscribe(&self, id: &str, destination: &str) -> Result<(), BrokerError>;

    /// Acknowledge one delivered message.
    async fn ack(&self, message_id: &str, subscription_id: &str) -> Result<(), BrokerError>;

    /// Send `body` to `destination`, echoing `correlation_id` as a header.
    async fn send(
        &self,
        destination: &str,
        body: &str,
        correlation_id: &str,
    ) -> Result<(), BrokerError>;

    /// Whether the session is currently connected.
    fn is_connected(&self) -> bool;
}

//! # In-Memory Broker Session
//!
//! A scripted [`BrokerSession`] for tests and in-process embedding. It
//! records every operation, can be told to fail a number of connect
//! attempts, runs the configured certificate validator against an
//! optional test certificate at connect time, and lets the test inject
//! session events (including message delivery).

use crate::domain::cert::PeerCertificate;
use crate::domain::event::MessageHeaders;
use crate::ports::broker::{BrokerError, BrokerSession, Credentials, SessionConfig, SessionEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// One recorded broker operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerOp {
    /// A successful connect.
    Connect,
    /// A disconnect.
    Disconnect,
    /// A subscribe call.
    Subscribe { id: String, destination: String },
    /// An unsubscribe call.
    Unsubscribe { id: String, destination: String },
    /// An ack call.
    Ack {
        message_id: String,
        subscription_id: String,
    },
    /// A send call.
    Send {
        destination: String,
        body: String,
        correlation_id: String,
    },
}

struct Inner {
    config: SessionConfig,
    connected: AtomicBool,
    connect_failures: AtomicUsize,
    withhold_connect_event: AtomicBool,
    peer_certificate: Mutex<Option<PeerCertificate>>,
    ops: Mutex<Vec<BrokerOp>>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// In-memory broker session; clones share state.
#[derive(Clone)]
pub struct InMemoryBroker {
    inner: Arc<Inner>,
}

impl InMemoryBroker {
    /// Create a broker and the notification channel the dispatcher
    /// consumes.
    #[must_use]
    pub fn new(config: SessionConfig) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let broker = Self {
            inner: Arc::new(Inner {
                config,
                connected: AtomicBool::new(false),
                connect_failures: AtomicUsize::new(0),
                withhold_connect_event: AtomicBool::new(false),
                peer_certificate: Mutex::new(None),
                ops: Mutex::new(Vec::new()),
                events,
            }),
        };
        (broker, receiver)
    }

    /// Make the next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.inner.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next successful connect complete without emitting the
    /// connected notification, modelling a session whose readiness
    /// signal is lost or deferred.
    pub fn withhold_connect_event(&self) {
        self.inner.withhold_connect_event.store(true, Ordering::SeqCst);
    }

    /// Set the certificate presented at connect time.
    ///
    /// When set, connect runs the configured validator against it and
    /// rejects the attempt on a failed check.
    pub fn present_certificate(&self, certificate: PeerCertificate) {
        if let Ok(mut slot) = self.inner.peer_certificate.lock() {
            *slot = Some(certificate);
        }
    }

    /// Inject a raw session event.
    pub fn emit(&self, event: SessionEvent) {
        // A closed receiver just means the dispatcher stopped.
        let _ = self.inner.events.send(event);
    }

    /// Deliver one broker message to the dispatcher.
    pub fn deliver(&self, headers: MessageHeaders, body: impl Into<String>) {
        self.emit(SessionEvent::Message {
            headers,
            body: body.into(),
        });
    }

    /// Drop the connection and notify the dispatcher.
    pub fn drop_connection(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        self.emit(SessionEvent::Disconnected);
    }

    /// Snapshot of every recorded operation, in call order.
    #[must_use]
    pub fn operations(&self) -> Vec<BrokerOp> {
        self.inner.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    /// Recorded acks as `(message_id, subscription_id)` pairs.
    #[must_use]
    pub fn acks(&self) -> Vec<(String, String)> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                BrokerOp::Ack {
                    message_id,
                    subscription_id,
                } => Some((message_id, subscription_id)),
                _ => None,
            })
            .collect()
    }

    /// Recorded sends as `(destination, body, correlation_id)` triples.
    #[must_use]
    pub fn sends(&self) -> Vec<(String, String, String)> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                BrokerOp::Send {
                    destination,
                    body,
                    correlation_id,
                } => Some((destination, body, correlation_id)),
                _ => None,
            })
            .collect()
    }

    /// Subscription ids with a live broker-level subscription.
    #[must_use]
    pub fn active_subscriptions(&self) -> Vec<String> {
        let mut active = Vec::new();
        for op in self.operations() {
            match op {
                BrokerOp::Subscribe { id, .. } => {
                    if !active.contains(&id) {
                        active.push(id);
                    }
                }
                BrokerOp::Unsubscribe { id, .. } => active.retain(|existing| *existing != id),
                _ => {}
            }
        }
        active
    }

    fn record(&self, op: BrokerOp) {
        if let Ok(mut ops) = self.inner.ops.lock() {
            ops.push(op);
        }
    }

    fn require_connected(&self) -> Result<(), BrokerError> {
        if self.inner.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }
}

#[async_trait]
impl BrokerSession for InMemoryBroker {
    async fn connect(&self, credentials: &Credentials) -> Result<(), BrokerError> {
        debug!(login = %credentials.login, "In-memory connect");
        let remaining = self.inner.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner
                .connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(BrokerError::ConnectFailed {
                reason: "scripted failure".to_string(),
            });
        }

        let certificate = self
            .inner
            .peer_certificate
            .lock()
            .ok()
            .and_then(|slot| slot.clone());
        if let Some(certificate) = certificate {
            let check = (self.inner.config.cert_validator)(&certificate, &self.inner.config.host);
            if !check.ok {
                return Err(BrokerError::CertificateRejected {
                    detail: check.detail,
                });
            }
        }

        self.inner.connected.store(true, Ordering::SeqCst);
        self.record(BrokerOp::Connect);
        if !self.inner.withhold_connect_event.swap(false, Ordering::SeqCst) {
            self.emit(SessionEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.require_connected()?;
        self.inner.connected.store(false, Ordering::SeqCst);
        self.record(BrokerOp::Disconnect);
        self.emit(SessionEvent::Disconnected);
        Ok(())
    }

    async fn subscribe(&self, id: &str, destination: &str) -> Result<(), BrokerError> {
        self.require_connected()?;
        self.record(BrokerOp::Subscribe {
            id: id.to_string(),
            destination: destination.to_string(),
        });
        Ok(())
    }

    async fn unsubscribe(&self, id: &str, destination: &str) -> Result<(), BrokerError> {
        self.require_connected()?;
        self.record(BrokerOp::Unsubscribe {
            id: id.to_string(),
            destination: destination.to_string(),
        });
        Ok(())
    }

    async fn ack(&self, message_id: &str, subscription_id: &str) -> Result<(), BrokerError> {
        self.require_connected()?;
        self.record(BrokerOp::Ack {
            message_id: message_id.to_string(),
            subscription_id: subscription_id.to_string(),
        });
        Ok(())
    }

    async fn send(
        &self,
        destination: &str,
        body: &str,
        correlation_id: &str,
    ) -> Result<(), BrokerError> {
        self.require_connected()?;
        self.record(BrokerOp::Send {
            destination: destination.to_string(),
            body: body.to_string(),
            correlation_id: correlation_id.to_string(),
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

//! # REST Collaborator Port
//!
//! The driven port for the platform's REST API. The dispatcher core only
//! needs the action listing; record read/update calls belong to
//! individual handlers and stay out of this crate.

use crate::domain::action::ActionDefinition;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the REST collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RestError {
    /// The request could not be performed.
    #[error("request failed: {reason}")]
    Transport { reason: String },

    /// The server answered with a non-success status.
    #[error("server returned status {status}")]
    Status { status: u16 },

    /// The response body could not be decoded.
    #[error("response decode failed: {reason}")]
    Decode { reason: String },
}

/// Read access to the platform's action definitions.
#[async_trait]
pub trait ActionApi: Send + Sync {
    /// List all configured action definitions (`GET /actions`).
    ///
    /// # Errors
    ///
    /// Any [`RestError`] here is fatal at startup: the catalog cannot be
    /// built without the listing.
    async fn list_actions(&self) -> Result<Vec<ActionDefinition>, RestError>;
}

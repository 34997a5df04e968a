//! # Action Catalog
//!
//! The id-to-definition mapping for configured actions, loaded once at
//! startup from the REST collaborator. Read-only after construction: an
//! action created or renamed after load will fail lookup until the process
//! is restarted.

use crate::ports::rest::{ActionApi, RestError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;

/// Errors from catalog lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The action id is not in the catalog (configuration drift).
    #[error("action {id} is not defined; was it configured after the service was started?")]
    UnknownAction { id: u64 },
}

/// One configured action definition.
///
/// `id` is a stable external identifier assigned by the broker's
/// controlling system; `name` is the human-readable display name that
/// dispatch event names are derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionDefinition {
    /// Stable external identifier.
    pub id: u64,
    /// Human-readable display name.
    pub name: String,
}

/// Immutable id-to-definition mapping for configured actions.
pub struct ActionCatalog {
    definitions: HashMap<u64, ActionDefinition>,
}

impl ActionCatalog {
    /// Build a catalog from already-fetched definitions.
    #[must_use]
    pub fn from_definitions(definitions: Vec<ActionDefinition>) -> Self {
        let definitions = definitions.into_iter().map(|d| (d.id, d)).collect();
        Self { definitions }
    }

    /// Load the catalog via the REST collaborator.
    ///
    /// Issues one listing request for all action definitions. A failure
    /// here is fatal to startup: without the catalog the dispatcher cannot
    /// name incoming events, so the error is propagated, not retried.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`RestError`] if the listing request fails.
    pub async fn load(api: &dyn ActionApi) -> Result<Self, RestError> {
        let definitions = api.list_actions().await?;
        info!(actions = definitions.len(), "Action catalog loaded");
        Ok(Self::from_definitions(definitions))
    }

    /// Get the display name of an action from its id.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownAction`] if the id is absent from
    /// the mapping. The caller must treat this as fatal for that event's
    /// processing: log and stop, never guess a name.
    pub fn name_of(&self, action_id: u64) -> Result<&str, CatalogError> {
        self.definitions
            .get(&action_id)
            .map(|d| d.name.as_str())
            .ok_or(CatalogError::UnknownAction { id: action_id })
    }

    /// Number of configured actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// True if no actions are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> ActionCatalog {
        ActionCatalog::from_definitions(vec![
            ActionDefinition {
                id: 14,
                name: "Manual Action".to_string(),
            },
            ActionDefinition {
                id: 15,
                name: "Escalate".to_string(),
            },
        ])
    }

    #[test]
    fn test_name_of_known_action() {
        let catalog = sample_catalog();
        assert_eq!(catalog.name_of(14).unwrap(), "Manual Action");
        assert_eq!(catalog.name_of(15).unwrap(), "Escalate");
    }

    #[test]
    fn test_name_of_unknown_action() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.name_of(999),
            Err(CatalogError::UnknownAction { id: 999 })
        );
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        let catalog = ActionCatalog::from_definitions(vec![
            ActionDefinition {
                id: 1,
                name: "First".to_string(),
            },
            ActionDefinition {
                id: 1,
                name: "Second".to_string(),
            },
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.name_of(1).unwrap(), "Second");
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = ActionCatalog::from_definitions(Vec::new());
        assert!(catalog.is_empty());
        assert!(catalog.name_of(1).is_err());
    }
}

//! # REST Adapter
//!
//! A reqwest-backed implementation of the [`ActionApi`] port against the
//! platform's REST API. Only the action listing lives here; record
//! read/update traffic belongs to individual handlers.

use crate::domain::action::ActionDefinition;
use crate::ports::rest::{ActionApi, RestError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Listing response shape: `{"entities": [{id, name, ...}]}`.
#[derive(Debug, Deserialize)]
struct ActionListing {
    entities: Vec<ActionDefinition>,
}

/// HTTP client for the platform's REST API.
pub struct HttpActionApi {
    client: reqwest::Client,
    base_url: String,
    basic_auth: Option<(String, String)>,
}

impl HttpActionApi {
    /// Client for `base_url` (for example
    /// `https://host/rest/orgs/201`); trailing slashes are trimmed.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            basic_auth: None,
        }
    }

    /// Authenticate requests with basic credentials.
    #[must_use]
    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }

    /// Replace the underlying HTTP client (custom TLS trust, timeouts).
    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ActionApi for HttpActionApi {
    async fn list_actions(&self) -> Result<Vec<ActionDefinition>, RestError> {
        let url = format!("{}/actions", self.base_url);
        debug!(%url, "Listing action definitions");

        let mut request = self.client.get(&url);
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await.map_err(|err| RestError::Transport {
            reason: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RestError::Status {
                status: status.as_u16(),
            });
        }

        let listing: ActionListing = response.json().await.map_err(|err| RestError::Decode {
            reason: err.to_string(),
        })?;
        Ok(listing.entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = HttpActionApi::new("https://host/rest/orgs/201/");
        assert_eq!(api.base_url, "https://host/rest/orgs/201");
    }

    #[test]
    fn test_listing_decodes_and_ignores_extra_fields() {
        let body = r#"{"entities":[
            {"id": 14, "name": "Manual Action", "enabled": true},
            {"id": 15, "name": "Escalate"}
        ]}"#;
        let listing: ActionListing = serde_json::from_str(body).unwrap();
        assert_eq!(listing.entities.len(), 2);
        assert_eq!(listing.entities[0].id, 14);
        assert_eq!(listing.entities[1].name, "Escalate");
    }
}

//! Client configuration
//!
//! A [`ClientConfig`] names the local identity, carries the access token the
//! native engine authenticates with, and passes opaque options through to
//! the [`EndpointFactory`](crate::native::EndpointFactory).
//!
//! # Examples
//!
//! ```rust
//! use conversations_core::ClientConfig;
//!
//! let config = ClientConfig::new("alice", "token-123")
//!     .with_endpoint_option("ice.transport", "relay")
//!     .with_endpoint_option("region", "eu");
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.endpoint_option("region"), Some("eu"));
//! ```
//!
//! Configurations round-trip through serde, so they can be loaded from a
//! settings file:
//!
//! ```rust
//! use conversations_core::ClientConfig;
//!
//! let json = r#"{ "identity": "bob", "access_token": "t" }"#;
//! let config: ClientConfig = serde_json::from_str(json).unwrap();
//! assert!(config.endpoint_options.is_empty());
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Configuration of one conversations client
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Identity other participants use to invite this client
    pub identity: String,

    /// Credential handed to the native engine
    pub access_token: String,

    /// Opaque options forwarded to the native endpoint factory
    #[serde(default)]
    pub endpoint_options: HashMap<String, String>,
}

impl ClientConfig {
    pub fn new(identity: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            access_token: access_token.into(),
            endpoint_options: HashMap::new(),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn with_access_token(mut self, access_token: impl Into<String>) -> Self {
        self.access_token = access_token.into();
        self
    }

    /// Set one native endpoint option, replacing any previous value
    pub fn with_endpoint_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.endpoint_options.insert(key.into(), value.into());
        self
    }

    pub fn endpoint_option(&self, key: &str) -> Option<&str> {
        self.endpoint_options.get(key).map(String::as_str)
    }

    /// Reject an empty identity or access token
    pub fn validate(&self) -> ClientResult<()> {
        if self.identity.trim().is_empty() {
            return Err(ClientError::invalid_argument("Identity must not be empty"));
        }
        if self.access_token.trim().is_empty() {
            return Err(ClientError::invalid_argument("Access token must not be empty"));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("identity", &self.identity)
            .field("access_token", &"<redacted>")
            .field("endpoint_options", &self.endpoint_options)
            .finish()
    }
}

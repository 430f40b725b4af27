//! Fluent client construction
//!
//! # Examples
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use conversations_core::{ConversationsSdk, ConversationsClientListener};
//! # async fn example(sdk: ConversationsSdk, listener: Arc<dyn ConversationsClientListener>) -> conversations_core::ClientResult<()> {
//! use conversations_core::ClientBuilder;
//!
//! let client = ClientBuilder::new()
//!     .identity("alice")
//!     .access_token("token-123")
//!     .option("region", "eu")
//!     .listener(listener)
//!     .build(&sdk)?;
//!
//! client.listen()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::client::config::ClientConfig;
use crate::client::manager::ConversationsClient;
use crate::error::ClientResult;
use crate::events::ConversationsClientListener;
use crate::media::AudioRouter;
use crate::sdk::ConversationsSdk;

/// Builder for [`ConversationsClient`]
///
/// Unset fields default to an empty configuration, no listener and an
/// in-memory audio router; `build` validates the configuration.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    listener: Option<Arc<dyn ConversationsClientListener>>,
    audio_router: Option<Arc<dyn AudioRouter>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.config.identity = identity.into();
        self
    }

    pub fn access_token(mut self, access_token: impl Into<String>) -> Self {
        self.config.access_token = access_token.into();
        self
    }

    /// Set a native endpoint option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.endpoint_options.insert(key.into(), value.into());
        self
    }

    pub fn listener(mut self, listener: Arc<dyn ConversationsClientListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Route audio output through a platform router
    pub fn audio_router(mut self, router: Arc<dyn AudioRouter>) -> Self {
        self.audio_router = Some(router);
        self
    }

    /// The configuration built so far
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Create the client on `sdk`
    pub fn build(self, sdk: &ConversationsSdk) -> ClientResult<Arc<ConversationsClient>> {
        sdk.spawn_client(self.config, self.listener, self.audio_router)
    }
}

//! SDK entry point and process-wide client registry
//!
//! [`ConversationsSdk`] binds an [`EndpointFactory`] to a tokio runtime and
//! creates clients from it. Every client it creates is tracked by id in a
//! [`ClientRegistry`] until it is disposed, which makes it possible to find a
//! client again from its id and to detect clients that were never disposed.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use conversations_core::{ConversationsClientListener, EndpointFactory};
//! # async fn example(factory: Arc<dyn EndpointFactory>, listener: Arc<dyn ConversationsClientListener>) -> conversations_core::ClientResult<()> {
//! use conversations_core::{ClientConfig, ConversationsSdk};
//!
//! let sdk = ConversationsSdk::initialize(factory)?;
//! let client = sdk.create_client(ClientConfig::new("alice", "token-123"), listener)?;
//! client.listen()?;
//!
//! assert!(sdk.find_client(&client.id()).is_some());
//! sdk.shutdown();
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::runtime::Handle;

use crate::client::config::ClientConfig;
use crate::client::manager::{ClientId, ConversationsClient, DisposalState};
use crate::error::{ClientError, ClientResult};
use crate::events::ConversationsClientListener;
use crate::media::AudioRouter;
use crate::native::EndpointFactory;

/// Clients created by one SDK instance, held weakly
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, Weak<ConversationsClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client: &Arc<ConversationsClient>) {
        self.clients.insert(client.id(), Arc::downgrade(client));
    }

    /// Look up a live client; entries whose client is gone are dropped
    pub fn find(&self, id: &ClientId) -> Option<Arc<ConversationsClient>> {
        let client = self.clients.get(id).and_then(|entry| entry.value().upgrade());
        if client.is_none() {
            self.clients.remove(id);
        }
        client
    }

    pub fn remove(&self, id: &ClientId) -> bool {
        self.clients.remove(id).is_some()
    }

    pub fn live_clients(&self) -> Vec<Arc<ConversationsClient>> {
        self.clients
            .iter()
            .filter_map(|entry| entry.value().upgrade())
            .collect()
    }

    /// Clients that are still alive and have not been disposed
    pub fn undisposed(&self) -> Vec<Arc<ConversationsClient>> {
        self.live_clients()
            .into_iter()
            .filter(|client| client.disposal_state() != DisposalState::Disposed)
            .collect()
    }

    /// Drop entries whose client no longer exists; returns how many
    pub fn prune(&self) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, client| client.strong_count() > 0);
        before - self.clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Entry point for creating conversations clients
#[derive(Clone)]
pub struct ConversationsSdk {
    factory: Arc<dyn EndpointFactory>,
    registry: Arc<ClientRegistry>,
    runtime: Handle,
}

impl ConversationsSdk {
    /// Initialize on the current tokio runtime
    ///
    /// Client callbacks run on this runtime. Fails with
    /// [`ClientError::NoCallbackContext`] outside a runtime.
    pub fn initialize(factory: Arc<dyn EndpointFactory>) -> ClientResult<Self> {
        let runtime = Handle::try_current().map_err(|e| ClientError::NoCallbackContext {
            message: format!("ConversationsSdk must be initialized inside a tokio runtime: {}", e),
        })?;
        Ok(Self::with_runtime(factory, runtime))
    }

    /// Initialize with an explicit runtime for client callbacks
    pub fn with_runtime(factory: Arc<dyn EndpointFactory>, runtime: Handle) -> Self {
        tracing::info!("Initialized conversations SDK v{}", crate::VERSION);
        Self {
            factory,
            registry: Arc::new(ClientRegistry::new()),
            runtime,
        }
    }

    /// Create a client
    ///
    /// Fails if the configuration is invalid or the native endpoint cannot be
    /// created.
    pub fn create_client(
        &self,
        config: ClientConfig,
        listener: Arc<dyn ConversationsClientListener>,
    ) -> ClientResult<Arc<ConversationsClient>> {
        self.spawn_client(config, Some(listener), None)
    }

    pub(crate) fn spawn_client(
        &self,
        config: ClientConfig,
        listener: Option<Arc<dyn ConversationsClientListener>>,
        audio_router: Option<Arc<dyn AudioRouter>>,
    ) -> ClientResult<Arc<ConversationsClient>> {
        let client = ConversationsClient::create(
            config,
            listener,
            audio_router,
            self.factory.as_ref(),
            &self.runtime,
            Arc::downgrade(&self.registry),
        )?;
        self.registry.register(&client);
        Ok(client)
    }

    pub fn find_client(&self, id: &ClientId) -> Option<Arc<ConversationsClient>> {
        self.registry.find(id)
    }

    /// Clients that were created and not yet disposed
    pub fn undisposed_clients(&self) -> Vec<Arc<ConversationsClient>> {
        self.registry.undisposed()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Dispose every client still alive; returns how many were disposed
    pub fn shutdown(&self) -> usize {
        let clients = self.registry.undisposed();
        for client in &clients {
            client.dispose();
        }
        self.registry.prune();
        tracing::info!("Conversations SDK shut down ({} clients disposed)", clients.len());
        clients.len()
    }
}

impl fmt::Debug for ConversationsSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationsSdk")
            .field("clients", &self.registry.len())
            .finish()
    }
}

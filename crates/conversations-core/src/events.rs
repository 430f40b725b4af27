//! Client notifications
//!
//! Applications observe a client in two ways:
//!
//! - **Listener**: a single [`ConversationsClientListener`] slot per client,
//!   called on the client's callback queue. This is the primary interface:
//!   incoming invites are only handed out here.
//! - **Event stream**: [`ClientEvent`]s broadcast to any number of
//!   subscribers via `ConversationsClient::subscribe`, useful for logging and
//!   monitoring.
//!
//! # Examples
//!
//! ## Listener
//!
//! ```rust
//! use conversations_core::{ClientError, ConversationsClient, ConversationsClientListener, IncomingInvite};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct AutoReject;
//!
//! #[async_trait]
//! impl ConversationsClientListener for AutoReject {
//!     async fn on_start_listening_for_invites(&self, client: Arc<ConversationsClient>) {
//!         println!("{} is reachable", client.identity());
//!     }
//!
//!     async fn on_failed_to_start_listening(&self, _client: Arc<ConversationsClient>, error: ClientError) {
//!         eprintln!("registration failed: {}", error);
//!     }
//!
//!     async fn on_incoming_invite(&self, _client: Arc<ConversationsClient>, invite: Arc<IncomingInvite>) {
//!         let _ = invite.reject();
//!     }
//! }
//! ```
//!
//! ## Event stream
//!
//! ```rust,no_run
//! # async fn example(client: std::sync::Arc<conversations_core::ConversationsClient>) {
//! use conversations_core::ClientEvent;
//!
//! let mut events = client.subscribe();
//! while let Ok(event) = events.recv().await {
//!     if let ClientEvent::IncomingInvite { conversation_id, participants } = event {
//!         println!("invite {} from {:?}", conversation_id, participants);
//!     }
//! }
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::manager::ConversationsClient;
use crate::conversation::{ConversationDirection, ConversationId};
use crate::error::ClientError;
use crate::invite::{IncomingInvite, InviteStatus};

/// Event broadcast by a client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The client is registered and can receive invites
    StartedListening,
    /// The client stopped receiving invites
    StoppedListening,
    /// Registration failed
    ListeningFailed { error: ClientError },
    /// A remote invite arrived
    IncomingInvite {
        conversation_id: ConversationId,
        participants: Vec<String>,
    },
    /// An invite reached a terminal status
    InviteResolved {
        conversation_id: ConversationId,
        direction: ConversationDirection,
        status: InviteStatus,
    },
    /// A conversation ended and was released
    ConversationEnded { conversation_id: ConversationId },
    /// The client released its native endpoint
    Disposed,
}

/// Application listener for a client
///
/// Every method runs on the client's callback queue, one at a time.
/// `on_failed_to_start_listening` and `on_incoming_invite` are required; the
/// others default to doing nothing.
#[async_trait]
pub trait ConversationsClientListener: Send + Sync {
    /// Registration completed, or the client reconnected
    async fn on_start_listening_for_invites(&self, _client: Arc<ConversationsClient>) {}

    /// Unregistration completed, or connectivity was lost
    async fn on_stop_listening_for_invites(&self, _client: Arc<ConversationsClient>) {}

    /// Registration failed
    async fn on_failed_to_start_listening(&self, client: Arc<ConversationsClient>, error: ClientError);

    /// A remote party invited this client
    ///
    /// The invite stays pending until it is accepted, rejected, or cancelled
    /// by the remote party.
    async fn on_incoming_invite(&self, client: Arc<ConversationsClient>, invite: Arc<IncomingInvite>);

    /// A pending incoming invite was withdrawn by the remote party
    async fn on_incoming_invite_cancelled(
        &self,
        _client: Arc<ConversationsClient>,
        _invite: Arc<IncomingInvite>,
    ) {
    }
}

//! # conversations-core
//!
//! Client, conversation and invite lifecycle on top of a native real-time
//! conferencing engine.
//!
//! The engine (media transport, codecs, signaling) is reached only through
//! the [`CoreEndpoint`] trait and reports back with [`EndpointEvent`]s. This
//! crate turns those events into a consistent application-facing model:
//!
//! - a [`ConversationsClient`] that registers for invites, sends invites and
//!   is disposed exactly once;
//! - [`Conversation`]s tracked from creation until they end;
//! - [`OutgoingInvite`]s and [`IncomingInvite`]s that resolve to exactly one
//!   terminal status;
//! - listener and callback notifications delivered one at a time on a serial
//!   [`CallbackQueue`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use conversations_core::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct App;
//!
//! #[async_trait]
//! impl ConversationsClientListener for App {
//!     async fn on_failed_to_start_listening(&self, _client: Arc<ConversationsClient>, error: ClientError) {
//!         eprintln!("cannot listen: {}", error);
//!     }
//!
//!     async fn on_incoming_invite(&self, _client: Arc<ConversationsClient>, invite: Arc<IncomingInvite>) {
//!         let _ = invite.accept(LocalMedia::new(), Arc::new(Joined));
//!     }
//! }
//!
//! struct Joined;
//!
//! #[async_trait]
//! impl ConversationCallback for Joined {
//!     async fn on_conversation(&self, outcome: ConversationOutcome) {
//!         println!("invite resolved: {:?}", outcome);
//!     }
//! }
//!
//! # async fn run(factory: Arc<dyn EndpointFactory>) -> ClientResult<()> {
//! logging::init_logging(logging::LogLevel::Info);
//!
//! let sdk = ConversationsSdk::initialize(factory)?;
//! let client = ClientBuilder::new()
//!     .identity("alice")
//!     .access_token("token-123")
//!     .listener(Arc::new(App))
//!     .build(&sdk)?;
//! client.listen()?;
//!
//! let invite = client
//!     .send_conversation_invite(
//!         InviteRequest::new()
//!             .participant("bob")
//!             .local_media(LocalMedia::new())
//!             .callback(Arc::new(Joined)),
//!     )
//!     .await?;
//!
//! if let Some(invite) = invite {
//!     println!("invite {:?}", invite.status());
//! }
//!
//! client.dispose();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod conversation;
pub mod error;
pub mod events;
pub mod invite;
pub mod logging;
pub mod media;
pub mod native;
pub mod sdk;

#[cfg(test)]
mod test_support;

pub use client::{
    CallbackQueue, ClientBuilder, ClientConfig, ClientId, ClientStats, ConversationsClient,
    Delivery, DisposalState, InviteLedger, PendingInvite, RegistrationState, SessionRegistry,
};
pub use conversation::{
    Conversation, ConversationDirection, ConversationId, ConversationListener, ConversationStatus,
    SessionState,
};
pub use error::{ClientError, ClientResult};
pub use events::{ClientEvent, ConversationsClientListener};
pub use invite::{
    ConversationCallback, ConversationOutcome, IncomingInvite, InviteRequest, InviteStatus,
    OutgoingInvite,
};
pub use media::{AudioOutput, AudioRouter, InMemoryAudioRouter, LocalMedia};
pub use native::{
    CoreEndpoint, CoreError, EndpointEvent, EndpointFactory, EndpointObserver, EndpointState,
    NativeHandle,
};
pub use sdk::{ClientRegistry, ConversationsSdk};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

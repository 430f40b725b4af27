//! Conversations client
//!
//! - [`manager`]: the client itself and its public operations
//! - [`config`] / [`builder`]: configuration and fluent construction
//! - [`registry`]: live conversations
//! - [`ledger`]: pending invites
//! - [`dispatch`]: the serial callback queue
//!
//! Native events are handled in a private `observer` module.

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod ledger;
pub mod manager;
mod observer;
pub mod registry;

pub use builder::ClientBuilder;
pub use config::ClientConfig;
pub use dispatch::{CallbackQueue, Delivery};
pub use ledger::{InviteLedger, PendingInvite};
pub use manager::{ClientId, ClientStats, ConversationsClient, DisposalState, RegistrationState};
pub use registry::SessionRegistry;

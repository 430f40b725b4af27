//! Conversation invites
//!
//! An invite tracks a proposal to start or join a conversation until it
//! reaches a terminal [`InviteStatus`]:
//!
//! ```text
//! Pending ──► Accepted | Rejected | Cancelled | Failed
//! ```
//!
//! Terminal statuses are final. [`OutgoingInvite`]s are returned by
//! `ConversationsClient::send_conversation_invite`; [`IncomingInvite`]s are
//! handed to the client listener when a remote party invites this client.
//! Either way the application learns how the invite resolved through its
//! [`ConversationCallback`].
//!
//! # Examples
//!
//! ```rust
//! use conversations_core::{ConversationCallback, ConversationOutcome, InviteRequest, LocalMedia};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct OnConversation;
//!
//! #[async_trait]
//! impl ConversationCallback for OnConversation {
//!     async fn on_conversation(&self, outcome: ConversationOutcome) {
//!         match outcome {
//!             ConversationOutcome::Connected(conversation) => {
//!                 println!("connected to {:?}", conversation.participants());
//!             }
//!             other => println!("invite did not connect: {:?}", other.error()),
//!         }
//!     }
//! }
//!
//! let request = InviteRequest::new()
//!     .participant("alice")
//!     .participant("bob")
//!     .local_media(LocalMedia::new())
//!     .callback(Arc::new(OnConversation));
//! assert!(request.validate().is_ok());
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::client::dispatch::CallbackQueue;
use crate::client::manager::ConversationsClient;
use crate::conversation::{Conversation, ConversationId};
use crate::error::{ClientError, ClientResult};
use crate::media::LocalMedia;

/// Lifecycle status of an invite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InviteStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Failed,
}

impl InviteStatus {
    /// Whether the status is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, InviteStatus::Pending)
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InviteStatus::Pending => "Pending",
            InviteStatus::Accepted => "Accepted",
            InviteStatus::Rejected => "Rejected",
            InviteStatus::Cancelled => "Cancelled",
            InviteStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Invite status that only moves forward
///
/// The first terminal status wins; later transitions report it unchanged.
#[derive(Debug)]
pub(crate) struct StatusCell(Mutex<InviteStatus>);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(Mutex::new(InviteStatus::Pending))
    }

    pub(crate) fn get(&self) -> InviteStatus {
        *self.0.lock()
    }

    /// Move to `to` unless already terminal; returns the effective status
    pub(crate) fn transition(&self, to: InviteStatus) -> InviteStatus {
        let mut status = self.0.lock();
        if !status.is_terminal() {
            *status = to;
        }
        *status
    }
}

/// How an invite resolved
#[derive(Debug, Clone)]
pub enum ConversationOutcome {
    /// The conversation connected and media started
    Connected(Arc<Conversation>),
    /// The conversation could not be established
    ///
    /// `conversation` is `None` when no native session could be created.
    Failed {
        conversation: Option<Arc<Conversation>>,
        error: ClientError,
    },
    /// The invite was cancelled before the conversation connected
    Cancelled(Arc<Conversation>),
    /// The conversation ended without error before it connected
    Ended(Arc<Conversation>),
}

impl ConversationOutcome {
    pub fn conversation(&self) -> Option<&Arc<Conversation>> {
        match self {
            ConversationOutcome::Connected(conversation)
            | ConversationOutcome::Cancelled(conversation)
            | ConversationOutcome::Ended(conversation) => Some(conversation),
            ConversationOutcome::Failed { conversation, .. } => conversation.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&ClientError> {
        match self {
            ConversationOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConversationOutcome::Connected(_))
    }
}

/// Receives the outcome of an invite
///
/// Called exactly once per invite that reaches the native engine, on the
/// client's callback queue.
#[async_trait]
pub trait ConversationCallback: Send + Sync {
    async fn on_conversation(&self, outcome: ConversationOutcome);
}

/// Parameters of an outgoing invite
#[derive(Default)]
pub struct InviteRequest {
    participants: BTreeSet<String>,
    local_media: Option<LocalMedia>,
    callback: Option<Arc<dyn ConversationCallback>>,
}

pub(crate) struct InviteParts {
    pub(crate) participants: Vec<String>,
    pub(crate) local_media: LocalMedia,
    pub(crate) callback: Arc<dyn ConversationCallback>,
}

impl InviteRequest {
    /// Empty request; add participants, local media and a callback before sending
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one participant identity
    pub fn participant(mut self, identity: impl Into<String>) -> Self {
        self.participants.insert(identity.into());
        self
    }

    /// Add several participant identities
    pub fn participants<I, S>(mut self, identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.participants.extend(identities.into_iter().map(Into::into));
        self
    }

    /// Media to publish once the conversation starts
    pub fn local_media(mut self, local_media: LocalMedia) -> Self {
        self.local_media = Some(local_media);
        self
    }

    /// Receives the single outcome of the invite
    pub fn callback(mut self, callback: Arc<dyn ConversationCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Check the request without sending it
    ///
    /// Checks, in order: at least one participant, local media present,
    /// callback present, no empty participant identity.
    pub fn validate(&self) -> ClientResult<()> {
        if self.participants.is_empty() {
            return Err(ClientError::invalid_argument("Invite at least one participant"));
        }
        if self.local_media.is_none() {
            return Err(ClientError::MissingLocalMedia);
        }
        if self.callback.is_none() {
            return Err(ClientError::MissingCallback);
        }
        if self.participants.iter().any(|p| p.is_empty()) {
            return Err(ClientError::invalid_argument("Participant cannot be an empty string"));
        }
        Ok(())
    }

    pub(crate) fn into_parts(self) -> ClientResult<InviteParts> {
        self.validate()?;
        match (self.local_media, self.callback) {
            (Some(local_media), Some(callback)) => Ok(InviteParts {
                participants: self.participants.into_iter().collect(),
                local_media,
                callback,
            }),
            (None, _) => Err(ClientError::MissingLocalMedia),
            (_, None) => Err(ClientError::MissingCallback),
        }
    }
}

impl fmt::Debug for InviteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InviteRequest")
            .field("participants", &self.participants)
            .field("local_media", &self.local_media)
            .field("callback", &self.callback.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

/// Invite sent by this client
pub struct OutgoingInvite {
    conversation: Arc<Conversation>,
    participants: BTreeSet<String>,
    status: StatusCell,
    callback: Arc<dyn ConversationCallback>,
    queue: CallbackQueue,
    client: Weak<ConversationsClient>,
    created_at: DateTime<Utc>,
}

impl OutgoingInvite {
    pub(crate) fn new(
        conversation: Arc<Conversation>,
        participants: Vec<String>,
        callback: Arc<dyn ConversationCallback>,
        queue: CallbackQueue,
        client: Weak<ConversationsClient>,
    ) -> Self {
        Self {
            conversation,
            participants: participants.into_iter().collect(),
            status: StatusCell::new(),
            callback,
            queue,
            client,
            created_at: Utc::now(),
        }
    }

    /// Current status
    ///
    /// Starts `Pending` and moves once to `Accepted`, `Failed` or
    /// `Cancelled`.
    pub fn status(&self) -> InviteStatus {
        self.status.get()
    }

    /// Identities that were invited
    pub fn participants(&self) -> &BTreeSet<String> {
        &self.participants
    }

    /// Id of the conversation this invite opens
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation.id()
    }

    /// When the invite was sent
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Cancel the invite
    ///
    /// The invite becomes `Cancelled` immediately. The callback later receives
    /// [`ConversationOutcome::Cancelled`] once the native session has ended.
    pub fn cancel(&self) -> ClientResult<()> {
        let client = self.client.upgrade().ok_or(ClientError::AlreadyDisposed)?;
        client.cancel_outgoing(self)
    }

    pub(crate) fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    pub(crate) fn callback(&self) -> Arc<dyn ConversationCallback> {
        self.callback.clone()
    }

    pub(crate) fn queue(&self) -> &CallbackQueue {
        &self.queue
    }

    pub(crate) fn transition(&self, to: InviteStatus) -> InviteStatus {
        self.status.transition(to)
    }
}

impl fmt::Debug for OutgoingInvite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingInvite")
            .field("conversation_id", &self.conversation_id())
            .field("participants", &self.participants)
            .field("status", &self.status())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Invite received from a remote party
pub struct IncomingInvite {
    conversation: Arc<Conversation>,
    participants: BTreeSet<String>,
    status: StatusCell,
    callback: Mutex<Option<Arc<dyn ConversationCallback>>>,
    queue: CallbackQueue,
    client: Weak<ConversationsClient>,
    created_at: DateTime<Utc>,
}

impl IncomingInvite {
    /// Fails with `InvalidArgument` when there is no inviting participant
    pub(crate) fn new(
        conversation: Arc<Conversation>,
        participants: Vec<String>,
        queue: CallbackQueue,
        client: Weak<ConversationsClient>,
    ) -> ClientResult<Self> {
        if participants.is_empty() {
            return Err(ClientError::invalid_argument(
                "Incoming invite must have at least one participant",
            ));
        }
        Ok(Self {
            conversation,
            participants: participants.into_iter().collect(),
            status: StatusCell::new(),
            callback: Mutex::new(None),
            queue,
            client,
            created_at: Utc::now(),
        })
    }

    /// Current status
    ///
    /// `Pending` until accepted and started, rejected, or cancelled by the
    /// remote side.
    pub fn status(&self) -> InviteStatus {
        self.status.get()
    }

    /// Identities that sent the invite
    pub fn participants(&self) -> &BTreeSet<String> {
        &self.participants
    }

    /// Id of the conversation that accepting would join
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation.id()
    }

    /// When the native engine reported the invite
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Accept the invite and start media
    ///
    /// `callback` receives the conversation once it has connected.
    pub fn accept(
        &self,
        local_media: LocalMedia,
        callback: Arc<dyn ConversationCallback>,
    ) -> ClientResult<()> {
        let client = self.client.upgrade().ok_or(ClientError::AlreadyDisposed)?;
        client.accept_invite(self, local_media, callback)
    }

    /// Reject the invite
    ///
    /// No callback is ever invoked for a rejected invite.
    pub fn reject(&self) -> ClientResult<()> {
        let client = self.client.upgrade().ok_or(ClientError::AlreadyDisposed)?;
        client.reject_invite(self)
    }

    /// Leave the invite unanswered
    pub fn ignore(&self) {
        tracing::info!("Ignoring incoming invite for conversation {}", self.conversation_id());
    }

    pub(crate) fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    pub(crate) fn set_callback(&self, callback: Arc<dyn ConversationCallback>) {
        *self.callback.lock() = Some(callback);
    }

    pub(crate) fn callback(&self) -> Option<Arc<dyn ConversationCallback>> {
        self.callback.lock().clone()
    }

    pub(crate) fn queue(&self) -> &CallbackQueue {
        &self.queue
    }

    pub(crate) fn transition(&self, to: InviteStatus) -> InviteStatus {
        self.status.transition(to)
    }
}

impl fmt::Debug for IncomingInvite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingInvite")
            .field("conversation_id", &self.conversation_id())
            .field("participants", &self.participants)
            .field("status", &self.status())
            .field("created_at", &self.created_at)
            .finish()
    }
}

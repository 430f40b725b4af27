//! Conversations (media sessions)
//!
//! A [`Conversation`] wraps one native session. It is created by the client,
//! either when the application sends an invite or when a remote invite
//! arrives, and is owned by the client's session registry until the session
//! ends, the invite is rejected, or the client is disposed.
//!
//! Applications observe a conversation through a [`ConversationListener`]
//! once its invite has been resolved.
//!
//! # Examples
//!
//! ```rust
//! use conversations_core::{ClientError, Conversation, ConversationListener};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl ConversationListener for Printer {
//!     async fn on_participant_connected(&self, conversation: Arc<Conversation>, participant: String) {
//!         println!("{} joined {}", participant, conversation.id());
//!     }
//!
//!     async fn on_conversation_ended(&self, conversation: Arc<Conversation>, error: Option<ClientError>) {
//!         println!("{} ended: {:?}", conversation.id(), error);
//!     }
//! }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::media::LocalMedia;
use crate::native::{CoreEndpoint, CoreError, EndpointGate, NativeHandle};

/// Unique identifier of a conversation
pub type ConversationId = Uuid;

/// Who initiated the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationDirection {
    /// Created from a remote invite
    Incoming,
    /// Created by this client
    Outgoing,
}

/// Connection status of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversationStatus {
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Unknown,
}

/// Media state of the underlying native session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Initialized,
    Starting,
    InProgress,
    Stopping,
    Stopped,
    StartFailed,
    StopFailed,
}

/// Application listener for a single conversation
///
/// Only `on_conversation_ended` is required. Participant events are delivered
/// once the conversation's invite has been resolved; before that they only
/// update [`Conversation::participants`].
#[async_trait]
pub trait ConversationListener: Send + Sync {
    /// A participant joined
    async fn on_participant_connected(&self, _conversation: Arc<Conversation>, _participant: String) {}

    /// A participant could not be connected
    async fn on_failed_to_connect_participant(
        &self,
        _conversation: Arc<Conversation>,
        _participant: String,
        _error: ClientError,
    ) {
    }

    /// A participant left
    async fn on_participant_disconnected(&self, _conversation: Arc<Conversation>, _participant: String) {}

    /// The conversation ended; `error` is set when it ended abnormally
    ///
    /// Delivered at most once per conversation.
    async fn on_conversation_ended(&self, conversation: Arc<Conversation>, error: Option<ClientError>);
}

/// A live media session with one or more remote participants
pub struct Conversation {
    id: ConversationId,
    direction: ConversationDirection,
    handle: NativeHandle,
    endpoint: Arc<dyn CoreEndpoint>,
    gate: Arc<EndpointGate>,
    status: Mutex<ConversationStatus>,
    session_state: Mutex<SessionState>,
    participants: RwLock<BTreeSet<String>>,
    local_media: Mutex<Option<LocalMedia>>,
    listener: RwLock<Option<Arc<dyn ConversationListener>>>,
    disposed: AtomicBool,
    created_at: DateTime<Utc>,
}

impl Conversation {
    /// Wrap a native session and bind its events to a fresh conversation id
    ///
    /// Fails if the native engine refuses the observer hookup; the session
    /// handle is left untouched in that case. The caller holds a `gate` guard.
    pub(crate) fn attach<I, S>(
        endpoint: Arc<dyn CoreEndpoint>,
        gate: Arc<EndpointGate>,
        handle: NativeHandle,
        direction: ConversationDirection,
        participants: I,
    ) -> Result<Arc<Self>, CoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = Uuid::new_v4();
        endpoint.attach_session_observer(handle, id)?;

        Ok(Arc::new(Self {
            id,
            direction,
            handle,
            endpoint,
            gate,
            status: Mutex::new(ConversationStatus::Connecting),
            session_state: Mutex::new(SessionState::Initialized),
            participants: RwLock::new(participants.into_iter().map(Into::into).collect()),
            local_media: Mutex::new(None),
            listener: RwLock::new(None),
            disposed: AtomicBool::new(false),
            created_at: Utc::now(),
        }))
    }

    /// Identifier the native engine reports this conversation's events under
    pub fn id(&self) -> ConversationId {
        self.id
    }

    /// Whether this client sent or received the invite
    pub fn direction(&self) -> ConversationDirection {
        self.direction
    }

    /// Last connection status reported by the native engine
    pub fn status(&self) -> ConversationStatus {
        *self.status.lock()
    }

    /// Media session state; `InProgress` once media flows
    pub fn session_state(&self) -> SessionState {
        *self.session_state.lock()
    }

    /// Identities currently in the conversation
    pub fn participants(&self) -> BTreeSet<String> {
        self.participants.read().clone()
    }

    /// Local media the session was started with, if it has been started
    pub fn local_media(&self) -> Option<LocalMedia> {
        self.local_media.lock().clone()
    }

    /// When the conversation object was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the conversation can still carry media
    pub fn is_active(&self) -> bool {
        !self.is_disposed()
            && !matches!(
                self.status(),
                ConversationStatus::Disconnected | ConversationStatus::Failed
            )
    }

    /// Replace the conversation listener
    pub fn set_listener(&self, listener: Option<Arc<dyn ConversationListener>>) {
        *self.listener.write() = listener;
    }

    /// Current listener, if any
    ///
    /// Notifications read the listener when they are delivered, so a listener
    /// installed from the invite callback sees every later event.
    pub fn listener(&self) -> Option<Arc<dyn ConversationListener>> {
        self.listener.read().clone()
    }

    /// Ask the native engine to end the conversation
    ///
    /// The end is reported through `on_conversation_ended`.
    pub fn disconnect(&self) -> ClientResult<()> {
        let Some(_native) = self.gate.enter() else {
            return Err(ClientError::AlreadyDisposed);
        };
        if self.is_disposed() {
            return Err(ClientError::AlreadyDisposed);
        }
        tracing::info!("Disconnecting conversation {}", self.id);
        self.endpoint.stop_session(self.handle);
        Ok(())
    }

    pub(crate) fn native_handle(&self) -> NativeHandle {
        self.handle
    }

    pub(crate) fn set_status(&self, status: ConversationStatus) {
        *self.status.lock() = status;
    }

    pub(crate) fn set_session_state(&self, state: SessionState) {
        *self.session_state.lock() = state;
    }

    /// Returns `false` if the participant was already present
    pub(crate) fn add_participant(&self, participant: &str) -> bool {
        self.participants.write().insert(participant.to_string())
    }

    /// Returns `false` if the participant was not present
    pub(crate) fn remove_participant(&self, participant: &str) -> bool {
        self.participants.write().remove(participant)
    }

    /// Whether the native session has both connected and started media
    pub(crate) fn is_started(&self) -> bool {
        self.status() == ConversationStatus::Connected
            && self.session_state() == SessionState::InProgress
    }

    pub(crate) fn start(&self, local_media: LocalMedia) {
        let Some(_native) = self.gate.enter() else {
            tracing::debug!("Not starting conversation {}: endpoint released", self.id);
            return;
        };
        self.endpoint.start_session(self.handle, &local_media);
        *self.local_media.lock() = Some(local_media);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Release the native session; later calls do nothing
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(_native) = self.gate.enter() else {
            tracing::debug!("Native session {} went with its endpoint", self.handle);
            return;
        };
        tracing::debug!("Releasing native session {} of conversation {}", self.handle, self.id);
        self.endpoint.free_session(self.handle);
    }
}

impl fmt::Debug for Conversation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversation")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("handle", &self.handle)
            .field("status", &self.status())
            .field("session_state", &self.session_state())
            .field("participants", &self.participants())
            .field("disposed", &self.is_disposed())
            .field("created_at", &self.created_at)
            .finish()
    }
}

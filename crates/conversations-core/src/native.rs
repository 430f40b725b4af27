//! Native engine boundary
//!
//! The media/signaling engine lives outside this crate. This module defines
//! the narrow contract between the two sides:
//!
//! - **Outbound**: [`CoreEndpoint`] is the opaque endpoint resource a client
//!   owns. The client issues listen/unlisten/reject/release and session calls
//!   on it and never inspects its internals.
//! - **Inbound**: the engine reports back by posting one-shot
//!   [`EndpointEvent`] messages through the [`EndpointObserver`] it received
//!   when the endpoint was created.
//! - **Construction**: an [`EndpointFactory`] builds one endpoint per client.
//!
//! # Threading contract
//!
//! Events must be posted from engine-owned threads, never re-entrantly from
//! inside a [`CoreEndpoint`] call and never from inside an async task: the
//! client may block the posting thread until the application has handled an
//! invite resolution.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::config::ClientConfig;
use crate::client::manager::ConversationsClient;
use crate::conversation::{ConversationId, ConversationStatus, SessionState};
use crate::media::LocalMedia;

/// Opaque handle to a native resource
///
/// A raw value of zero means "no resource"; [`NativeHandle::new`] refuses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// Wrap a raw native handle, returning `None` for the null handle
    pub fn new(raw: u64) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Raw handle value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Error reported by the native engine as a (code, message) pair
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct CoreError {
    /// Engine-defined error code
    pub code: i32,
    /// Human readable description
    pub message: String,
}

impl CoreError {
    /// Create a new native error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Registration state reported by the native endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointState {
    /// Endpoint created, not yet registering
    Initialized,
    /// Registration in progress
    Registering,
    /// Registered and able to receive invites
    Registered,
    /// Unregistration in progress
    Unregistering,
    /// Not registered
    Unregistered,
    /// Registration was refused
    RegistrationFailed,
    /// Connectivity was lost and the engine is re-registering
    Reconnecting,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointState::Initialized => "Initialized",
            EndpointState::Registering => "Registering",
            EndpointState::Registered => "Registered",
            EndpointState::Unregistering => "Unregistering",
            EndpointState::Unregistered => "Unregistered",
            EndpointState::RegistrationFailed => "RegistrationFailed",
            EndpointState::Reconnecting => "Reconnecting",
        };
        f.write_str(name)
    }
}

/// Notification posted by the native engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointEvent {
    /// A `listen()` request finished
    RegistrationComplete(Option<CoreError>),
    /// An `unlisten()` request finished
    UnregistrationComplete(Option<CoreError>),
    /// The endpoint's registration state changed
    StateChanged(EndpointState),
    /// A remote party invited this endpoint into a session
    IncomingSession {
        /// Native session handle, not yet bound to a conversation
        handle: NativeHandle,
        /// Identities of the inviting participants
        participants: Vec<String>,
    },
    /// A session's connection status changed
    SessionStatusChanged {
        conversation: ConversationId,
        status: ConversationStatus,
    },
    /// A session's media state changed
    SessionStateChanged {
        conversation: ConversationId,
        state: SessionState,
    },
    /// A participant joined a session
    ParticipantConnected {
        conversation: ConversationId,
        participant: String,
    },
    /// A participant left a session
    ParticipantDisconnected {
        conversation: ConversationId,
        participant: String,
    },
    /// A participant could not be connected
    ParticipantConnectFailed {
        conversation: ConversationId,
        participant: String,
        error: CoreError,
    },
    /// A session ended, with the error that ended it if any
    SessionEnded {
        conversation: ConversationId,
        error: Option<CoreError>,
    },
}

/// Outbound calls on a native endpoint
///
/// Calls are requests; their outcome (where there is one) arrives later as an
/// [`EndpointEvent`]. Implementations must not post events re-entrantly from
/// inside these calls.
pub trait CoreEndpoint: Send + Sync {
    /// Start registering for incoming invites
    fn listen(&self);

    /// Stop listening for incoming invites
    fn unlisten(&self);

    /// Reject an incoming session
    fn reject(&self, session: NativeHandle);

    /// Release the endpoint. Called exactly once per endpoint.
    fn free(&self);

    /// Create an outgoing session; `None` when the engine cannot create one
    /// (for example while reconnecting)
    fn create_outgoing_session(
        &self,
        participants: &[String],
        local_media: &LocalMedia,
    ) -> Option<NativeHandle>;

    /// Bind a native session to a conversation id so that its events are
    /// reported against that id
    fn attach_session_observer(
        &self,
        session: NativeHandle,
        conversation: ConversationId,
    ) -> Result<(), CoreError>;

    /// Start media on a session
    fn start_session(&self, session: NativeHandle, local_media: &LocalMedia);

    /// Stop a session; the engine answers with `SessionEnded`
    fn stop_session(&self, session: NativeHandle);

    /// Release a session handle. Called at most once per session.
    fn free_session(&self, session: NativeHandle);
}

/// Builds native endpoints for new clients
pub trait EndpointFactory: Send + Sync {
    /// Create the endpoint for a client
    ///
    /// `observer` is the only way the endpoint may report back to the client.
    fn create_endpoint(
        &self,
        config: &ClientConfig,
        observer: EndpointObserver,
    ) -> Result<Arc<dyn CoreEndpoint>, CoreError>;
}

/// Orders native calls before the endpoint release
///
/// Every call into a [`CoreEndpoint`] other than `free` runs while holding an
/// [`EndpointGate::enter`] guard. [`EndpointGate::close`] waits for calls in
/// flight and refuses new ones, so `free` is the last call the endpoint sees.
#[derive(Debug, Default)]
pub(crate) struct EndpointGate {
    released: RwLock<bool>,
}

impl EndpointGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Shared access for native calls; `None` once the endpoint is released
    ///
    /// Re-entrant: a thread holding a guard may enter again while `close` is
    /// waiting.
    pub(crate) fn enter(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let released = self.released.read_recursive();
        if *released {
            None
        } else {
            Some(released)
        }
    }

    /// Wait for native calls in flight, then refuse new ones
    ///
    /// Returns `false` if the gate was already closed. Must not be called
    /// while holding a guard from [`EndpointGate::enter`].
    pub(crate) fn close(&self) -> bool {
        let mut released = self.released.write();
        !std::mem::replace(&mut *released, true)
    }

    pub(crate) fn is_closed(&self) -> bool {
        *self.released.read_recursive()
    }
}

/// Channel through which the native engine reports to one client
///
/// Holds a weak reference: events posted after the client is gone are
/// dropped.
#[derive(Clone)]
pub struct EndpointObserver {
    client: Weak<ConversationsClient>,
}

impl EndpointObserver {
    pub(crate) fn new(client: Weak<ConversationsClient>) -> Self {
        Self { client }
    }

    /// Deliver an event to the owning client
    ///
    /// Runs the client's handling on the calling thread and may block it
    /// while an invite resolution is handed to the application.
    pub fn notify(&self, event: EndpointEvent) {
        match self.client.upgrade() {
            Some(client) => client.handle_endpoint_event(event),
            None => tracing::debug!(?event, "Client dropped; discarding native event"),
        }
    }

    /// Whether the owning client is still alive
    pub fn is_attached(&self) -> bool {
        self.client.strong_count() > 0
    }
}

impl fmt::Debug for EndpointObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointObserver")
            .field("attached", &self.is_attached())
            .finish()
    }
}

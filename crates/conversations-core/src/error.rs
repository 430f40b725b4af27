//! Error types for conversations-core
//!
//! Every fallible public operation returns [`ClientResult`]. Precondition
//! violations (bad arguments, operating on a disposed client) are returned
//! synchronously; failures reported by the native engine travel to the
//! application asynchronously as [`ClientError::Native`] inside listener and
//! callback notifications.
//!
//! # Examples
//!
//! ```rust
//! use conversations_core::{ClientError, error::codes};
//!
//! let error = ClientError::client_disconnected("reconnecting");
//! assert_eq!(error.code(), codes::CLIENT_DISCONNECTED);
//! assert!(error.to_string().contains("reconnecting"));
//! ```

use thiserror::Error;

use crate::conversation::ConversationId;
use crate::invite::InviteStatus;
use crate::native::CoreError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Numeric error codes surfaced alongside [`ClientError`]
///
/// Native errors keep the code reported by the engine; the constants below
/// cover errors raised by this layer.
pub mod codes {
    /// An argument failed validation
    pub const INVALID_ARGUMENT: i32 = 100;
    /// The client was disposed before the operation
    pub const ALREADY_DISPOSED: i32 = 101;
    /// Local media was not supplied
    pub const MISSING_LOCAL_MEDIA: i32 = 102;
    /// A conversation callback was not supplied
    pub const MISSING_CALLBACK: i32 = 103;
    /// The client is disconnected or reconnecting
    pub const CLIENT_DISCONNECTED: i32 = 104;
    /// The conversation already has a pending invite
    pub const INVITE_ALREADY_PENDING: i32 = 105;
    /// The invite has already reached a terminal status
    pub const INVITE_NOT_PENDING: i32 = 106;
    /// No execution context is available for callbacks
    pub const NO_CALLBACK_CONTEXT: i32 = 107;
    /// The client is in a state that does not allow the operation
    pub const INVALID_STATE: i32 = 108;
    /// Unexpected internal failure
    pub const INTERNAL: i32 = 199;
}

/// Errors produced by the conversations client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The client has been disposed
    #[error("The conversations client has been disposed. This operation is no longer valid")]
    AlreadyDisposed,

    /// An argument failed validation
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Local media is required but was not supplied
    #[error("Local media is required to create a conversation")]
    MissingLocalMedia,

    /// A conversation callback is required but was not supplied
    #[error("A conversation callback is required to retrieve the conversation")]
    MissingCallback,

    /// The client is disconnected from the native endpoint or reconnecting
    #[error("Client disconnected: {message}")]
    ClientDisconnected { message: String },

    /// The operation is not valid in the client's current state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The conversation already has a pending invite
    #[error("An invite is already pending for conversation {conversation_id}")]
    InviteAlreadyPending { conversation_id: ConversationId },

    /// The invite is no longer pending
    #[error("Invite for conversation {conversation_id} is no longer pending (status: {status})")]
    InviteNotPending {
        conversation_id: ConversationId,
        status: InviteStatus,
    },

    /// No tokio runtime is available to run application callbacks on
    #[error("No callback context available: {message}")]
    NoCallbackContext { message: String },

    /// Error reported by the native engine
    #[error("Native error: {0}")]
    Native(#[from] CoreError),

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a client disconnected error
    pub fn client_disconnected(message: impl Into<String>) -> Self {
        Self::ClientDisconnected {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Numeric code for this error
    ///
    /// Native errors keep the code reported by the engine.
    pub fn code(&self) -> i32 {
        match self {
            ClientError::AlreadyDisposed => codes::ALREADY_DISPOSED,
            ClientError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            ClientError::MissingLocalMedia => codes::MISSING_LOCAL_MEDIA,
            ClientError::MissingCallback => codes::MISSING_CALLBACK,
            ClientError::ClientDisconnected { .. } => codes::CLIENT_DISCONNECTED,
            ClientError::InvalidState { .. } => codes::INVALID_STATE,
            ClientError::InviteAlreadyPending { .. } => codes::INVITE_ALREADY_PENDING,
            ClientError::InviteNotPending { .. } => codes::INVITE_NOT_PENDING,
            ClientError::NoCallbackContext { .. } => codes::NO_CALLBACK_CONTEXT,
            ClientError::Native(error) => error.code,
            ClientError::Internal { .. } => codes::INTERNAL,
        }
    }

    /// Whether this error originated in the native engine
    pub fn is_native(&self) -> bool {
        matches!(self, ClientError::Native(_))
    }
}

//! Conversations client
//!
//! [`ConversationsClient`] owns one native endpoint and everything created
//! through it: the conversations in its [`SessionRegistry`], the pending
//! invites in its [`InviteLedger`], and the [`CallbackQueue`] on which every
//! application notification runs.
//!
//! # Lifecycle
//!
//! ```text
//!            listen()            ack ok
//! Unregistered ──► Registering ──────────► Registered ◄──┐
//!      ▲               │ ack error             │         │ reconnected
//!      └───────────────┘                       ▼         │
//!      ▲                               Reconnecting ─────┘
//!      │ ack            unlisten()            │
//!      └──── Unregistering ◄──────────────────┘ (or from Registered)
//! ```
//!
//! Disposal runs `NotDisposed → Disposing → Disposed` exactly once. A client
//! that is still registered unregisters first and releases its endpoint when
//! the unregistration is acknowledged.
//!
//! Clients are created through [`ConversationsSdk`](crate::sdk::ConversationsSdk)
//! and are always held in an `Arc`.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::client::config::ClientConfig;
use crate::client::dispatch::CallbackQueue;
use crate::client::ledger::{InviteLedger, PendingInvite};
use crate::client::registry::SessionRegistry;
use crate::conversation::{Conversation, ConversationDirection, ConversationId};
use crate::error::{ClientError, ClientResult};
use crate::events::{ClientEvent, ConversationsClientListener};
use crate::invite::{
    ConversationCallback, ConversationOutcome, IncomingInvite, InviteParts, InviteRequest,
    InviteStatus, OutgoingInvite,
};
use crate::media::{AudioOutput, AudioRouter, InMemoryAudioRouter, LocalMedia};
use crate::native::{CoreEndpoint, EndpointFactory, EndpointGate, EndpointObserver, EndpointState};
use crate::sdk::ClientRegistry;

/// Unique identifier of a client
pub type ClientId = Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

const RECONNECTING_MESSAGE: &str =
    "Cannot create conversation while reconnecting. Wait for conversations client to reconnect and try again.";

/// Disposal progress of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisposalState {
    NotDisposed,
    /// Waiting for the endpoint to unregister before release
    Disposing,
    Disposed,
}

/// Invite registration state of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    Unregistered,
    Registering,
    Registered,
    Unregistering,
    /// Registered, but connectivity was lost and the engine is recovering
    Reconnecting,
}

/// Snapshot of a client's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientStats {
    pub client_id: ClientId,
    pub identity: String,
    pub registration: RegistrationState,
    pub disposal: DisposalState,
    pub endpoint_state: Option<EndpointState>,
    pub conversations: usize,
    pub active_conversations: usize,
    pub pending_outgoing_invites: usize,
    pub pending_incoming_invites: usize,
    pub created_at: DateTime<Utc>,
}

/// Result of the native half of sending an invite
enum OpenedInvite {
    Sent(Arc<OutgoingInvite>),
    /// No conversation was created; the callback gets this error
    Refused(ClientError),
}

pub(crate) struct ClientState {
    pub(crate) disposal: DisposalState,
    pub(crate) registration: RegistrationState,
    pub(crate) endpoint_state: Option<EndpointState>,
    pub(crate) endpoint: Option<Arc<dyn CoreEndpoint>>,
}

impl ClientState {
    /// The endpoint, unless the client is disposing or disposed
    pub(crate) fn live_endpoint(&self) -> ClientResult<Arc<dyn CoreEndpoint>> {
        if self.disposal != DisposalState::NotDisposed {
            return Err(ClientError::AlreadyDisposed);
        }
        self.endpoint.clone().ok_or(ClientError::AlreadyDisposed)
    }
}

/// Client for sending and receiving conversation invites
pub struct ConversationsClient {
    pub(crate) id: ClientId,
    pub(crate) config: ClientConfig,
    pub(crate) self_ref: Weak<ConversationsClient>,
    pub(crate) state: Mutex<ClientState>,
    pub(crate) gate: Arc<EndpointGate>,
    listener: RwLock<Option<Arc<dyn ConversationsClientListener>>>,
    pub(crate) sessions: SessionRegistry,
    pub(crate) invites: InviteLedger,
    pub(crate) callbacks: CallbackQueue,
    audio_router: Arc<dyn AudioRouter>,
    event_tx: broadcast::Sender<ClientEvent>,
    client_registry: Weak<ClientRegistry>,
    created_at: DateTime<Utc>,
}

impl ConversationsClient {
    /// Build a client and its native endpoint
    pub(crate) fn create(
        config: ClientConfig,
        listener: Option<Arc<dyn ConversationsClientListener>>,
        audio_router: Option<Arc<dyn AudioRouter>>,
        factory: &dyn EndpointFactory,
        runtime: &Handle,
        client_registry: Weak<ClientRegistry>,
    ) -> ClientResult<Arc<Self>> {
        config.validate()?;

        let id = Uuid::new_v4();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let audio_router = audio_router
            .unwrap_or_else(|| Arc::new(InMemoryAudioRouter::new()) as Arc<dyn AudioRouter>);

        let client = Arc::new_cyclic(|self_ref| Self {
            id,
            config,
            self_ref: self_ref.clone(),
            state: Mutex::new(ClientState {
                disposal: DisposalState::NotDisposed,
                registration: RegistrationState::Unregistered,
                endpoint_state: None,
                endpoint: None,
            }),
            gate: Arc::new(EndpointGate::new()),
            listener: RwLock::new(listener),
            sessions: SessionRegistry::new(),
            invites: InviteLedger::new(),
            callbacks: CallbackQueue::with_handle(runtime, format!("client-{}", id)),
            audio_router,
            event_tx,
            client_registry,
            created_at: Utc::now(),
        });

        let observer = EndpointObserver::new(Arc::downgrade(&client));
        match factory.create_endpoint(&client.config, observer) {
            Ok(endpoint) => {
                client.state.lock().endpoint = Some(endpoint);
                tracing::info!("Created conversations client {} for {}", id, client.config.identity);
                Ok(client)
            }
            Err(error) => {
                client.state.lock().disposal = DisposalState::Disposed;
                tracing::error!("Failed to create native endpoint for {}: {}", client.config.identity, error);
                Err(error.into())
            }
        }
    }

    /// Unique id of this client, usable with
    /// [`ConversationsSdk::find_client`](crate::sdk::ConversationsSdk::find_client)
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Identity this client is reachable under
    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    /// Configuration the client was created with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// When the client was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Replace the client listener; `None` silences notifications
    pub fn set_listener(&self, listener: Option<Arc<dyn ConversationsClientListener>>) {
        *self.listener.write() = listener;
    }

    /// Current client listener, if any
    pub fn listener(&self) -> Option<Arc<dyn ConversationsClientListener>> {
        self.listener.read().clone()
    }

    /// Subscribe to the client's event stream
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.event_tx.subscribe()
    }

    /// Invite registration state
    pub fn registration_state(&self) -> RegistrationState {
        self.state.lock().registration
    }

    /// Disposal progress; anything but `NotDisposed` refuses new operations
    pub fn disposal_state(&self) -> DisposalState {
        self.state.lock().disposal
    }

    /// Last registration state reported by the native endpoint
    pub fn endpoint_state(&self) -> Option<EndpointState> {
        self.state.lock().endpoint_state
    }

    /// Whether the client can currently receive invites
    pub fn is_listening(&self) -> bool {
        matches!(
            self.registration_state(),
            RegistrationState::Registered | RegistrationState::Reconnecting
        )
    }

    /// Look up a tracked conversation
    pub fn conversation(&self, id: &ConversationId) -> Option<Arc<Conversation>> {
        self.sessions.get(id)
    }

    /// Every conversation the client is tracking, pending or connected
    pub fn conversations(&self) -> Vec<Arc<Conversation>> {
        self.sessions.snapshot()
    }

    /// Number of tracked conversations that have not ended
    pub fn active_conversation_count(&self) -> usize {
        self.sessions.count(|conversation| conversation.is_active())
    }

    /// Snapshot of the client's state and counters
    ///
    /// ```rust,no_run
    /// # fn example(client: &conversations_core::ConversationsClient) {
    /// let stats = client.client_stats();
    /// println!(
    ///     "{}: {} conversations, {} invites pending",
    ///     stats.identity,
    ///     stats.conversations,
    ///     stats.pending_outgoing_invites + stats.pending_incoming_invites
    /// );
    /// # }
    /// ```
    pub fn client_stats(&self) -> ClientStats {
        let (registration, disposal, endpoint_state) = {
            let state = self.state.lock();
            (state.registration, state.disposal, state.endpoint_state)
        };
        let (pending_outgoing_invites, pending_incoming_invites) = self.invites.counts();

        ClientStats {
            client_id: self.id,
            identity: self.config.identity.clone(),
            registration,
            disposal,
            endpoint_state,
            conversations: self.sessions.len(),
            active_conversations: self.active_conversation_count(),
            pending_outgoing_invites,
            pending_incoming_invites,
            created_at: self.created_at,
        }
    }

    /// Select where call audio is played
    pub fn set_audio_output(&self, output: AudioOutput) -> ClientResult<()> {
        if self.disposal_state() == DisposalState::Disposed {
            return Err(ClientError::AlreadyDisposed);
        }
        tracing::debug!("Routing audio to {}", output);
        self.audio_router
            .set_speakerphone_on(output == AudioOutput::Speakerphone);
        Ok(())
    }

    /// Where call audio is currently played
    pub fn audio_output(&self) -> AudioOutput {
        if self.audio_router.is_speakerphone_on() {
            AudioOutput::Speakerphone
        } else {
            AudioOutput::Headset
        }
    }

    /// Start listening for incoming invites
    ///
    /// The outcome is reported through `on_start_listening_for_invites` or
    /// `on_failed_to_start_listening`. Does nothing if the client is already
    /// registering or registered.
    pub fn listen(&self) -> ClientResult<()> {
        let Some(_native) = self.gate.enter() else {
            return Err(ClientError::AlreadyDisposed);
        };
        let endpoint = {
            let mut state = self.state.lock();
            let endpoint = state.live_endpoint()?;
            match state.registration {
                RegistrationState::Registering
                | RegistrationState::Registered
                | RegistrationState::Reconnecting => {
                    tracing::debug!("Client {} is already listening ({:?})", self.id, state.registration);
                    return Ok(());
                }
                RegistrationState::Unregistering => {
                    return Err(ClientError::invalid_state(
                        "Cannot listen while unregistration is in progress",
                    ));
                }
                RegistrationState::Unregistered => {}
            }
            state.registration = RegistrationState::Registering;
            endpoint
        };

        tracing::info!("Client {} registering for invites", self.id);
        endpoint.listen();
        Ok(())
    }

    /// Stop listening for incoming invites
    ///
    /// Completion is reported through `on_stop_listening_for_invites`. Does
    /// nothing unless the client is listening.
    pub fn unlisten(&self) -> ClientResult<()> {
        let Some(_native) = self.gate.enter() else {
            return Err(ClientError::AlreadyDisposed);
        };
        let endpoint = {
            let mut state = self.state.lock();
            if state.disposal == DisposalState::Disposed {
                return Err(ClientError::AlreadyDisposed);
            }
            if !matches!(
                state.registration,
                RegistrationState::Registered | RegistrationState::Reconnecting
            ) {
                tracing::debug!("Client {} is not listening ({:?})", self.id, state.registration);
                return Ok(());
            }
            let Some(endpoint) = state.endpoint.clone() else {
                return Err(ClientError::AlreadyDisposed);
            };
            state.registration = RegistrationState::Unregistering;
            endpoint
        };

        tracing::info!("Client {} unregistering", self.id);
        endpoint.unlisten();
        Ok(())
    }

    /// Release the client and everything it owns
    ///
    /// Safe to call from any thread and more than once. A registered client
    /// unregisters first; its endpoint is released once the unregistration is
    /// acknowledged. Pending invites are cancelled without notification.
    pub fn dispose(&self) {
        enum Next {
            Unlisten(Arc<dyn CoreEndpoint>),
            AwaitUnregistration,
            Release,
        }

        let next = {
            let mut state = self.state.lock();
            if state.disposal != DisposalState::NotDisposed {
                tracing::debug!("Client {} already {:?}", self.id, state.disposal);
                return;
            }
            state.disposal = DisposalState::Disposing;
            match (state.registration, state.endpoint.clone()) {
                (RegistrationState::Registered | RegistrationState::Reconnecting, Some(endpoint)) => {
                    state.registration = RegistrationState::Unregistering;
                    Next::Unlisten(endpoint)
                }
                (RegistrationState::Unregistering, Some(_)) => Next::AwaitUnregistration,
                _ => Next::Release,
            }
        };

        tracing::info!("Disposing conversations client {}", self.id);
        match next {
            Next::Unlisten(endpoint) => {
                if let Some(_native) = self.gate.enter() {
                    endpoint.unlisten();
                }
            }
            Next::AwaitUnregistration => {
                tracing::debug!("Client {} waiting for unregistration before release", self.id)
            }
            Next::Release => self.release(),
        }
    }

    /// Tear down conversations and invites, then free the endpoint
    ///
    /// Runs at most once; the endpoint is taken out of its slot first.
    pub(crate) fn release(&self) {
        let endpoint = {
            let mut state = self.state.lock();
            match state.endpoint.take() {
                Some(endpoint) => endpoint,
                None => return,
            }
        };

        let (invites, conversations) = {
            let mut ledger = self.invites.lock();
            let invites = ledger.drain();
            for invite in &invites {
                match invite {
                    PendingInvite::Outgoing(invite) => {
                        invite.transition(InviteStatus::Cancelled);
                    }
                    PendingInvite::Incoming(invite) => {
                        invite.transition(InviteStatus::Cancelled);
                    }
                }
            }
            let conversations = self.sessions.drain();
            for conversation in &conversations {
                conversation.dispose();
            }
            (invites.len(), conversations.len())
        };

        // Native calls still in flight finish before the endpoint goes away
        self.gate.close();
        {
            let mut state = self.state.lock();
            state.disposal = DisposalState::Disposed;
            state.registration = RegistrationState::Unregistered;
        }

        endpoint.free();
        tracing::info!(
            "Released conversations client {} ({} invites cancelled, {} conversations closed)",
            self.id,
            invites,
            conversations
        );

        self.emit(ClientEvent::Disposed);
        if let Some(registry) = self.client_registry.upgrade() {
            registry.remove(&self.id);
        }
    }

    /// Invite participants into a new conversation
    ///
    /// Invalid requests fail synchronously. If the native engine cannot
    /// create a session (typically while reconnecting) the request's callback
    /// is invoked right away with [`ClientError::ClientDisconnected`] and
    /// `Ok(None)` is returned. Otherwise the pending invite is returned and
    /// its callback runs once the invite resolves.
    pub async fn send_conversation_invite(
        &self,
        request: InviteRequest,
    ) -> ClientResult<Option<Arc<OutgoingInvite>>> {
        let InviteParts {
            participants,
            local_media,
            callback,
        } = request.into_parts()?;

        match self.open_outgoing(participants, local_media, callback.clone())? {
            OpenedInvite::Sent(invite) => Ok(Some(invite)),
            OpenedInvite::Refused(error) => {
                callback
                    .on_conversation(ConversationOutcome::Failed {
                        conversation: None,
                        error,
                    })
                    .await;
                Ok(None)
            }
        }
    }

    /// Create, register and start the outgoing session
    ///
    /// Runs under the endpoint gate, so a concurrent release waits for the
    /// cleanup of a refused registration before freeing the endpoint.
    fn open_outgoing(
        &self,
        participants: Vec<String>,
        local_media: LocalMedia,
        callback: Arc<dyn ConversationCallback>,
    ) -> ClientResult<OpenedInvite> {
        let Some(_native) = self.gate.enter() else {
            return Err(ClientError::AlreadyDisposed);
        };
        let endpoint = self.state.lock().live_endpoint()?;

        let Some(handle) = endpoint.create_outgoing_session(&participants, &local_media) else {
            tracing::warn!("Native engine could not create a session for {:?}", participants);
            return Ok(OpenedInvite::Refused(ClientError::client_disconnected(
                RECONNECTING_MESSAGE,
            )));
        };

        let conversation = match Conversation::attach(
            endpoint.clone(),
            self.gate.clone(),
            handle,
            ConversationDirection::Outgoing,
            participants.iter().cloned(),
        ) {
            Ok(conversation) => conversation,
            Err(error) => {
                tracing::warn!("Failed to observe outgoing session {}: {}", handle, error);
                endpoint.free_session(handle);
                return Ok(OpenedInvite::Refused(error.into()));
            }
        };

        let invite = Arc::new(OutgoingInvite::new(
            conversation.clone(),
            participants,
            callback,
            self.callbacks.clone(),
            self.self_ref.clone(),
        ));

        {
            let mut ledger = self.invites.lock();
            let registered = if self.disposal_state() == DisposalState::NotDisposed {
                ledger.register_outgoing(invite.clone())
            } else {
                Err(ClientError::AlreadyDisposed)
            };
            if let Err(error) = registered {
                drop(ledger);
                conversation.dispose();
                return Err(error);
            }
            self.sessions.add(conversation.clone());
        }

        conversation.start(local_media);
        tracing::info!(
            "Sent invite for conversation {} to {:?}",
            conversation.id(),
            invite.participants()
        );
        Ok(OpenedInvite::Sent(invite))
    }

    pub(crate) fn accept_invite(
        &self,
        invite: &IncomingInvite,
        local_media: LocalMedia,
        callback: Arc<dyn ConversationCallback>,
    ) -> ClientResult<()> {
        let Some(_native) = self.gate.enter() else {
            return Err(ClientError::AlreadyDisposed);
        };
        self.state.lock().live_endpoint()?;
        let id = invite.conversation_id();

        {
            let ledger = self.invites.lock();
            if ledger.resolve_incoming(&id).is_none() {
                return Err(ClientError::InviteNotPending {
                    conversation_id: id,
                    status: invite.status(),
                });
            }
            invite.set_callback(callback);
        }

        tracing::info!("Accepting invite for conversation {}", id);
        invite.conversation().start(local_media);
        Ok(())
    }

    pub(crate) fn reject_invite(&self, invite: &IncomingInvite) -> ClientResult<()> {
        let Some(_native) = self.gate.enter() else {
            return Err(ClientError::AlreadyDisposed);
        };
        let endpoint = self.state.lock().live_endpoint()?;
        let id = invite.conversation_id();

        let conversation = {
            let mut ledger = self.invites.lock();
            if ledger.resolve_incoming(&id).is_none() {
                return Err(ClientError::InviteNotPending {
                    conversation_id: id,
                    status: invite.status(),
                });
            }
            endpoint.reject(invite.conversation().native_handle());
            ledger.terminate_incoming(&id, InviteStatus::Rejected);
            self.sessions.remove(&id)
        };

        if let Some(conversation) = conversation {
            conversation.dispose();
        }
        tracing::info!("Rejected invite for conversation {}", id);
        self.emit(ClientEvent::InviteResolved {
            conversation_id: id,
            direction: ConversationDirection::Incoming,
            status: InviteStatus::Rejected,
        });
        Ok(())
    }

    pub(crate) fn cancel_outgoing(&self, invite: &OutgoingInvite) -> ClientResult<()> {
        let Some(_native) = self.gate.enter() else {
            return Err(ClientError::AlreadyDisposed);
        };
        self.state.lock().live_endpoint()?;
        let id = invite.conversation_id();

        {
            let ledger = self.invites.lock();
            if ledger.resolve_outgoing(&id).is_none() || invite.status() != InviteStatus::Pending {
                return Err(ClientError::InviteNotPending {
                    conversation_id: id,
                    status: invite.status(),
                });
            }
            invite.transition(InviteStatus::Cancelled);
        }

        tracing::info!("Cancelled invite for conversation {}", id);
        invite.conversation().disconnect()
    }

    pub(crate) fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run a client listener method on the callback queue
    ///
    /// The listener is read when the job runs, so a listener replaced in the
    /// meantime is not called.
    pub(crate) fn notify_listener<F, Fut>(&self, f: F)
    where
        F: FnOnce(Arc<dyn ConversationsClientListener>, Arc<ConversationsClient>) -> Fut
            + Send
            + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let client = self.self_ref.clone();
        self.callbacks.post(async move {
            let Some(client) = client.upgrade() else {
                return;
            };
            let Some(listener) = client.listener() else {
                return;
            };
            f(listener, client).await;
        });
    }
}

impl Drop for ConversationsClient {
    fn drop(&mut self) {
        let disposal = self.state.lock().disposal;
        if disposal != DisposalState::Disposed {
            tracing::warn!(
                "Conversations client {} dropped without dispose(); releasing native endpoint",
                self.id
            );
            self.release();
        }
    }
}

impl fmt::Debug for ConversationsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ConversationsClient")
            .field("id", &self.id)
            .field("identity", &self.config.identity)
            .field("registration", &state.registration)
            .field("disposal", &state.disposal)
            .field("conversations", &self.sessions.len())
            .field("endpoint_released", &self.gate.is_closed())
            .finish()
    }
}

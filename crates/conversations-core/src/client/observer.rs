//! Native event handling
//!
//! Everything the native engine reports arrives here, on the engine's own
//! thread, through [`EndpointObserver::notify`](crate::native::EndpointObserver::notify).
//! Handlers update the client, registry and ledger, then marshal application
//! notifications onto the client's callback queue. The only blocking step is
//! the hand-off of a connected conversation to its invite callback.
//!
//! Conversation listeners are read when a queued notification runs, not when
//! the native event arrives. A listener installed from the invite callback
//! therefore receives every event reported after the conversation connected.

use std::future::Future;
use std::sync::Arc;

use crate::client::ledger::PendingInvite;
use crate::client::manager::{ConversationsClient, DisposalState, RegistrationState};
use crate::conversation::{
    Conversation, ConversationDirection, ConversationId, ConversationListener, ConversationStatus,
    SessionState,
};
use crate::error::ClientError;
use crate::events::ClientEvent;
use crate::invite::{
    ConversationCallback, ConversationOutcome, IncomingInvite, InviteStatus, OutgoingInvite,
};
use crate::native::{CoreError, EndpointEvent, EndpointState, NativeHandle};

/// Invite found pending when a session ended
enum EndedInvite {
    Outgoing(Arc<OutgoingInvite>, InviteStatus),
    Accepted(Arc<IncomingInvite>, InviteStatus),
    Unanswered(Arc<IncomingInvite>),
}

fn ended_outcome(
    conversation: Arc<Conversation>,
    status: InviteStatus,
    error: Option<ClientError>,
) -> ConversationOutcome {
    match (status, error) {
        (InviteStatus::Cancelled, _) => ConversationOutcome::Cancelled(conversation),
        (_, Some(error)) => ConversationOutcome::Failed {
            conversation: Some(conversation),
            error,
        },
        (_, None) => ConversationOutcome::Ended(conversation),
    }
}

impl ConversationsClient {
    pub(crate) fn handle_endpoint_event(&self, event: EndpointEvent) {
        tracing::debug!("Client {} native event: {:?}", self.id, event);

        if self.disposal_state() == DisposalState::Disposed {
            tracing::warn!("Ignoring native event for disposed client {}", self.id);
            return;
        }

        match event {
            EndpointEvent::RegistrationComplete(error) => self.on_registration_complete(error),
            EndpointEvent::UnregistrationComplete(error) => self.on_unregistration_complete(error),
            EndpointEvent::StateChanged(state) => self.on_endpoint_state_changed(state),
            EndpointEvent::IncomingSession {
                handle,
                participants,
            } => self.on_incoming_session(handle, participants),
            EndpointEvent::SessionStatusChanged {
                conversation,
                status,
            } => self.on_session_status_changed(conversation, status),
            EndpointEvent::SessionStateChanged {
                conversation,
                state,
            } => self.on_session_state_changed(conversation, state),
            EndpointEvent::ParticipantConnected {
                conversation,
                participant,
            } => self.on_participant_connected(conversation, participant),
            EndpointEvent::ParticipantDisconnected {
                conversation,
                participant,
            } => self.on_participant_disconnected(conversation, participant),
            EndpointEvent::ParticipantConnectFailed {
                conversation,
                participant,
                error,
            } => self.on_participant_connect_failed(conversation, participant, error),
            EndpointEvent::SessionEnded {
                conversation,
                error,
            } => self.on_session_ended(conversation, error),
        }
    }

    fn on_registration_complete(&self, error: Option<CoreError>) {
        {
            let mut state = self.state.lock();
            state.registration = match error {
                None => RegistrationState::Registered,
                Some(_) => RegistrationState::Unregistered,
            };
        }

        match error {
            None => {
                tracing::info!("Client {} is listening for invites", self.id);
                self.notify_started_listening();
            }
            Some(error) => {
                tracing::warn!("Client {} failed to start listening: {}", self.id, error);
                let error = ClientError::Native(error);
                self.emit(ClientEvent::ListeningFailed {
                    error: error.clone(),
                });
                self.notify_listener(move |listener, client| async move {
                    listener.on_failed_to_start_listening(client, error).await
                });
            }
        }
    }

    fn on_unregistration_complete(&self, error: Option<CoreError>) {
        let disposing = {
            let mut state = self.state.lock();
            state.registration = RegistrationState::Unregistered;
            state.disposal == DisposalState::Disposing
        };

        if let Some(error) = error {
            tracing::warn!("Client {} unregistered with error: {}", self.id, error);
        }
        if disposing {
            self.release();
        }

        tracing::info!("Client {} stopped listening for invites", self.id);
        self.notify_stopped_listening();
    }

    /// Raise listening edges around reconnection
    fn on_endpoint_state_changed(&self, new_state: EndpointState) {
        let previous = {
            let mut state = self.state.lock();
            let previous = state.endpoint_state.replace(new_state);
            match (new_state, state.registration) {
                (EndpointState::Reconnecting, RegistrationState::Registered) => {
                    state.registration = RegistrationState::Reconnecting;
                }
                (EndpointState::Registered, RegistrationState::Reconnecting) => {
                    state.registration = RegistrationState::Registered;
                }
                _ => {}
            }
            previous
        };

        let was_reconnecting = previous == Some(EndpointState::Reconnecting);
        if was_reconnecting && new_state == EndpointState::Registered {
            tracing::info!("Client {} reconnected", self.id);
            self.notify_started_listening();
        } else if !was_reconnecting && new_state == EndpointState::Reconnecting {
            tracing::info!("Client {} lost connectivity; reconnecting", self.id);
            self.notify_stopped_listening();
        }
    }

    fn notify_started_listening(&self) {
        self.emit(ClientEvent::StartedListening);
        self.notify_listener(|listener, client| async move {
            listener.on_start_listening_for_invites(client).await
        });
    }

    fn notify_stopped_listening(&self) {
        self.emit(ClientEvent::StoppedListening);
        self.notify_listener(|listener, client| async move {
            listener.on_stop_listening_for_invites(client).await
        });
    }

    fn on_incoming_session(&self, handle: NativeHandle, participants: Vec<String>) {
        let Some(_native) = self.gate.enter() else {
            tracing::warn!("Ignoring incoming session {}: endpoint released", handle);
            return;
        };
        if let Some(existing) = self.sessions.find_by_native_handle(handle) {
            tracing::warn!(
                "Ignoring duplicate incoming session {} for conversation {}",
                handle,
                existing.id()
            );
            return;
        }
        let endpoint = {
            let state = self.state.lock();
            if state.disposal != DisposalState::NotDisposed {
                None
            } else {
                state.endpoint.clone()
            }
        };
        let Some(endpoint) = endpoint else {
            tracing::warn!("Ignoring incoming session {} on disposing client {}", handle, self.id);
            return;
        };

        let conversation = match Conversation::attach(
            endpoint.clone(),
            self.gate.clone(),
            handle,
            ConversationDirection::Incoming,
            participants.iter().cloned(),
        ) {
            Ok(conversation) => conversation,
            Err(error) => {
                tracing::error!("Dropping incoming session {}: cannot observe session: {}", handle, error);
                endpoint.reject(handle);
                return;
            }
        };

        let invite = match IncomingInvite::new(
            conversation.clone(),
            participants.clone(),
            self.callbacks.clone(),
            self.self_ref.clone(),
        ) {
            Ok(invite) => Arc::new(invite),
            Err(error) => {
                tracing::error!("Dropping incoming session {}: {}", handle, error);
                endpoint.reject(handle);
                conversation.dispose();
                return;
            }
        };

        {
            let mut ledger = self.invites.lock();
            let registered = if self.disposal_state() == DisposalState::NotDisposed {
                ledger.register_incoming(invite.clone())
            } else {
                Err(ClientError::AlreadyDisposed)
            };
            if let Err(error) = registered {
                drop(ledger);
                tracing::error!("Dropping incoming session {}: {}", handle, error);
                endpoint.reject(handle);
                conversation.dispose();
                return;
            }
            self.sessions.add(conversation.clone());
        }

        tracing::info!(
            "Incoming invite for conversation {} from {:?}",
            conversation.id(),
            participants
        );
        self.emit(ClientEvent::IncomingInvite {
            conversation_id: conversation.id(),
            participants,
        });
        self.notify_listener(move |listener, client| async move {
            listener.on_incoming_invite(client, invite).await
        });
    }

    fn on_session_status_changed(&self, id: ConversationId, status: ConversationStatus) {
        let Some(conversation) = self.sessions.get(&id) else {
            tracing::warn!("Status {:?} for unknown conversation {}", status, id);
            return;
        };
        conversation.set_status(status);
        if conversation.is_started() {
            self.on_session_started(conversation);
        }
    }

    fn on_session_state_changed(&self, id: ConversationId, state: SessionState) {
        let Some(conversation) = self.sessions.get(&id) else {
            tracing::warn!("Session state {:?} for unknown conversation {}", state, id);
            return;
        };
        conversation.set_session_state(state);
        if conversation.is_started() {
            self.on_session_started(conversation);
        }
    }

    /// Resolve a pending invite as accepted and hand the conversation over
    ///
    /// Blocks the native thread until the invite callback has returned. The
    /// hand-off is queued while the ledger is held, so notifications for the
    /// conversation raised by other native threads queue behind it.
    fn on_session_started(&self, conversation: Arc<Conversation>) {
        let id = conversation.id();

        let delivery = {
            let mut ledger = self.invites.lock();
            let (direction, callback, queue) = match ledger.pending_for(&id) {
                None => return,
                Some(PendingInvite::Outgoing(invite)) => {
                    if invite.status() == InviteStatus::Cancelled {
                        tracing::debug!("Conversation {} started after cancel; awaiting end", id);
                        return;
                    }
                    ledger.terminate_outgoing(&id, InviteStatus::Accepted);
                    let callback: Option<Arc<dyn ConversationCallback>> = Some(invite.callback());
                    (ConversationDirection::Outgoing, callback, invite.queue().clone())
                }
                Some(PendingInvite::Incoming(invite)) => {
                    ledger.terminate_incoming(&id, InviteStatus::Accepted);
                    (ConversationDirection::Incoming, invite.callback(), invite.queue().clone())
                }
            };

            conversation.set_listener(None);
            tracing::info!("Conversation {} connected", id);
            self.emit(ClientEvent::InviteResolved {
                conversation_id: id,
                direction,
                status: InviteStatus::Accepted,
            });

            let Some(callback) = callback else {
                tracing::warn!("Conversation {} connected without a callback", id);
                return;
            };
            queue.post_tracked(async move {
                callback
                    .on_conversation(ConversationOutcome::Connected(conversation))
                    .await
            })
        };

        match delivery {
            Some(delivery) => delivery.wait(),
            None => tracing::warn!("Callback queue closed; conversation {} not handed over", id),
        }
    }

    fn on_participant_connected(&self, id: ConversationId, participant: String) {
        let Some(conversation) = self.sessions.get(&id) else {
            tracing::warn!("Participant {} connected to unknown conversation {}", participant, id);
            return;
        };
        conversation.add_participant(&participant);

        if self.is_resolved(&conversation) {
            self.notify_conversation(conversation, move |listener, conversation| async move {
                listener
                    .on_participant_connected(conversation, participant)
                    .await
            });
        }
    }

    fn on_participant_disconnected(&self, id: ConversationId, participant: String) {
        let Some(conversation) = self.sessions.get(&id) else {
            tracing::warn!("Participant {} left unknown conversation {}", participant, id);
            return;
        };
        conversation.remove_participant(&participant);

        if self.is_resolved(&conversation) {
            self.notify_conversation(conversation, move |listener, conversation| async move {
                listener
                    .on_participant_disconnected(conversation, participant)
                    .await
            });
        }
    }

    fn on_participant_connect_failed(&self, id: ConversationId, participant: String, error: CoreError) {
        let Some(conversation) = self.sessions.get(&id) else {
            tracing::warn!("Participant {} failed on unknown conversation {}", participant, id);
            return;
        };
        tracing::warn!("Participant {} failed to connect to {}: {}", participant, id, error);

        if self.is_resolved(&conversation) {
            self.notify_conversation(conversation, move |listener, conversation| async move {
                listener
                    .on_failed_to_connect_participant(conversation, participant, error.into())
                    .await
            });
        }
    }

    /// Whether the conversation's invite has been resolved
    fn is_resolved(&self, conversation: &Conversation) -> bool {
        self.invites.pending_for(&conversation.id()).is_none()
    }

    /// Run a conversation listener method on the callback queue
    ///
    /// The listener is read when the job runs.
    fn notify_conversation<F, Fut>(&self, conversation: Arc<Conversation>, f: F)
    where
        F: FnOnce(Arc<dyn ConversationListener>, Arc<Conversation>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        self.callbacks.post(async move {
            let Some(listener) = conversation.listener() else {
                tracing::debug!("No listener for conversation {}", conversation.id());
                return;
            };
            f(listener, conversation).await;
        });
    }

    fn on_session_ended(&self, id: ConversationId, error: Option<CoreError>) {
        let ended = {
            let mut ledger = self.invites.lock();
            let Some(conversation) = self.sessions.remove(&id) else {
                drop(ledger);
                tracing::debug!("Session ended for untracked conversation {}", id);
                return;
            };

            let pending = match ledger.pending_for(&id) {
                Some(PendingInvite::Outgoing(_)) => ledger
                    .terminate_outgoing(&id, InviteStatus::Failed)
                    .map(|(invite, status)| EndedInvite::Outgoing(invite, status)),
                Some(PendingInvite::Incoming(invite)) if invite.callback().is_some() => ledger
                    .terminate_incoming(&id, InviteStatus::Failed)
                    .map(|(invite, status)| EndedInvite::Accepted(invite, status)),
                Some(PendingInvite::Incoming(_)) => ledger
                    .terminate_incoming(&id, InviteStatus::Cancelled)
                    .map(|(invite, _)| EndedInvite::Unanswered(invite)),
                None => None,
            };
            (conversation, pending)
        };
        let (conversation, pending) = ended;

        conversation.set_status(if error.is_some() {
            ConversationStatus::Failed
        } else {
            ConversationStatus::Disconnected
        });
        conversation.dispose();
        let error = error.map(ClientError::Native);
        tracing::info!("Conversation {} ended (error: {:?})", id, error);
        self.emit(ClientEvent::ConversationEnded { conversation_id: id });

        match pending {
            Some(EndedInvite::Outgoing(invite, status)) => {
                self.emit(ClientEvent::InviteResolved {
                    conversation_id: id,
                    direction: ConversationDirection::Outgoing,
                    status,
                });
                let callback = invite.callback();
                let outcome = ended_outcome(conversation, status, error);
                invite
                    .queue()
                    .post(async move { callback.on_conversation(outcome).await });
            }
            Some(EndedInvite::Accepted(invite, status)) => {
                self.emit(ClientEvent::InviteResolved {
                    conversation_id: id,
                    direction: ConversationDirection::Incoming,
                    status,
                });
                if let Some(callback) = invite.callback() {
                    let outcome = ended_outcome(conversation, status, error);
                    invite
                        .queue()
                        .post(async move { callback.on_conversation(outcome).await });
                }
            }
            Some(EndedInvite::Unanswered(invite)) => {
                tracing::info!("Incoming invite for conversation {} was cancelled", id);
                self.emit(ClientEvent::InviteResolved {
                    conversation_id: id,
                    direction: ConversationDirection::Incoming,
                    status: InviteStatus::Cancelled,
                });
                self.notify_listener(move |listener, client| async move {
                    listener.on_incoming_invite_cancelled(client, invite).await
                });
            }
            None => {
                self.notify_conversation(conversation, move |listener, conversation| async move {
                    listener.on_conversation_ended(conversation, error).await
                });
            }
        }
    }
}

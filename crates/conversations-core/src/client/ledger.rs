//! Pending invite bookkeeping
//!
//! The [`InviteLedger`] maps each conversation to its pending invite, if any.
//! A conversation has at most one pending invite across both directions.
//! Terminating an invite moves it to its terminal status and removes it from
//! the ledger in one step.
//!
//! The state machine takes [`InviteLedger::lock`] when a ledger transition
//! has to be atomic with other work, such as removing the conversation from
//! the registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::conversation::ConversationId;
use crate::error::{ClientError, ClientResult};
use crate::invite::{IncomingInvite, InviteStatus, OutgoingInvite};

/// A pending invite in either direction
#[derive(Debug, Clone)]
pub enum PendingInvite {
    Outgoing(Arc<OutgoingInvite>),
    Incoming(Arc<IncomingInvite>),
}

impl PendingInvite {
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            PendingInvite::Outgoing(invite) => invite.conversation_id(),
            PendingInvite::Incoming(invite) => invite.conversation_id(),
        }
    }
}

/// Ledger contents; reachable through [`InviteLedger::lock`]
#[derive(Debug, Default)]
pub struct LedgerMaps {
    outgoing: HashMap<ConversationId, Arc<OutgoingInvite>>,
    incoming: HashMap<ConversationId, Arc<IncomingInvite>>,
}

impl LedgerMaps {
    fn ensure_vacant(&self, id: ConversationId) -> ClientResult<()> {
        if self.outgoing.contains_key(&id) || self.incoming.contains_key(&id) {
            tracing::warn!("Invite already pending for conversation {}", id);
            return Err(ClientError::InviteAlreadyPending { conversation_id: id });
        }
        Ok(())
    }

    pub fn register_outgoing(&mut self, invite: Arc<OutgoingInvite>) -> ClientResult<()> {
        let id = invite.conversation_id();
        self.ensure_vacant(id)?;
        self.outgoing.insert(id, invite);
        Ok(())
    }

    pub fn register_incoming(&mut self, invite: Arc<IncomingInvite>) -> ClientResult<()> {
        let id = invite.conversation_id();
        self.ensure_vacant(id)?;
        self.incoming.insert(id, invite);
        Ok(())
    }

    pub fn resolve_outgoing(&self, id: &ConversationId) -> Option<Arc<OutgoingInvite>> {
        self.outgoing.get(id).cloned()
    }

    pub fn resolve_incoming(&self, id: &ConversationId) -> Option<Arc<IncomingInvite>> {
        self.incoming.get(id).cloned()
    }

    pub fn pending_for(&self, id: &ConversationId) -> Option<PendingInvite> {
        if let Some(invite) = self.outgoing.get(id) {
            return Some(PendingInvite::Outgoing(invite.clone()));
        }
        self.incoming
            .get(id)
            .map(|invite| PendingInvite::Incoming(invite.clone()))
    }

    /// Remove the outgoing invite and move it to `status`
    ///
    /// Returns the invite with its effective status, which differs from
    /// `status` if the invite was already terminal.
    pub fn terminate_outgoing(
        &mut self,
        id: &ConversationId,
        status: InviteStatus,
    ) -> Option<(Arc<OutgoingInvite>, InviteStatus)> {
        let invite = self.outgoing.remove(id)?;
        let effective = invite.transition(status);
        Some((invite, effective))
    }

    /// Remove the incoming invite and move it to `status`
    pub fn terminate_incoming(
        &mut self,
        id: &ConversationId,
        status: InviteStatus,
    ) -> Option<(Arc<IncomingInvite>, InviteStatus)> {
        let invite = self.incoming.remove(id)?;
        let effective = invite.transition(status);
        Some((invite, effective))
    }

    /// Remove every invite without changing its status
    pub fn drain(&mut self) -> Vec<PendingInvite> {
        let outgoing = self.outgoing.drain().map(|(_, invite)| PendingInvite::Outgoing(invite));
        let incoming = self.incoming.drain().map(|(_, invite)| PendingInvite::Incoming(invite));
        outgoing.chain(incoming).collect()
    }

    pub fn outgoing_count(&self) -> usize {
        self.outgoing.len()
    }

    pub fn incoming_count(&self) -> usize {
        self.incoming.len()
    }
}

/// Pending invites of one client
#[derive(Debug, Default)]
pub struct InviteLedger {
    maps: Mutex<LedgerMaps>,
}

impl InviteLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the ledger for a compound step
    pub fn lock(&self) -> MutexGuard<'_, LedgerMaps> {
        self.maps.lock()
    }

    pub fn register_outgoing(&self, invite: Arc<OutgoingInvite>) -> ClientResult<()> {
        self.lock().register_outgoing(invite)
    }

    pub fn register_incoming(&self, invite: Arc<IncomingInvite>) -> ClientResult<()> {
        self.lock().register_incoming(invite)
    }

    pub fn resolve_outgoing(&self, id: &ConversationId) -> Option<Arc<OutgoingInvite>> {
        self.lock().resolve_outgoing(id)
    }

    pub fn resolve_incoming(&self, id: &ConversationId) -> Option<Arc<IncomingInvite>> {
        self.lock().resolve_incoming(id)
    }

    pub fn pending_for(&self, id: &ConversationId) -> Option<PendingInvite> {
        self.lock().pending_for(id)
    }

    pub fn terminate_outgoing(
        &self,
        id: &ConversationId,
        status: InviteStatus,
    ) -> Option<(Arc<OutgoingInvite>, InviteStatus)> {
        self.lock().terminate_outgoing(id, status)
    }

    pub fn terminate_incoming(
        &self,
        id: &ConversationId,
        status: InviteStatus,
    ) -> Option<(Arc<IncomingInvite>, InviteStatus)> {
        self.lock().terminate_incoming(id, status)
    }

    pub fn drain(&self) -> Vec<PendingInvite> {
        self.lock().drain()
    }

    /// Pending (outgoing, incoming) invite counts
    pub fn counts(&self) -> (usize, usize) {
        let maps = self.lock();
        (maps.outgoing_count(), maps.incoming_count())
    }
}

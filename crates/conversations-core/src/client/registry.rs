//! Live conversation registry
//!
//! [`SessionRegistry`] owns every conversation the client is tracking. It is
//! safe for concurrent use; iteration works on a snapshot, so callbacks never
//! run while a map shard is locked.

use std::sync::Arc;

use dashmap::DashMap;

use crate::conversation::{Conversation, ConversationId};
use crate::native::NativeHandle;

/// Conversations owned by one client, keyed by id
#[derive(Debug, Default)]
pub struct SessionRegistry {
    conversations: DashMap<ConversationId, Arc<Conversation>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a conversation; replaces any previous entry with the same id
    pub fn add(&self, conversation: Arc<Conversation>) {
        tracing::debug!("Registering conversation {}", conversation.id());
        self.conversations.insert(conversation.id(), conversation);
    }

    /// Stop tracking a conversation
    pub fn remove(&self, id: &ConversationId) -> Option<Arc<Conversation>> {
        self.conversations.remove(id).map(|(_, conversation)| conversation)
    }

    pub fn get(&self, id: &ConversationId) -> Option<Arc<Conversation>> {
        self.conversations.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.conversations.contains_key(id)
    }

    pub fn find_by_native_handle(&self, handle: NativeHandle) -> Option<Arc<Conversation>> {
        self.conversations
            .iter()
            .find(|entry| entry.value().native_handle() == handle)
            .map(|entry| entry.value().clone())
    }

    /// Number of conversations matching `predicate`
    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Conversation) -> bool,
    {
        self.conversations
            .iter()
            .filter(|entry| predicate(entry.value()))
            .count()
    }

    /// Run `f` on every conversation present when the call started
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Conversation>),
    {
        for conversation in self.snapshot() {
            f(&conversation);
        }
    }

    pub fn snapshot(&self) -> Vec<Arc<Conversation>> {
        self.conversations
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    /// Remove and return every conversation
    pub fn drain(&self) -> Vec<Arc<Conversation>> {
        let ids: Vec<ConversationId> = self.conversations.iter().map(|entry| *entry.key()).collect();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }
}

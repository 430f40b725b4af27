//! Minimal native endpoint for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::conversation::{Conversation, ConversationDirection, ConversationId};
use crate::media::LocalMedia;
use crate::native::{CoreEndpoint, CoreError, EndpointGate, NativeHandle};

#[derive(Default)]
pub(crate) struct NullEndpoint {
    refuse_observers: AtomicBool,
    next_handle: AtomicUsize,
    stopped: Mutex<Vec<NativeHandle>>,
    freed: Mutex<Vec<NativeHandle>>,
}

impl NullEndpoint {
    pub(crate) fn refusing_observers() -> Self {
        let endpoint = Self::default();
        endpoint.refuse_observers.store(true, Ordering::SeqCst);
        endpoint
    }

    pub(crate) fn freed_sessions(&self) -> Vec<NativeHandle> {
        self.freed.lock().clone()
    }

    pub(crate) fn stopped_sessions(&self) -> Vec<NativeHandle> {
        self.stopped.lock().clone()
    }

    /// Attach a new outgoing conversation with a fresh handle
    pub(crate) fn conversation(self: &Arc<Self>, participant: &str) -> Arc<Conversation> {
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        Conversation::attach(
            self.clone(),
            Arc::new(EndpointGate::new()),
            NativeHandle::new(raw).unwrap(),
            ConversationDirection::Outgoing,
            [participant],
        )
        .unwrap()
    }
}

impl CoreEndpoint for NullEndpoint {
    fn listen(&self) {}

    fn unlisten(&self) {}

    fn reject(&self, _session: NativeHandle) {}

    fn free(&self) {}

    fn create_outgoing_session(
        &self,
        _participants: &[String],
        _local_media: &LocalMedia,
    ) -> Option<NativeHandle> {
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        NativeHandle::new(raw)
    }

    fn attach_session_observer(
        &self,
        _session: NativeHandle,
        _conversation: ConversationId,
    ) -> Result<(), CoreError> {
        if self.refuse_observers.load(Ordering::SeqCst) {
            Err(CoreError::new(3, "observer refused"))
        } else {
            Ok(())
        }
    }

    fn start_session(&self, _session: NativeHandle, _local_media: &LocalMedia) {}

    fn stop_session(&self, session: NativeHandle) {
        self.stopped.lock().push(session);
    }

    fn free_session(&self, session: NativeHandle) {
        self.freed.lock().push(session);
    }
}

//! Shared fixtures for conversations-core integration tests
//!
//! `FakeEndpoint` records every native call; events are delivered from
//! blocking threads, the way a native engine would deliver them.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};

use conversations_core::{
    ClientConfig, ClientError, Conversation, ConversationCallback, ConversationId,
    ConversationListener, ConversationOutcome, ConversationStatus, ConversationsClient,
    ConversationsClientListener, ConversationsSdk, CoreEndpoint, CoreError, EndpointEvent,
    EndpointFactory, EndpointObserver, IncomingInvite, InviteRequest, LocalMedia, NativeHandle,
    OutgoingInvite, SessionState,
};

pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Blocks one `attach_session_observer` call until released
pub struct AttachHold {
    entered: std_mpsc::Sender<()>,
    resume: std_mpsc::Receiver<()>,
}

/// Native endpoint that records calls
#[derive(Default)]
pub struct FakeEndpoint {
    pub listen_calls: AtomicUsize,
    pub unlisten_calls: AtomicUsize,
    pub free_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub fail_session_creation: AtomicBool,
    pub fail_observer_hookup: AtomicBool,
    next_handle: AtomicU64,
    pub attached: Mutex<Vec<(NativeHandle, ConversationId)>>,
    pub started: Mutex<Vec<(NativeHandle, LocalMedia)>>,
    pub stopped: Mutex<Vec<NativeHandle>>,
    pub rejected: Mutex<Vec<NativeHandle>>,
    pub freed_sessions: Mutex<Vec<NativeHandle>>,
    /// Release-related native calls in the order they were made
    pub native_log: Mutex<Vec<&'static str>>,
    pub attach_hold: Mutex<Option<AttachHold>>,
}

impl FakeEndpoint {
    pub fn new_handle(&self) -> NativeHandle {
        let raw = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
        NativeHandle::new(raw).unwrap()
    }

    pub fn handle_of(&self, conversation: ConversationId) -> Option<NativeHandle> {
        self.attached
            .lock()
            .iter()
            .find(|(_, id)| *id == conversation)
            .map(|(handle, _)| *handle)
    }

    pub fn listens(&self) -> usize {
        self.listen_calls.load(Ordering::SeqCst)
    }

    pub fn unlistens(&self) -> usize {
        self.unlisten_calls.load(Ordering::SeqCst)
    }

    pub fn frees(&self) -> usize {
        self.free_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn native_log(&self) -> Vec<&'static str> {
        self.native_log.lock().clone()
    }

    /// Make the next observer hookup block
    ///
    /// Returns a receiver signalled once the hookup is blocked and a sender
    /// that lets it continue.
    pub fn hold_next_attach(&self) -> (std_mpsc::Receiver<()>, std_mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (resume_tx, resume_rx) = std_mpsc::channel();
        *self.attach_hold.lock() = Some(AttachHold {
            entered: entered_tx,
            resume: resume_rx,
        });
        (entered_rx, resume_tx)
    }
}

impl CoreEndpoint for FakeEndpoint {
    fn listen(&self) {
        self.listen_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn unlisten(&self) {
        self.unlisten_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn reject(&self, session: NativeHandle) {
        self.native_log.lock().push("reject");
        self.rejected.lock().push(session);
    }

    fn free(&self) {
        self.native_log.lock().push("free");
        self.free_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn create_outgoing_session(
        &self,
        _participants: &[String],
        _local_media: &LocalMedia,
    ) -> Option<NativeHandle> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_session_creation.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.new_handle())
        }
    }

    fn attach_session_observer(
        &self,
        session: NativeHandle,
        conversation: ConversationId,
    ) -> Result<(), CoreError> {
        let hold = self.attach_hold.lock().take();
        if let Some(hold) = hold {
            let _ = hold.entered.send(());
            let _ = hold.resume.recv();
        }
        if self.fail_observer_hookup.load(Ordering::SeqCst) {
            return Err(CoreError::new(31_000, "session observer rejected"));
        }
        self.attached.lock().push((session, conversation));
        Ok(())
    }

    fn start_session(&self, session: NativeHandle, local_media: &LocalMedia) {
        self.started.lock().push((session, local_media.clone()));
    }

    fn stop_session(&self, session: NativeHandle) {
        self.stopped.lock().push(session);
    }

    fn free_session(&self, session: NativeHandle) {
        self.native_log.lock().push("free_session");
        self.freed_sessions.lock().push(session);
    }
}

/// Factory handing out one shared `FakeEndpoint`
#[derive(Default)]
pub struct FakeFactory {
    pub endpoint: Arc<FakeEndpoint>,
    pub observer: Mutex<Option<EndpointObserver>>,
    pub fail: AtomicBool,
}

impl FakeFactory {
    pub fn observer(&self) -> EndpointObserver {
        self.observer.lock().clone().expect("endpoint was never created")
    }
}

impl EndpointFactory for FakeFactory {
    fn create_endpoint(
        &self,
        _config: &ClientConfig,
        observer: EndpointObserver,
    ) -> Result<Arc<dyn CoreEndpoint>, CoreError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::new(20_101, "invalid access token"));
        }
        *self.observer.lock() = Some(observer);
        Ok(self.endpoint.clone())
    }
}

/// Client listener notifications, in delivery order
#[derive(Debug)]
pub enum Notification {
    StartedListening,
    StoppedListening,
    FailedToListen(ClientError),
    IncomingInvite(Arc<IncomingInvite>),
    IncomingInviteCancelled(Arc<IncomingInvite>),
}

pub struct RecordingListener {
    tx: mpsc::UnboundedSender<Notification>,
}

impl RecordingListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ConversationsClientListener for RecordingListener {
    async fn on_start_listening_for_invites(&self, _client: Arc<ConversationsClient>) {
        let _ = self.tx.send(Notification::StartedListening);
    }

    async fn on_stop_listening_for_invites(&self, _client: Arc<ConversationsClient>) {
        let _ = self.tx.send(Notification::StoppedListening);
    }

    async fn on_failed_to_start_listening(&self, _client: Arc<ConversationsClient>, error: ClientError) {
        let _ = self.tx.send(Notification::FailedToListen(error));
    }

    async fn on_incoming_invite(&self, _client: Arc<ConversationsClient>, invite: Arc<IncomingInvite>) {
        let _ = self.tx.send(Notification::IncomingInvite(invite));
    }

    async fn on_incoming_invite_cancelled(
        &self,
        _client: Arc<ConversationsClient>,
        invite: Arc<IncomingInvite>,
    ) {
        let _ = self.tx.send(Notification::IncomingInviteCancelled(invite));
    }
}

/// Invite callback that forwards outcomes
pub struct RecordingCallback {
    tx: mpsc::UnboundedSender<ConversationOutcome>,
}

impl RecordingCallback {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ConversationOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ConversationCallback for RecordingCallback {
    async fn on_conversation(&self, outcome: ConversationOutcome) {
        let _ = self.tx.send(outcome);
    }
}

/// Invite callback that holds until its gate is opened
pub struct GatedCallback {
    pub entered: Notify,
    pub gate: Notify,
    pub finished: AtomicBool,
}

impl GatedCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            gate: Notify::new(),
            finished: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl ConversationCallback for GatedCallback {
    async fn on_conversation(&self, _outcome: ConversationOutcome) {
        self.entered.notify_one();
        self.gate.notified().await;
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Gated invite callback that installs `listener` on the connected conversation
pub struct ListenOnConnect {
    pub entered: Notify,
    pub gate: Notify,
    listener: Arc<RecordingConversationListener>,
}

impl ListenOnConnect {
    pub fn new(listener: Arc<RecordingConversationListener>) -> Arc<Self> {
        Arc::new(Self {
            entered: Notify::new(),
            gate: Notify::new(),
            listener,
        })
    }
}

#[async_trait]
impl ConversationCallback for ListenOnConnect {
    async fn on_conversation(&self, outcome: ConversationOutcome) {
        self.entered.notify_one();
        self.gate.notified().await;
        if let ConversationOutcome::Connected(conversation) = outcome {
            conversation.set_listener(Some(self.listener.clone()));
        }
    }
}

/// Conversation listener notifications
#[derive(Debug)]
pub enum ConversationNotification {
    ParticipantConnected(String),
    ParticipantDisconnected(String),
    ConnectFailed(String, ClientError),
    Ended(Option<ClientError>),
}

pub struct RecordingConversationListener {
    tx: mpsc::UnboundedSender<ConversationNotification>,
}

impl RecordingConversationListener {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ConversationNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl ConversationListener for RecordingConversationListener {
    async fn on_participant_connected(&self, _conversation: Arc<Conversation>, participant: String) {
        let _ = self
            .tx
            .send(ConversationNotification::ParticipantConnected(participant));
    }

    async fn on_failed_to_connect_participant(
        &self,
        _conversation: Arc<Conversation>,
        participant: String,
        error: ClientError,
    ) {
        let _ = self
            .tx
            .send(ConversationNotification::ConnectFailed(participant, error));
    }

    async fn on_participant_disconnected(&self, _conversation: Arc<Conversation>, participant: String) {
        let _ = self
            .tx
            .send(ConversationNotification::ParticipantDisconnected(participant));
    }

    async fn on_conversation_ended(&self, _conversation: Arc<Conversation>, error: Option<ClientError>) {
        let _ = self.tx.send(ConversationNotification::Ended(error));
    }
}

/// Next message, failing the test after `TIMEOUT`
pub async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

/// Assert nothing arrives for a short while
pub async fn assert_quiet<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    if let Ok(Some(message)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("unexpected notification: {:?}", message);
    }
}

/// Poll `condition` until it holds, failing the test after `TIMEOUT`
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Deliver a native event from a blocking thread and wait for the handler
pub async fn fire(observer: &EndpointObserver, event: EndpointEvent) {
    let observer = observer.clone();
    tokio::task::spawn_blocking(move || observer.notify(event))
        .await
        .expect("native event handler panicked");
}

pub struct Harness {
    pub sdk: ConversationsSdk,
    pub factory: Arc<FakeFactory>,
    pub endpoint: Arc<FakeEndpoint>,
    pub client: Arc<ConversationsClient>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

/// SDK with one client for "alice"; must run inside a tokio runtime
pub fn harness() -> Harness {
    let factory = Arc::new(FakeFactory::default());
    let sdk = ConversationsSdk::initialize(factory.clone()).unwrap();
    let (listener, notifications) = RecordingListener::new();
    let client = sdk
        .create_client(ClientConfig::new("alice", "token"), listener)
        .unwrap();

    Harness {
        endpoint: factory.endpoint.clone(),
        sdk,
        factory,
        client,
        notifications,
    }
}

impl Harness {
    pub fn observer(&self) -> EndpointObserver {
        self.factory.observer()
    }

    pub async fn fire(&self, event: EndpointEvent) {
        fire(&self.observer(), event).await;
    }

    /// listen() and acknowledge it
    pub async fn register(&mut self) {
        self.client.listen().unwrap();
        self.fire(EndpointEvent::RegistrationComplete(None)).await;
        assert!(matches!(next(&mut self.notifications).await, Notification::StartedListening));
    }

    pub async fn send_invite(
        &self,
        participants: &[&str],
    ) -> (Arc<OutgoingInvite>, mpsc::UnboundedReceiver<ConversationOutcome>) {
        let (callback, outcomes) = RecordingCallback::new();
        let invite = self
            .client
            .send_conversation_invite(
                InviteRequest::new()
                    .participants(participants.iter().copied())
                    .local_media(LocalMedia::new())
                    .callback(callback),
            )
            .await
            .unwrap()
            .expect("native session was not created");
        (invite, outcomes)
    }

    /// Deliver an incoming session and return the invite handed to the listener
    pub async fn receive_invite(&mut self, participants: &[&str]) -> Arc<IncomingInvite> {
        let handle = self.endpoint.new_handle();
        self.fire(EndpointEvent::IncomingSession {
            handle,
            participants: participants.iter().map(|p| p.to_string()).collect(),
        })
        .await;
        match next(&mut self.notifications).await {
            Notification::IncomingInvite(invite) => invite,
            other => panic!("expected incoming invite, got {:?}", other),
        }
    }

    /// Report the session connected with media flowing
    pub async fn start_session(&self, conversation: ConversationId) {
        self.fire(EndpointEvent::SessionStatusChanged {
            conversation,
            status: ConversationStatus::Connected,
        })
        .await;
        self.fire(EndpointEvent::SessionStateChanged {
            conversation,
            state: SessionState::InProgress,
        })
        .await;
    }

    pub async fn end_session(&self, conversation: ConversationId, error: Option<CoreError>) {
        self.fire(EndpointEvent::SessionEnded { conversation, error }).await;
    }
}

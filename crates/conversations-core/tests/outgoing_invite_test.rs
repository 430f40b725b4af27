//! Outgoing invites: validation, native failures and resolution

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use conversations_core::{
    ClientError, ConversationOutcome, ConversationStatus, CoreError, EndpointEvent, InviteRequest,
    InviteStatus, LocalMedia, SessionState,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_participant_set_fails_fast() {
    let h = harness();
    let (callback, mut outcomes) = RecordingCallback::new();

    let result = h
        .client
        .send_conversation_invite(
            InviteRequest::new()
                .local_media(LocalMedia::new())
                .callback(callback),
        )
        .await;

    assert_eq!(
        result.unwrap_err(),
        ClientError::invalid_argument("Invite at least one participant")
    );
    assert_eq!(h.endpoint.creates(), 0);
    assert!(h.client.conversations().is_empty());
    assert_quiet(&mut outcomes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_media_or_callback_fails_fast() {
    let h = harness();
    let (callback, _outcomes) = RecordingCallback::new();

    let no_media = h
        .client
        .send_conversation_invite(InviteRequest::new().participant("bob").callback(callback))
        .await;
    assert_eq!(no_media.unwrap_err(), ClientError::MissingLocalMedia);

    let no_callback = h
        .client
        .send_conversation_invite(
            InviteRequest::new()
                .participant("bob")
                .local_media(LocalMedia::new()),
        )
        .await;
    assert_eq!(no_callback.unwrap_err(), ClientError::MissingCallback);
    assert_eq!(h.endpoint.creates(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_native_creation_failure_reports_disconnected() {
    let h = harness();
    h.endpoint.fail_session_creation.store(true, Ordering::SeqCst);
    let (callback, mut outcomes) = RecordingCallback::new();

    let invite = h
        .client
        .send_conversation_invite(
            InviteRequest::new()
                .participant("bob")
                .local_media(LocalMedia::new())
                .callback(callback),
        )
        .await
        .unwrap();

    assert!(invite.is_none());
    match next(&mut outcomes).await {
        ConversationOutcome::Failed {
            conversation: None,
            error: ClientError::ClientDisconnected { message },
        } => assert!(message.contains("reconnecting")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(h.client.conversations().is_empty());
    assert_eq!(h.client.client_stats().pending_outgoing_invites, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_observer_hookup_failure_frees_session() {
    let h = harness();
    h.endpoint.fail_observer_hookup.store(true, Ordering::SeqCst);
    let (callback, mut outcomes) = RecordingCallback::new();

    let invite = h
        .client
        .send_conversation_invite(
            InviteRequest::new()
                .participant("bob")
                .local_media(LocalMedia::new())
                .callback(callback),
        )
        .await
        .unwrap();

    assert!(invite.is_none());
    let outcome = next(&mut outcomes).await;
    assert_eq!(outcome.error().map(ClientError::code), Some(31_000));
    assert_eq!(h.endpoint.freed_sessions.lock().len(), 1);
    assert!(h.endpoint.started.lock().is_empty());
    assert!(h.client.conversations().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invite_registers_then_starts_session() {
    let h = harness();
    let (invite, _outcomes) = h.send_invite(&["bob", "carol"]).await;

    assert_eq!(invite.status(), InviteStatus::Pending);
    assert_eq!(invite.participants().len(), 2);
    let conversation = h.client.conversation(&invite.conversation_id()).unwrap();
    assert_eq!(conversation.status(), ConversationStatus::Connecting);
    assert!(conversation.local_media().is_some());

    let handle = h.endpoint.handle_of(invite.conversation_id()).unwrap();
    assert_eq!(h.endpoint.started.lock()[0].0, handle);
    assert_eq!(h.client.client_stats().pending_outgoing_invites, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_connected_invite_is_handed_over_synchronously() {
    let h = harness();
    let (invite, mut outcomes) = h.send_invite(&["bob"]).await;
    let id = invite.conversation_id();

    h.start_session(id).await;

    // fire() returned, so the callback has already run
    match outcomes.try_recv().unwrap() {
        ConversationOutcome::Connected(conversation) => {
            assert_eq!(conversation.id(), id);
            assert_eq!(conversation.session_state(), SessionState::InProgress);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(invite.status(), InviteStatus::Accepted);
    assert_eq!(h.client.client_stats().pending_outgoing_invites, 0);
    assert!(h.client.conversation(&id).is_some());

    // A repeated "started" report does not resolve the invite again
    h.start_session(id).await;
    assert_quiet(&mut outcomes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hand_off_blocks_native_thread_until_callback_returns() {
    let h = harness();
    let callback = GatedCallback::new();
    let invite = h
        .client
        .send_conversation_invite(
            InviteRequest::new()
                .participant("bob")
                .local_media(LocalMedia::new())
                .callback(callback.clone()),
        )
        .await
        .unwrap()
        .unwrap();
    let id = invite.conversation_id();

    h.fire(EndpointEvent::SessionStatusChanged {
        conversation: id,
        status: ConversationStatus::Connected,
    })
    .await;

    let observer = h.observer();
    let native_thread = tokio::task::spawn_blocking(move || {
        observer.notify(EndpointEvent::SessionStateChanged {
            conversation: id,
            state: SessionState::InProgress,
        })
    });

    tokio::time::timeout(TIMEOUT, callback.entered.notified())
        .await
        .expect("callback never ran");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!native_thread.is_finished());
    assert!(!callback.finished.load(Ordering::SeqCst));

    callback.gate.notify_one();
    tokio::time::timeout(TIMEOUT, native_thread)
        .await
        .expect("native thread stayed blocked")
        .unwrap();
    assert!(callback.finished.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_events_during_hand_off_reach_listener_installed_by_callback() {
    let h = harness();
    let (listener, mut notifications) = RecordingConversationListener::new();
    let callback = ListenOnConnect::new(listener);
    let invite = h
        .client
        .send_conversation_invite(
            InviteRequest::new()
                .participant("bob")
                .local_media(LocalMedia::new())
                .callback(callback.clone()),
        )
        .await
        .unwrap()
        .unwrap();
    let id = invite.conversation_id();

    let observer = h.observer();
    let starting = tokio::spawn(async move {
        fire(
            &observer,
            EndpointEvent::SessionStatusChanged {
                conversation: id,
                status: ConversationStatus::Connected,
            },
        )
        .await;
        fire(
            &observer,
            EndpointEvent::SessionStateChanged {
                conversation: id,
                state: SessionState::InProgress,
            },
        )
        .await;
    });
    tokio::time::timeout(TIMEOUT, callback.entered.notified())
        .await
        .expect("callback never ran");

    // Another native thread reports on the same session mid hand-off
    h.fire(EndpointEvent::ParticipantConnected {
        conversation: id,
        participant: "carol".to_string(),
    })
    .await;
    h.end_session(id, None).await;
    assert_quiet(&mut notifications).await;
    assert!(!starting.is_finished());

    callback.gate.notify_one();
    tokio::time::timeout(TIMEOUT, starting)
        .await
        .expect("native thread stayed blocked")
        .unwrap();

    assert!(matches!(
        next(&mut notifications).await,
        ConversationNotification::ParticipantConnected(p) if p == "carol"
    ));
    assert!(matches!(
        next(&mut notifications).await,
        ConversationNotification::Ended(None)
    ));
    assert_quiet(&mut notifications).await;
    assert_eq!(invite.status(), InviteStatus::Accepted);
    assert!(h.client.conversation(&id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_failure_fails_invite() {
    let h = harness();
    let (invite, mut outcomes) = h.send_invite(&["bob"]).await;
    let id = invite.conversation_id();
    let handle = h.endpoint.handle_of(id).unwrap();

    h.end_session(id, Some(CoreError::new(53_405, "media connection failed")))
        .await;

    match next(&mut outcomes).await {
        ConversationOutcome::Failed {
            conversation: Some(conversation),
            error,
        } => {
            assert_eq!(conversation.id(), id);
            assert_eq!(conversation.status(), ConversationStatus::Failed);
            assert_eq!(error.code(), 53_405);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(invite.status(), InviteStatus::Failed);
    assert!(h.client.conversation(&id).is_none());
    assert_eq!(*h.endpoint.freed_sessions.lock(), vec![handle]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_ended_without_error_reports_ended_once() {
    let h = harness();
    let (invite, mut outcomes) = h.send_invite(&["bob"]).await;
    let id = invite.conversation_id();

    h.end_session(id, None).await;

    assert!(matches!(next(&mut outcomes).await, ConversationOutcome::Ended(_)));
    assert_eq!(invite.status(), InviteStatus::Failed);

    h.end_session(id, None).await;
    assert_quiet(&mut outcomes).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_beats_racing_failure() {
    let h = harness();
    let (invite, mut outcomes) = h.send_invite(&["bob"]).await;
    let id = invite.conversation_id();
    let handle = h.endpoint.handle_of(id).unwrap();

    invite.cancel().unwrap();
    assert_eq!(invite.status(), InviteStatus::Cancelled);
    assert_eq!(*h.endpoint.stopped.lock(), vec![handle]);
    assert!(h.client.conversation(&id).is_some());
    assert!(matches!(
        invite.cancel(),
        Err(ClientError::InviteNotPending { status: InviteStatus::Cancelled, .. })
    ));

    h.end_session(id, Some(CoreError::new(53_000, "signaling connection error")))
        .await;

    assert!(matches!(next(&mut outcomes).await, ConversationOutcome::Cancelled(_)));
    assert_eq!(invite.status(), InviteStatus::Cancelled);
    assert!(h.client.conversation(&id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_session_started_after_cancel_is_not_reported() {
    let h = harness();
    let (invite, mut outcomes) = h.send_invite(&["bob"]).await;
    let id = invite.conversation_id();

    invite.cancel().unwrap();
    h.start_session(id).await;
    assert_quiet(&mut outcomes).await;

    h.end_session(id, None).await;
    assert!(matches!(next(&mut outcomes).await, ConversationOutcome::Cancelled(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_participant_events_reach_listener_after_resolution() {
    let h = harness();
    let (invite, mut outcomes) = h.send_invite(&["bob"]).await;
    let id = invite.conversation_id();

    // Before resolution only the participant set changes
    h.fire(EndpointEvent::ParticipantConnected {
        conversation: id,
        participant: "bob".to_string(),
    })
    .await;

    h.start_session(id).await;
    let conversation = match next(&mut outcomes).await {
        ConversationOutcome::Connected(conversation) => conversation,
        other => panic!("unexpected outcome {:?}", other),
    };
    let (listener, mut notifications) = RecordingConversationListener::new();
    conversation.set_listener(Some(listener));

    h.fire(EndpointEvent::ParticipantConnected {
        conversation: id,
        participant: "dave".to_string(),
    })
    .await;
    h.fire(EndpointEvent::ParticipantConnectFailed {
        conversation: id,
        participant: "erin".to_string(),
        error: CoreError::new(53_100, "participant unreachable"),
    })
    .await;
    h.fire(EndpointEvent::ParticipantDisconnected {
        conversation: id,
        participant: "bob".to_string(),
    })
    .await;
    h.end_session(id, None).await;

    assert!(matches!(
        next(&mut notifications).await,
        ConversationNotification::ParticipantConnected(p) if p == "dave"
    ));
    assert!(matches!(
        next(&mut notifications).await,
        ConversationNotification::ConnectFailed(p, e) if p == "erin" && e.code() == 53_100
    ));
    assert!(matches!(
        next(&mut notifications).await,
        ConversationNotification::ParticipantDisconnected(p) if p == "bob"
    ));
    assert!(matches!(
        next(&mut notifications).await,
        ConversationNotification::Ended(None)
    ));
    assert_quiet(&mut outcomes).await;

    assert_eq!(
        conversation.participants().into_iter().collect::<Vec<_>>(),
        vec!["dave".to_string()]
    );
    assert!(!conversation.is_active());
    assert!(h.client.conversations().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ending_one_conversation_leaves_others() {
    let h = harness();
    let (first, _first_outcomes) = h.send_invite(&["bob"]).await;
    let (second, _second_outcomes) = h.send_invite(&["carol"]).await;

    h.end_session(first.conversation_id(), None).await;

    assert!(h.client.conversation(&first.conversation_id()).is_none());
    assert!(h.client.conversation(&second.conversation_id()).is_some());
    assert_eq!(second.status(), InviteStatus::Pending);
    assert_eq!(h.client.active_conversation_count(), 1);
    let stats = h.client.client_stats();
    assert_eq!(stats.conversations, 1);
    assert_eq!(stats.pending_outgoing_invites, 1);
}

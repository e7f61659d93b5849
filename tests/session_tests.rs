//! Exchange behavior of a chat session against a scripted backend.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};

use common::{RecordingRenderer, Reply, ScriptedBackend, session_in};
use vllm_chat::chat::ChatSession;
use vllm_chat::{Error, Role, Turn, Usage};

fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

#[tokio::test]
async fn hello_gets_hi() {
    let dir = tempdir();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text(&["h", "i"]));
    let mut session = session_in(backend.clone(), dir.path());
    let mut renderer = RecordingRenderer::default();

    let reply = assert_ok!(session.exchange("hello", &mut renderer).await);
    assert_eq!(reply, "hi");
    assert_eq!(
        session.history(),
        &[Turn::user("hello"), Turn::assistant("hi")]
    );
    assert_eq!(backend.requests(), vec![vec![Turn::user("hello")]]);
}

#[tokio::test]
async fn commit_appends_user_then_assistant() {
    let dir = tempdir();
    let backend = ScriptedBackend::streaming();
    backend
        .reply(Reply::text(&["one"]))
        .reply(Reply::text(&["two"]));
    let mut session = session_in(backend.clone(), dir.path());
    let mut renderer = RecordingRenderer::default();

    assert_ok!(session.exchange("first", &mut renderer).await);
    let before = session.message_count();
    assert_ok!(session.exchange("second", &mut renderer).await);

    assert_eq!(session.message_count(), before + 2);
    let roles: Vec<Role> = session.history().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    // The second request carried the whole conversation.
    assert_eq!(backend.requests()[1].len(), 3);
}

#[tokio::test]
async fn mid_stream_failure_rolls_back() {
    let dir = tempdir();
    let backend = ScriptedBackend::streaming();
    backend
        .reply(Reply::fail_after(
            &["h", "i"],
            Error::streaming("connection reset by peer", None),
        ))
        .reply(Reply::text(&["ok"]));
    let mut session = session_in(backend.clone(), dir.path());
    let mut renderer = RecordingRenderer::default();

    let err = assert_err!(session.exchange("hello", &mut renderer).await);
    assert!(err.is_backend());
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(renderer.text(), "hi");
    assert!(session.history().is_empty());

    assert_ok!(session.exchange("hello again", &mut renderer).await);
    assert_eq!(backend.requests()[1], vec![Turn::user("hello again")]);
}

#[tokio::test]
async fn failure_before_any_fragment_rolls_back() {
    let dir = tempdir();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text(&["first"]));
    backend.reply(Reply::Fail(Error::service_unavailable("overloaded", None)));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();

    assert_ok!(session.exchange("one", &mut renderer).await);
    let before: Vec<Turn> = session.history().to_vec();
    let err = assert_err!(session.exchange("two", &mut renderer).await);
    assert!(matches!(err, Error::Backend { .. }));
    assert_eq!(session.history(), before.as_slice());
}

#[tokio::test]
async fn buffered_backend_never_streams() {
    let dir = tempdir();
    let backend = ScriptedBackend::buffered();
    backend.reply(Reply::text_with_usage(&["whole"], Usage::new(7, 3)));
    let mut session = session_in(backend, dir.path());
    assert!(session.config().stream());
    let mut renderer = RecordingRenderer::default();

    let reply = assert_ok!(session.exchange("hello", &mut renderer).await);
    assert_eq!(reply, "whole");
    assert_eq!(renderer.text(), "whole");
    assert_eq!(session.total_tokens(), 10);
}

#[tokio::test]
async fn buffered_failure_rolls_back() {
    let dir = tempdir();
    let backend = ScriptedBackend::buffered();
    backend.reply(Reply::Fail(Error::timeout("Request timed out", Some(120.0))));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();

    let err = assert_err!(session.exchange("hello", &mut renderer).await);
    assert!(err.is_backend());
    assert!(session.history().is_empty());
    assert!(renderer.text().is_empty());
}

#[tokio::test]
async fn usage_survives_rollback() {
    let dir = tempdir();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::Fragments(vec![
        Ok(vllm_chat::Fragment::Usage(Usage::new(5, 5))),
        Err(Error::streaming("cut", None)),
    ]));
    let mut session = session_in(backend, dir.path());

    assert_err!(
        session
            .exchange("hello", &mut RecordingRenderer::default())
            .await
    );
    assert!(session.history().is_empty());
    assert_eq!(session.total_tokens(), 10);
}

#[tokio::test]
async fn dropped_exchange_is_rolled_back_before_the_next() {
    let dir = tempdir();
    let backend = ScriptedBackend::buffered();
    backend.reply(Reply::Pending);
    backend.reply(Reply::text(&["fresh"]));
    let mut session: ChatSession<ScriptedBackend> = session_in(backend.clone(), dir.path());
    let mut renderer = RecordingRenderer::default();

    {
        // Poll once so the user turn is appended, then drop the future.
        let future = session.exchange("abandoned", &mut renderer);
        futures::pin_mut!(future);
        let _ = futures::poll!(future.as_mut());
    }
    assert_ok!(session.exchange("fresh start", &mut renderer).await);

    assert_eq!(
        session.history(),
        &[Turn::user("fresh start"), Turn::assistant("fresh")]
    );
}

#[tokio::test]
async fn interrupt_reaches_a_stalled_stream() {
    let dir = tempdir();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::Pending);
    backend.reply(Reply::text(&["ok"]));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();
    let interrupt = renderer.interrupt.clone();

    let (result, ()) = tokio::join!(
        tokio::time::timeout(
            Duration::from_secs(2),
            session.exchange("hello", &mut renderer)
        ),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            interrupt.store(true, Ordering::SeqCst);
        },
    );
    let err = assert_err!(assert_ok!(result));
    assert!(err.is_abort());
    assert!(renderer.shown.contains(&common::Shown::Interrupted));
    assert!(session.history().is_empty());

    renderer.interrupt.store(false, Ordering::SeqCst);
    assert_ok!(session.exchange("again", &mut renderer).await);
    assert_eq!(
        session.history(),
        &[Turn::user("again"), Turn::assistant("ok")]
    );
}

#[tokio::test]
async fn round_trip_through_disk() {
    let dir = tempdir();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text_with_usage(&["hi"], Usage::new(2, 1)));
    let mut session = session_in(backend, dir.path());
    assert_ok!(
        session
            .exchange("hello", &mut RecordingRenderer::default())
            .await
    );
    assert_ok!(session.save(Some("round_trip")));

    let mut restored = session_in(ScriptedBackend::streaming(), dir.path());
    assert_eq!(assert_ok!(restored.load("round_trip.json")), 2);
    assert_eq!(restored.history(), session.history());
    assert_eq!(restored.total_tokens(), 3);
}

#[tokio::test]
async fn malformed_snapshot_leaves_conversation_unchanged() {
    let dir = tempdir();
    std::fs::write(dir.path().join("broken.json"), "{\"messages\": [").unwrap();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text(&["hi"]));
    let mut session = session_in(backend, dir.path());
    assert_ok!(
        session
            .exchange("hello", &mut RecordingRenderer::default())
            .await
    );
    let before = session.history().to_vec();

    let err = assert_err!(session.load("broken"));
    assert!(err.is_malformed_snapshot());
    assert_eq!(session.history(), before.as_slice());
}

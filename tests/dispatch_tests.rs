//! Command dispatch scenarios.

mod common;

use common::{RecordingRenderer, Reply, ScriptedBackend, Shown, session_in};
use vllm_chat::Turn;
use vllm_chat::chat::{Flow, dispatch, help_text};

#[tokio::test]
async fn save_with_empty_conversation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let history = dir.path().join("chat_history");
    let mut session = session_in(ScriptedBackend::streaming(), &history);
    let mut renderer = RecordingRenderer::default();

    let flow = dispatch(&mut session, "/save", &mut renderer).await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(renderer.warnings(), vec!["No conversation to save."]);
    assert!(!history.exists());
}

#[tokio::test]
async fn config_without_value_is_a_usage_notice() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::streaming(), dir.path());
    let mut renderer = RecordingRenderer::default();

    dispatch(&mut session, "/config max_tokens 1000", &mut renderer).await;
    assert_eq!(session.config().max_tokens(), 1000);
    assert_eq!(renderer.infos(), vec!["Updated max_tokens = 1000"]);

    dispatch(&mut session, "/config max_tokens", &mut renderer).await;
    assert_eq!(session.config().max_tokens(), 1000);
    assert!(renderer.warnings()[0].contains("Usage: /config <key> <value>"));
}

#[tokio::test]
async fn invalid_config_values_are_reported_and_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::streaming(), dir.path());
    let mut renderer = RecordingRenderer::default();

    dispatch(&mut session, "/config temperature 2.5", &mut renderer).await;
    dispatch(&mut session, "/config top_k 40", &mut renderer).await;
    dispatch(&mut session, "/config stream maybe", &mut renderer).await;

    let errors = renderer.errors();
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("temperature"));
    assert_eq!(errors[1], "Unknown config key: top_k");
    assert!(errors[2].contains("stream"));
    assert_eq!(session.config().temperature(), 0.7);
    assert!(session.config().stream());
}

#[tokio::test]
async fn hello_hi_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text(&["h", "i"]));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();

    assert_eq!(
        dispatch(&mut session, "hello", &mut renderer).await,
        Flow::Continue
    );
    assert_eq!(renderer.text(), "hi");

    dispatch(&mut session, "/history", &mut renderer).await;
    let turns: Vec<&Shown> = renderer
        .shown
        .iter()
        .filter(|s| matches!(s, Shown::Turn(..)))
        .collect();
    assert_eq!(
        turns,
        vec![
            &Shown::Turn(1, Turn::user("hello")),
            &Shown::Turn(2, Turn::assistant("hi")),
        ]
    );
}

#[tokio::test]
async fn history_of_empty_conversation_is_a_notice() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::streaming(), dir.path());
    let mut renderer = RecordingRenderer::default();

    let flow = dispatch(&mut session, "/history", &mut renderer).await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(renderer.infos(), vec!["No conversation history yet."]);
    assert!(
        !renderer
            .shown
            .iter()
            .any(|s| matches!(s, Shown::Turn(..)))
    );
}

#[tokio::test]
async fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::streaming(), dir.path());
    let mut renderer = RecordingRenderer::default();

    for line in ["/help", "/?"] {
        assert_eq!(
            dispatch(&mut session, line, &mut renderer).await,
            Flow::Continue
        );
    }
    assert_eq!(renderer.infos(), vec![help_text(), help_text()]);
    assert!(help_text().contains("/history"));
}

#[tokio::test]
async fn failed_exchange_is_reported_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::fail_after(
        &["h"],
        vllm_chat::Error::streaming("connection reset", None),
    ));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();

    let flow = dispatch(&mut session, "hello", &mut renderer).await;
    assert_eq!(flow, Flow::Continue);
    assert!(renderer.errors()[0].starts_with("Backend error:"));
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn blank_lines_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::streaming();
    let mut session = session_in(backend.clone(), dir.path());
    let mut renderer = RecordingRenderer::default();

    assert_eq!(
        dispatch(&mut session, "   ", &mut renderer).await,
        Flow::Continue
    );
    assert!(renderer.shown.is_empty());
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn quit_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::streaming(), dir.path());
    let mut renderer = RecordingRenderer::default();

    for line in ["/quit", "/EXIT", "/q"] {
        assert_eq!(
            dispatch(&mut session, line, &mut renderer).await,
            Flow::Terminate
        );
    }
}

#[tokio::test]
async fn unknown_directive_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::streaming(), dir.path());
    let mut renderer = RecordingRenderer::default();

    let flow = dispatch(&mut session, "/frobnicate now", &mut renderer).await;
    assert_eq!(flow, Flow::Continue);
    assert_eq!(renderer.errors(), vec!["Unknown command: /frobnicate"]);
}

#[tokio::test]
async fn load_missing_and_malformed_slots() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.json"), "[]").unwrap();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text(&["kept"]));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();
    dispatch(&mut session, "keep me", &mut renderer).await;

    dispatch(&mut session, "/load nope", &mut renderer).await;
    dispatch(&mut session, "/load bad.json", &mut renderer).await;
    dispatch(&mut session, "/load ../escape.json", &mut renderer).await;
    dispatch(&mut session, "/load", &mut renderer).await;

    let errors = renderer.errors();
    assert_eq!(errors.len(), 3);
    assert!(errors[0].contains("no saved chat"));
    assert!(errors[1].starts_with("Malformed snapshot"));
    assert!(errors[2].contains(".."));
    assert!(renderer.warnings()[0].contains("Usage: /load <name>"));
    assert_eq!(session.message_count(), 2);
}

#[tokio::test]
async fn save_list_clear_load() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text(&["hi"]));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();

    dispatch(&mut session, "/list", &mut renderer).await;
    assert_eq!(renderer.infos(), vec!["No saved chats found."]);

    dispatch(&mut session, "hello", &mut renderer).await;
    dispatch(&mut session, "/save mine", &mut renderer).await;
    dispatch(&mut session, "/save", &mut renderer).await;
    assert!(dir.path().join("mine.json").exists());

    renderer.shown.clear();
    dispatch(&mut session, "/list", &mut renderer).await;
    let listing = renderer.infos()[0].to_string();
    assert!(listing.contains("mine.json"));
    assert!(listing.contains("chat_"));

    dispatch(&mut session, "/clear", &mut renderer).await;
    assert_eq!(session.message_count(), 0);
    assert_eq!(session.total_tokens(), 0);

    dispatch(&mut session, "/load mine", &mut renderer).await;
    assert_eq!(
        session.history(),
        &[Turn::user("hello"), Turn::assistant("hi")]
    );
}

#[tokio::test]
async fn stream_toggle_warns_without_streaming_backend() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::buffered(), dir.path());
    let mut renderer = RecordingRenderer::default();

    dispatch(&mut session, "/stream", &mut renderer).await;
    assert!(!session.config().stream());
    assert!(renderer.warnings().is_empty());

    dispatch(&mut session, "/stream", &mut renderer).await;
    assert!(session.config().stream());
    assert_eq!(renderer.warnings().len(), 1);
    assert!(renderer.warnings()[0].contains("cannot stream"));
}

#[tokio::test]
async fn show_config_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_in(ScriptedBackend::streaming(), dir.path());
    let mut renderer = RecordingRenderer::default();

    dispatch(&mut session, "/config", &mut renderer).await;
    dispatch(&mut session, "/stats", &mut renderer).await;
    let infos = renderer.infos();
    for key in ["max_tokens", "temperature", "top_p", "stream", "backend"] {
        assert!(infos[0].contains(key), "{key}");
    }
    assert!(infos[1].contains("messages     = 0"));
    assert!(infos[1].contains("http://localhost:9000"));
}

#[tokio::test]
async fn saved_names_always_appear_in_list() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::streaming();
    backend.reply(Reply::text(&["hi"]));
    let mut session = session_in(backend, dir.path());
    let mut renderer = RecordingRenderer::default();

    dispatch(&mut session, "hello", &mut renderer).await;
    dispatch(&mut session, "/save notes.txt", &mut renderer).await;
    dispatch(&mut session, "/save v1..2", &mut renderer).await;
    assert!(renderer.errors().is_empty());

    renderer.shown.clear();
    dispatch(&mut session, "/list", &mut renderer).await;
    let listing = renderer.infos()[0].to_string();
    assert!(listing.contains("notes.txt.json"));
    assert!(listing.contains("v1..2.json"));

    dispatch(&mut session, "/load notes.txt", &mut renderer).await;
    assert!(renderer.errors().is_empty());
}

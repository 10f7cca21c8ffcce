//! End-to-end chat flows against a mock backend

use fin_assist_cli::bootstrap::{self, AuthState};
use fin_assist_cli::controller::{CONNECT_ERROR_NOTICE, SESSION_EXPIRED_NOTICE};
use fin_assist_cli::render::render_plain;
use fin_assist_cli::{ApiClient, ChatController};
use fin_assist_core::storage::{BROWSER_ID_KEY, TOKEN_KEY};
use fin_assist_core::{ChatMessage, FileStore, KeyValueStore, Reply, SessionToken};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn logged_in_store(dir: &TempDir) -> Arc<FileStore> {
    let store = FileStore::open(dir.path()).unwrap();
    store.set_token(&SessionToken::new("tok-e2e")).unwrap();
    Arc::new(store)
}

fn client(url: &str, store: &dyn KeyValueStore) -> ApiClient {
    ApiClient::new(url, Duration::from_secs(5))
        .unwrap()
        .with_token(store.token())
}

#[tokio::test]
async fn test_conversation_sends_growing_history() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let store = logged_in_store(&dir);
    let browser_id = store.client_id().unwrap();
    let api = client(&server.url(), store.as_ref());

    let first = server
        .mock("POST", "/query")
        .match_header("authorization", "Bearer tok-e2e")
        .match_body(Matcher::Json(json!({
            "query": "list my groups",
            "chat_history": [],
            "browser_id": browser_id
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "type": "list", "result": ["Flat", "Trip"]}"#)
        .create_async()
        .await;

    let mut controller =
        ChatController::new(store.clone(), true).with_browser_id(Some(browser_id.clone()));
    let reply = controller.submit("list my groups", &api).await.cloned();
    first.assert_async().await;
    assert_eq!(
        reply,
        Some(Reply::List(vec!["Flat".to_string(), "Trip".to_string()]))
    );

    let second = server
        .mock("POST", "/query")
        .match_body(Matcher::Json(json!({
            "query": "balances in Trip?",
            "chat_history": [
                {"user": "list my groups"},
                {"server": "Flat\nTrip"}
            ],
            "browser_id": browser_id
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"success": true, "type": "table", "result": [["Friend", "Balance"], ["Ann", "$5"]]}"#,
        )
        .create_async()
        .await;

    let reply = controller.submit("balances in Trip?", &api).await.cloned();
    second.assert_async().await;

    let reply = reply.unwrap();
    assert_eq!(render_plain(&reply), "Friend │ Balance\nAnn    │ $5");
    assert_eq!(controller.history().len(), 4);
    assert!(!controller.is_loading());
}

#[tokio::test]
async fn test_expired_session_removes_persisted_token() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let store = logged_in_store(&dir);
    let api = client(&server.url(), store.as_ref());

    let mock = server
        .mock("POST", "/query")
        .with_status(401)
        .with_body(r#"{"detail": "Invalid token"}"#)
        .create_async()
        .await;

    let mut controller = ChatController::new(store.clone(), true);
    let reply = controller.submit("what do I owe?", &api).await.cloned();
    mock.assert_async().await;

    assert_eq!(reply, Some(Reply::Text(SESSION_EXPIRED_NOTICE.to_string())));
    assert!(!controller.is_authenticated());

    let on_disk = std::fs::read_to_string(store.path()).unwrap();
    assert!(!on_disk.contains(TOKEN_KEY));

    let reopened = FileStore::open(dir.path()).unwrap();
    assert!(reopened.token().is_none());
}

#[tokio::test]
async fn test_blank_input_never_reaches_backend() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let store = logged_in_store(&dir);
    let api = client(&server.url(), store.as_ref());

    let mock = server
        .mock("POST", "/query")
        .expect(0)
        .create_async()
        .await;

    let mut controller = ChatController::new(store.clone(), true);
    assert!(controller.submit("   \n\t", &api).await.is_none());
    assert!(controller.history().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_backend_failure_reason_is_shown() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let store = logged_in_store(&dir);
    let api = client(&server.url(), store.as_ref());

    server
        .mock("POST", "/query")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": false, "error": "Splitwise is unavailable"}"#)
        .create_async()
        .await;

    let mut controller = ChatController::new(store.clone(), true);
    controller.submit("hi", &api).await;

    match controller.history().last() {
        Some(ChatMessage::Server { reply, .. }) => {
            assert_eq!(render_plain(reply), "Error: Splitwise is unavailable");
        }
        other => panic!("unexpected last message: {:?}", other),
    }
    assert!(controller.is_authenticated());
}

#[tokio::test]
async fn test_unreachable_backend_keeps_session() {
    let dir = TempDir::new().unwrap();
    let store = logged_in_store(&dir);
    let api = client("http://127.0.0.1:9", store.as_ref());

    let mut controller = ChatController::new(store.clone(), true);
    let reply = controller.submit("hi", &api).await.cloned();

    assert_eq!(reply, Some(Reply::Text(CONNECT_ERROR_NOTICE.to_string())));
    assert!(!controller.is_loading());
    assert!(store.token().is_some());
}

#[tokio::test]
async fn test_bootstrap_then_chat() {
    let mut server = Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let store = logged_in_store(&dir);
    let api = client(&server.url(), store.as_ref());

    server
        .mock("GET", "/me")
        .match_header("authorization", "Bearer tok-e2e")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"username": "sam"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/query")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "result": "You are **all settled**."}"#)
        .create_async()
        .await;

    let state = bootstrap::restore(store.as_ref());
    let state = bootstrap::verify(store.as_ref(), &api, state).await;
    let AuthState::Verified { profile, .. } = &state else {
        panic!("expected verified session, got {:?}", state);
    };
    assert_eq!(bootstrap::display_name(profile).as_deref(), Some("sam"));

    let mut controller = ChatController::new(store.clone(), state.is_authenticated());
    let reply = controller.submit("am I settled?", &api).await.cloned().unwrap();
    assert_eq!(render_plain(&reply), "You are all settled.");

    assert!(store.get(BROWSER_ID_KEY).is_none());
}

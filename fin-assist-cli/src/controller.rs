//! Chat session controller
//!
//! Owns the conversation state and turns backend outcomes into history
//! entries. A submission is split into [`ChatController::prepare`] and
//! [`ChatController::complete`] so the interactive UI can run the request
//! on a spawned task; [`ChatController::submit`] runs both inline.

use crate::client::{Backend, ClientError, QueryRequest, QueryResponse};
use fin_assist_core::message::context_entries;
use fin_assist_core::{ChatMessage, KeyValueStore, Reply, SessionToken};
use std::sync::Arc;
use tracing::{info, warn};

pub const SESSION_EXPIRED_NOTICE: &str = "Your session has expired. Please log in again.";
pub const CONNECT_ERROR_NOTICE: &str =
    "Error: Could not connect to server. Please make sure the backend is running.";
pub const INVALID_RESPONSE_NOTICE: &str = "Error: Invalid response from server";
const DEFAULT_ERROR_REASON: &str = "Unknown error";

/// Conversation state owned by the controller
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    /// Ordered, append-only message history
    pub history: Vec<ChatMessage>,
    /// Pending input buffer
    pub input: String,
    /// A query is in flight
    pub loading: bool,
    pub authenticated: bool,
}

pub struct ChatController {
    state: ChatState,
    store: Arc<dyn KeyValueStore>,
    browser_id: Option<String>,
    /// Token the backend client sends, if known
    token: Option<SessionToken>,
}

impl ChatController {
    pub fn new(store: Arc<dyn KeyValueStore>, authenticated: bool) -> Self {
        Self {
            state: ChatState {
                authenticated,
                ..ChatState::default()
            },
            store,
            browser_id: None,
            token: None,
        }
    }

    /// Send this client id with every query
    pub fn with_browser_id(mut self, browser_id: Option<String>) -> Self {
        self.browser_id = browser_id;
        self
    }

    /// Record the token the backend client sends. A rejected token then
    /// only clears storage when it is the stored one.
    pub fn with_token(mut self, token: Option<SessionToken>) -> Self {
        self.token = token;
        self
    }

    /// Start from a previously saved history
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.state.history = history;
        self
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.state.history
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.state.authenticated = authenticated;
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.state.input
    }

    /// Append a plain-text notice to the history
    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.state.history.push(ChatMessage::notice(text));
    }

    /// Forget history, used by the UI's clear command
    pub fn clear_history(&mut self) {
        self.state.history.clear();
    }

    /// Begin a submission.
    ///
    /// Returns `None` without touching state when the input is blank or a
    /// query is already in flight. Otherwise the request carries the history
    /// as it was before this query, the user message is appended and the
    /// loading gate is closed.
    pub fn prepare(&mut self, input: &str) -> Option<QueryRequest> {
        let query = input.trim();
        if query.is_empty() || self.state.loading {
            return None;
        }

        let request = QueryRequest {
            query: query.to_string(),
            chat_history: context_entries(&self.state.history),
            browser_id: self.browser_id.clone(),
        };
        self.state.history.push(ChatMessage::user(query));
        self.state.input.clear();
        self.state.loading = true;
        Some(request)
    }

    /// Finish a submission with the backend's outcome
    pub fn complete(&mut self, result: Result<QueryResponse, ClientError>) {
        self.state.loading = false;

        let message = match result {
            Ok(response) if response.success => ChatMessage::server(response.reply()),
            Ok(response) => {
                let reason = response
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_ERROR_REASON.to_string());
                warn!("Backend reported failure: {}", reason);
                ChatMessage::notice(format!("Error: {}", reason))
            }
            Err(ClientError::Unauthorized) => {
                info!("Session rejected by backend, clearing stored token");
                self.expire_session(false);
                ChatMessage::notice(SESSION_EXPIRED_NOTICE)
            }
            Err(ClientError::Http { status }) => {
                ChatMessage::notice(format!("Error: HTTP error (status {})", status))
            }
            Err(ClientError::Connect(e)) => {
                warn!("Backend unreachable: {}", e);
                ChatMessage::notice(CONNECT_ERROR_NOTICE)
            }
            Err(ClientError::Decode(e)) => {
                warn!("Backend sent an unreadable response: {}", e);
                ChatMessage::notice(INVALID_RESPONSE_NOTICE)
            }
        };
        self.state.history.push(message);
    }

    /// Submit one query: a single attempt, no retry
    pub async fn submit(&mut self, input: &str, backend: &dyn Backend) -> Option<&Reply> {
        let request = self.prepare(input)?;
        let result = backend.query(&request).await;
        self.complete(result);
        match self.state.history.last() {
            Some(ChatMessage::Server { reply, .. }) => Some(reply),
            _ => None,
        }
    }

    /// Drop the session locally; history is kept
    pub fn logout(&mut self) {
        self.expire_session(true);
    }

    fn expire_session(&mut self, forget_stored: bool) {
        let cleared = match (&self.token, forget_stored) {
            (Some(rejected), false) => self.store.discard_token(rejected),
            _ => self.store.clear_token(),
        };
        if let Err(e) = cleared {
            warn!("Failed to clear stored token: {}", e);
        }
        self.state.authenticated = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fin_assist_core::storage::TOKEN_KEY;
    use fin_assist_core::{ContextEntry, MemoryStore};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Backend double that replays one outcome and records requests
    struct Recorder {
        outcome: Result<QueryResponse, ClientError>,
        requests: Mutex<Vec<QueryRequest>>,
    }

    impl Recorder {
        fn new(outcome: Result<QueryResponse, ClientError>) -> Self {
            Self {
                outcome,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Backend for Recorder {
        async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError> {
            self.requests.lock().unwrap().push(request.clone());
            self.outcome.clone()
        }

        async fn me(&self) -> Result<Value, ClientError> {
            Ok(json!({}))
        }
    }

    fn response(value: Value) -> QueryResponse {
        serde_json::from_value(value).unwrap()
    }

    fn controller() -> (ChatController, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.set_token(&SessionToken::new("tok")).unwrap();
        (ChatController::new(store.clone(), true), store)
    }

    fn last_text(controller: &ChatController) -> String {
        match controller.history().last() {
            Some(ChatMessage::Server { reply, .. }) => reply.context_text(),
            other => panic!("expected a server message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_input_does_nothing() {
        let (mut controller, _) = controller();
        let backend = Recorder::new(Ok(response(json!({ "success": true, "result": "x" }))));

        assert!(controller.submit("", &backend).await.is_none());
        assert!(controller.submit("   \n\t", &backend).await.is_none());
        assert_eq!(backend.calls(), 0);
        assert!(controller.history().is_empty());
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_success_appends_one_typed_reply() {
        let (mut controller, _) = controller();
        let backend = Recorder::new(Ok(response(json!({
            "success": true,
            "type": "list",
            "result": ["x", "y"]
        }))));

        let reply = controller.submit("groups?", &backend).await.cloned();
        assert_eq!(reply, Some(Reply::List(vec!["x".into(), "y".into()])));
        assert_eq!(controller.history().len(), 2);
        assert!(!controller.is_loading());
    }

    #[tokio::test]
    async fn test_failure_uses_reason_or_default() {
        let (mut controller, _) = controller();
        let backend = Recorder::new(Ok(response(json!({
            "success": false,
            "result": "",
            "error": "Agent not initialized"
        }))));
        controller.submit("hi", &backend).await;
        assert_eq!(last_text(&controller), "Error: Agent not initialized");

        let backend = Recorder::new(Ok(response(json!({ "success": false }))));
        controller.submit("again", &backend).await;
        assert_eq!(last_text(&controller), "Error: Unknown error");
    }

    #[tokio::test]
    async fn test_unauthorized_clears_token() {
        let (mut controller, store) = controller();
        let backend = Recorder::new(Err(ClientError::Unauthorized));

        controller.submit("hi", &backend).await;
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(!controller.is_authenticated());
        assert_eq!(last_text(&controller), SESSION_EXPIRED_NOTICE);
    }

    #[tokio::test]
    async fn test_unauthorized_keeps_different_stored_token() {
        let store = Arc::new(MemoryStore::new());
        store.set_token(&SessionToken::new("stored-good")).unwrap();
        let mut controller = ChatController::new(store.clone(), true)
            .with_token(Some(SessionToken::new("config-bad")));
        let backend = Recorder::new(Err(ClientError::Unauthorized));

        controller.submit("hi", &backend).await;
        assert!(!controller.is_authenticated());
        assert_eq!(store.token(), Some(SessionToken::new("stored-good")));
        assert_eq!(last_text(&controller), SESSION_EXPIRED_NOTICE);
    }

    #[tokio::test]
    async fn test_unauthorized_clears_matching_stored_token() {
        let (controller, store) = controller();
        let mut controller = controller.with_token(Some(SessionToken::new("tok")));
        let backend = Recorder::new(Err(ClientError::Unauthorized));

        controller.submit("hi", &backend).await;
        assert!(store.token().is_none());
    }

    #[tokio::test]
    async fn test_network_failure_resets_loading() {
        let (mut controller, _) = controller();
        let backend = Recorder::new(Err(ClientError::Connect("refused".into())));

        controller.submit("hi", &backend).await;
        assert!(!controller.is_loading());
        assert!(last_text(&controller).contains("Could not connect to server"));
    }

    #[tokio::test]
    async fn test_http_error_mentions_status() {
        let (mut controller, _) = controller();
        let backend = Recorder::new(Err(ClientError::Http { status: 502 }));

        controller.submit("hi", &backend).await;
        assert_eq!(last_text(&controller), "Error: HTTP error (status 502)");
    }

    #[tokio::test]
    async fn test_context_is_history_before_submission() {
        let (mut controller, _) = controller();
        let backend = Recorder::new(Ok(response(json!({ "success": true, "result": "hello" }))));

        controller.submit("first", &backend).await;
        controller.submit("second", &backend).await;

        let requests = backend.requests.lock().unwrap();
        assert!(requests[0].chat_history.is_empty());
        assert_eq!(
            requests[1].chat_history,
            vec![
                ContextEntry::User("first".into()),
                ContextEntry::Server("hello".into()),
            ]
        );
        assert_eq!(requests[1].query, "second");
    }

    #[test]
    fn test_loading_gate_rejects_second_prepare() {
        let (mut controller, _) = controller();
        assert!(controller.prepare("one").is_some());
        assert!(controller.prepare("two").is_none());
        assert_eq!(controller.history().len(), 1);

        controller.complete(Err(ClientError::Connect("down".into())));
        assert!(controller.prepare("two").is_some());
    }

    #[test]
    fn test_prepare_trims_and_clears_input() {
        let (mut controller, _) = controller();
        controller.input_mut().push_str("  spend this month?  ");
        let input = controller.state().input.clone();
        let request = controller.prepare(&input).unwrap();
        assert_eq!(request.query, "spend this month?");
        assert!(controller.state().input.is_empty());
    }

    #[test]
    fn test_logout_keeps_history() {
        let (mut controller, store) = controller();
        controller.push_notice("welcome");
        controller.logout();
        assert!(store.token().is_none());
        assert!(!controller.is_authenticated());
        assert_eq!(controller.history().len(), 1);
    }
}

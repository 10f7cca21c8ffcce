//! HTTP client for the assistant backend

use async_trait::async_trait;
use fin_assist_core::{BuiltContext, ContextEntry, Reply, ReplyKind, SessionToken};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Failure kinds of a backend call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("session expired or invalid")]
    Unauthorized,

    #[error("HTTP error (status {status})")]
    Http { status: u16 },

    #[error("could not connect to server: {0}")]
    Connect(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Http {
                status: status.as_u16(),
            }
        } else {
            ClientError::Connect(e.to_string())
        }
    }
}

/// Body of `POST /query` and `POST /debug-context`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub query: String,
    pub chat_history: Vec<ContextEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_id: Option<String>,
}

/// Response of `POST /query`
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl QueryResponse {
    /// Typed reply of a successful response
    pub fn reply(&self) -> Reply {
        Reply::from_wire(ReplyKind::parse(self.kind.as_deref()), self.result.clone())
    }
}

/// Response of `GET /health`
#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub agent_initialized: bool,
    #[serde(default)]
    pub client_initialized: bool,
}

/// Calls the chat controller and session bootstrap depend on
#[async_trait]
pub trait Backend: Send + Sync {
    /// Submit a query with its chat history
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError>;

    /// Fetch the profile of the token's owner
    async fn me(&self) -> Result<Value, ClientError>;
}

pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<SessionToken>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: Option<SessionToken>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Diagnostic echo of the context the backend would build
    pub async fn debug_context(&self, request: &QueryRequest) -> Result<BuiltContext, ClientError> {
        let response = self.send(self.post("/debug-context").json(request)).await?;
        decode(response).await
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = self.send(self.get("/health")).await?;
        decode(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.client.post(self.url(path)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose()),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let response = builder.send().await.map_err(|e| {
            warn!("Backend request failed: {}", e);
            ClientError::from(e)
        })?;

        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Backend responded");
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl Backend for ApiClient {
    async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, ClientError> {
        debug!(
            history = request.chat_history.len(),
            "Submitting query to backend"
        );
        let response = self.send(self.post("/query").json(request)).await?;
        decode(response).await
    }

    async fn me(&self) -> Result<Value, ClientError> {
        let response = self.send(self.get("/me")).await?;
        decode(response).await
    }
}

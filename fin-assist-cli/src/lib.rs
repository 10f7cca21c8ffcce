//! Terminal chat client for the fin-assist financial assistant

pub mod bootstrap;
pub mod client;
pub mod controller;
pub mod render;
pub mod tui;

pub use client::{ApiClient, Backend, ClientError, QueryRequest, QueryResponse};
pub use controller::{ChatController, ChatState};

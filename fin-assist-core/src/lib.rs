//! Core types for fin-assist
//!
//! This crate provides the chat data model, the context window builder,
//! client-side storage, configuration and logging used by the
//! `fin-assist` terminal client.

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod message;
pub mod storage;
pub mod transcript;
pub mod utils;

pub use context::{BuiltContext, ContextPolicy, ContextWindow};
pub use error::{Error, Result};
pub use message::{ChatMessage, ContextEntry, Reply, ReplyKind};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SessionToken};

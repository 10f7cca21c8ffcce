//! Chat message data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declared type of a server reply, taken from the `type` field of a query response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyKind {
    Text,
    Markdown,
    Table,
    List,
    /// A type this client does not know how to render
    Other(String),
}

impl ReplyKind {
    /// Parse the wire `type` field. An absent field means plain text.
    pub fn parse(kind: Option<&str>) -> Self {
        match kind {
            None | Some("text") => ReplyKind::Text,
            Some("markdown") => ReplyKind::Markdown,
            Some("table") => ReplyKind::Table,
            Some("list") => ReplyKind::List,
            Some(other) => ReplyKind::Other(other.to_string()),
        }
    }
}

/// A typed server reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Reply {
    Text(String),
    Markdown(String),
    Table(Vec<Vec<String>>),
    List(Vec<String>),
    Unsupported { kind: String, raw: String },
}

impl Reply {
    /// Build a reply from the declared kind and the raw `result` payload.
    ///
    /// Table and list payloads may arrive either as JSON arrays or as a
    /// string holding a JSON array. A payload that does not have the
    /// declared shape degrades to markdown of its text.
    pub fn from_wire(kind: ReplyKind, result: Option<Value>) -> Self {
        let result = result.unwrap_or(Value::Null);
        match kind {
            ReplyKind::Text => Reply::Text(value_text(&result)),
            ReplyKind::Markdown => Reply::Markdown(value_text(&result)),
            ReplyKind::Table => match table_rows(&structured(&result)) {
                Some(rows) => Reply::Table(rows),
                None => Reply::Markdown(value_text(&result)),
            },
            ReplyKind::List => match list_items(&structured(&result)) {
                Some(items) => Reply::List(items),
                None => Reply::Markdown(value_text(&result)),
            },
            ReplyKind::Other(kind) => Reply::Unsupported {
                kind,
                raw: value_text(&result),
            },
        }
    }

    /// Text sent back to the backend when this reply is part of the chat history
    pub fn context_text(&self) -> String {
        match self {
            Reply::Text(text) | Reply::Markdown(text) => text.clone(),
            Reply::Table(rows) => rows
                .iter()
                .map(|row| row.join(" | "))
                .collect::<Vec<_>>()
                .join("\n"),
            Reply::List(items) => items.join("\n"),
            Reply::Unsupported { raw, .. } => raw.clone(),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn structured(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

fn table_rows(value: &Value) -> Option<Vec<Vec<String>>> {
    value
        .as_array()?
        .iter()
        .map(|row| row.as_array().map(|cells| cells.iter().map(value_text).collect()))
        .collect()
}

fn list_items(value: &Value) -> Option<Vec<String>> {
    Some(value.as_array()?.iter().map(value_text).collect())
}

/// One element of the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ChatMessage {
    User {
        text: String,
        timestamp: DateTime<Utc>,
    },
    Server {
        reply: Reply,
        timestamp: DateTime<Utc>,
    },
}

impl ChatMessage {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage::User {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a server message
    pub fn server(reply: Reply) -> Self {
        ChatMessage::Server {
            reply,
            timestamp: Utc::now(),
        }
    }

    /// Create a plain-text server message, used for notices and errors
    pub fn notice(text: impl Into<String>) -> Self {
        Self::server(Reply::Text(text.into()))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ChatMessage::User { timestamp, .. } | ChatMessage::Server { timestamp, .. } => {
                *timestamp
            }
        }
    }

    /// Map to the `{user}` / `{server}` shape sent as chat history
    pub fn to_context_entry(&self) -> ContextEntry {
        match self {
            ChatMessage::User { text, .. } => ContextEntry::User(text.clone()),
            ChatMessage::Server { reply, .. } => ContextEntry::Server(reply.context_text()),
        }
    }
}

/// Wire shape of one history element: exactly `{"user": ...}` or `{"server": ...}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextEntry {
    User(String),
    Server(String),
}

impl ContextEntry {
    pub fn text(&self) -> &str {
        match self {
            ContextEntry::User(text) | ContextEntry::Server(text) => text,
        }
    }
}

/// Snapshot a history as context entries
pub fn context_entries(history: &[ChatMessage]) -> Vec<ContextEntry> {
    history.iter().map(ChatMessage::to_context_entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_kind_parse() {
        assert_eq!(ReplyKind::parse(None), ReplyKind::Text);
        assert_eq!(ReplyKind::parse(Some("text")), ReplyKind::Text);
        assert_eq!(ReplyKind::parse(Some("markdown")), ReplyKind::Markdown);
        assert_eq!(ReplyKind::parse(Some("table")), ReplyKind::Table);
        assert_eq!(ReplyKind::parse(Some("list")), ReplyKind::List);
        assert_eq!(
            ReplyKind::parse(Some("chart")),
            ReplyKind::Other("chart".to_string())
        );
    }

    #[test]
    fn test_table_from_array() {
        let reply = Reply::from_wire(ReplyKind::Table, Some(json!([["a", "b"], ["c", 4]])));
        assert_eq!(
            reply,
            Reply::Table(vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string(), "4".to_string()],
            ])
        );
    }

    #[test]
    fn test_list_from_json_string() {
        let reply = Reply::from_wire(ReplyKind::List, Some(json!(r#"["x","y"]"#)));
        assert_eq!(reply, Reply::List(vec!["x".to_string(), "y".to_string()]));
    }

    #[test]
    fn test_misshapen_table_degrades_to_markdown() {
        let reply = Reply::from_wire(ReplyKind::Table, Some(json!("no rows here")));
        assert_eq!(reply, Reply::Markdown("no rows here".to_string()));
    }

    #[test]
    fn test_unknown_kind_keeps_raw_text() {
        let reply = Reply::from_wire(ReplyKind::parse(Some("chart")), Some(json!("data")));
        assert_eq!(
            reply,
            Reply::Unsupported {
                kind: "chart".to_string(),
                raw: "data".to_string()
            }
        );
    }

    #[test]
    fn test_context_entry_wire_shape() {
        let history = vec![
            ChatMessage::user("who owes me?"),
            ChatMessage::server(Reply::Table(vec![vec!["Ann".into(), "$5".into()]])),
        ];
        let value = serde_json::to_value(context_entries(&history)).unwrap();
        assert_eq!(
            value,
            json!([{ "user": "who owes me?" }, { "server": "Ann | $5" }])
        );
    }

    #[test]
    fn test_list_context_text() {
        let reply = Reply::List(vec!["one".into(), "two".into()]);
        assert_eq!(reply.context_text(), "one\ntwo");
    }
}

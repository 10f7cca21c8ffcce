//! Chat context window
//!
//! Builds the prompt context the backend prepends to each query: the most
//! recent turns verbatim, long assistant turns shortened, and a one-line
//! summary of the user topics that fell out of the window.

use crate::message::ContextEntry;
use crate::utils::{take_chars, truncate_chars};
use serde::{Deserialize, Serialize};

/// Limits applied when building a context window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPolicy {
    /// Number of most recent entries kept verbatim
    #[serde(default = "default_max_recent")]
    pub max_recent: usize,
    /// Maximum number of earlier user topics in the summary line
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,
    /// Characters kept from each earlier user message
    #[serde(default = "default_topic_chars")]
    pub topic_chars: usize,
    /// Characters kept from each recent assistant message
    #[serde(default = "default_assistant_chars")]
    pub assistant_chars: usize,
}

fn default_max_recent() -> usize {
    10
}

fn default_max_topics() -> usize {
    5
}

fn default_topic_chars() -> usize {
    100
}

fn default_assistant_chars() -> usize {
    500
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self {
            max_recent: default_max_recent(),
            max_topics: default_max_topics(),
            topic_chars: default_topic_chars(),
            assistant_chars: default_assistant_chars(),
        }
    }
}

/// Result of building a context window, mirroring the `/debug-context` report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltContext {
    pub original_query: String,
    pub chat_history_length: usize,
    pub context_built: String,
    pub full_query: String,
    pub context_length: usize,
}

/// Context window builder
pub struct ContextWindow;

impl ContextWindow {
    /// Build the context for `query` from `history`
    pub fn build(history: &[ContextEntry], query: &str, policy: &ContextPolicy) -> BuiltContext {
        let context = Self::context_for(history, policy);
        let full_query = format!("{}{}", context, query);

        BuiltContext {
            original_query: query.to_string(),
            chat_history_length: history.len(),
            context_length: full_query.chars().count(),
            context_built: context,
            full_query,
        }
    }

    fn context_for(history: &[ContextEntry], policy: &ContextPolicy) -> String {
        if history.is_empty() {
            return String::new();
        }

        let split = history.len().saturating_sub(policy.max_recent);
        let (earlier, recent) = history.split_at(split);

        let mut context = String::new();
        if !earlier.is_empty() {
            let topics: Vec<&str> = earlier
                .iter()
                .filter_map(|entry| match entry {
                    ContextEntry::User(text) => Some(take_chars(text, policy.topic_chars)),
                    ContextEntry::Server(_) => None,
                })
                .take(policy.max_topics)
                .collect();
            context.push_str(&format!(
                "Earlier conversation covered: {}...\n\n",
                topics.join(", ")
            ));
        }

        context.push_str("Recent conversation:\n");
        for entry in recent {
            match entry {
                ContextEntry::User(text) => {
                    context.push_str(&format!("User: {}\n", text));
                }
                ContextEntry::Server(text) => {
                    context.push_str(&format!(
                        "Assistant: {}\n",
                        truncate_chars(text, policy.assistant_chars)
                    ));
                }
            }
        }
        context.push_str("\nCurrent query: ");
        context
    }
}

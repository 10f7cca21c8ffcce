//! On-disk chat transcript (JSONL, one message per line)

use crate::message::ChatMessage;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Persists chat history between runs
#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    /// Transcript stored at `<dir>/transcript.jsonl`
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            path: dir.as_ref().join("transcript.jsonl"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every readable message; malformed lines are skipped
    pub fn load(&self) -> crate::Result<Vec<ChatMessage>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let mut messages = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ChatMessage>(line) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!(line = idx + 1, "Skipping malformed transcript line: {}", e),
            }
        }
        Ok(messages)
    }

    /// Append messages to the end of the transcript
    pub fn append(&self, messages: &[ChatMessage]) -> crate::Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for msg in messages {
            writeln!(file, "{}", serde_json::to_string(msg)?)?;
        }
        Ok(())
    }

    /// Delete the transcript
    pub fn clear(&self) -> crate::Result<bool> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

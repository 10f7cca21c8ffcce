//! Renderer dispatch: maps a reply's declared type to a rendering strategy
//!
//! All functions here are pure. Text and markdown replies go through the
//! markdown renderer, tables and lists are laid out directly, and reply
//! types this client does not know render nothing.

mod markdown;
mod table;

use fin_assist_core::{ChatMessage, Reply};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use tracing::debug;

const LIST_BULLET: &str = "• ";

/// Render a server reply
pub fn render_reply(reply: &Reply) -> Vec<Line<'static>> {
    match reply {
        Reply::Text(text) | Reply::Markdown(text) => markdown::markdown_lines(text),
        Reply::Table(rows) => table::table_lines(rows),
        Reply::List(items) => items
            .iter()
            .map(|item| {
                Line::from(vec![
                    Span::styled(LIST_BULLET, Style::default().fg(Color::Green)),
                    Span::raw(item.clone()),
                ])
            })
            .collect(),
        Reply::Unsupported { kind, .. } => {
            debug!(kind = %kind, "No renderer for reply type");
            Vec::new()
        }
    }
}

/// Render any history message; user text is shown verbatim
pub fn render_message(message: &ChatMessage) -> Vec<Line<'static>> {
    match message {
        ChatMessage::User { text, .. } => text
            .lines()
            .map(|line| Line::raw(line.to_string()))
            .collect(),
        ChatMessage::Server { reply, .. } => render_reply(reply),
    }
}

/// Unstyled text of a rendered line
pub fn line_text(line: &Line<'_>) -> String {
    line.spans.iter().map(|span| span.content.as_ref()).collect()
}

/// Render a reply to plain text for non-interactive output
pub fn render_plain(reply: &Reply) -> String {
    render_reply(reply)
        .iter()
        .map(line_text)
        .collect::<Vec<_>>()
        .join("\n")
}

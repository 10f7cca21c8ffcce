//! Interactive terminal chat

use crate::bootstrap::{self, AuthState};
use crate::client::{ApiClient, Backend, ClientError, QueryRequest, QueryResponse};
use crate::controller::{ChatController, SESSION_EXPIRED_NOTICE};
use crate::render::render_message;
use anyhow::Result;
use crossterm::event::{self, Event as CEvent, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use fin_assist_core::transcript::Transcript;
use fin_assist_core::{ChatMessage, KeyValueStore, Reply};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{backend::CrosstermBackend, Frame, Terminal};
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const HELP_TEXT: &str =
    "Ask about your expenses, groups and balances. Enter to send, Shift+Enter for newline. /clear /logout /quit";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TimelineKind {
    User,
    Assistant,
    System,
    Error,
}

impl TimelineKind {
    fn of(message: &ChatMessage) -> Self {
        match message {
            ChatMessage::User { .. } => TimelineKind::User,
            ChatMessage::Server {
                reply: Reply::Text(text),
                ..
            } if text.starts_with("Error: ") || text == SESSION_EXPIRED_NOTICE => {
                TimelineKind::Error
            }
            ChatMessage::Server { .. } => TimelineKind::Assistant,
        }
    }

    fn label(self) -> (&'static str, Color) {
        match self {
            TimelineKind::User => ("you", Color::Cyan),
            TimelineKind::Assistant => ("assistant", Color::Green),
            TimelineKind::System => ("system", Color::Blue),
            TimelineKind::Error => ("error", Color::Red),
        }
    }
}

struct TimelineItem {
    kind: TimelineKind,
    lines: Vec<Line<'static>>,
}

/// Settings for an interactive session
pub struct TuiOptions {
    pub backend_url: String,
    /// Verification still pending (optimistic start)
    pub verify_in_background: bool,
    pub transcript: Option<Transcript>,
}

struct TuiApp {
    controller: ChatController,
    timeline: Vec<TimelineItem>,
    /// History entries already placed on the timeline
    rendered_upto: usize,
    /// History entries already written to the transcript
    persisted_upto: usize,
    transcript: Option<Transcript>,
    backend_url: String,
    user_label: Option<String>,
    scroll: u16,
    follow: bool,
    should_quit: bool,
}

impl TuiApp {
    fn new(controller: ChatController, options: TuiOptions, user_label: Option<String>) -> Self {
        let persisted_upto = controller.history().len();
        let mut app = Self {
            controller,
            timeline: Vec::new(),
            rendered_upto: 0,
            persisted_upto,
            transcript: options.transcript,
            backend_url: options.backend_url,
            user_label,
            scroll: 0,
            follow: true,
            should_quit: false,
        };
        app.add_system(HELP_TEXT);
        app.sync_history();
        if !app.controller.is_authenticated() {
            app.add_system("Not logged in. Run `fin-assist login` first.");
        }
        app
    }

    fn add_system(&mut self, text: impl Into<String>) {
        self.timeline.push(TimelineItem {
            kind: TimelineKind::System,
            lines: vec![Line::raw(text.into())],
        });
        self.follow = true;
    }

    /// Place new history entries on the timeline and persist them
    fn sync_history(&mut self) {
        let history = self.controller.history();
        for message in &history[self.rendered_upto..] {
            self.timeline.push(TimelineItem {
                kind: TimelineKind::of(message),
                lines: render_message(message),
            });
        }
        self.rendered_upto = history.len();

        if let Some(transcript) = &self.transcript {
            if let Err(e) = transcript.append(&history[self.persisted_upto..]) {
                warn!("Failed to save transcript: {}", e);
            }
        }
        self.persisted_upto = history.len();
        self.follow = true;
    }

    fn apply_result(&mut self, result: Result<QueryResponse, ClientError>) {
        let was_authenticated = self.controller.is_authenticated();
        self.controller.complete(result);
        self.sync_history();
        if was_authenticated && !self.controller.is_authenticated() {
            self.user_label = None;
            self.add_system("Run `fin-assist login` to sign in again.");
        }
    }

    fn apply_verification(&mut self, state: AuthState) {
        match state {
            AuthState::Verified { profile, .. } => {
                self.user_label = bootstrap::display_name(&profile);
            }
            AuthState::Anonymous => {
                self.controller.set_authenticated(false);
                self.user_label = None;
                self.add_system("Stored session is no longer valid. Run `fin-assist login`.");
            }
            AuthState::Unverified(_) => {}
        }
    }

    /// Handle Enter; returns a request to run when a query was accepted
    fn submit_input(&mut self) -> Option<QueryRequest> {
        let content = self.controller.state().input.trim().to_string();
        match content.as_str() {
            "" => None,
            "/quit" => {
                self.should_quit = true;
                None
            }
            "/clear" => {
                self.controller.input_mut().clear();
                if self.controller.is_loading() {
                    self.add_system("Wait for the current reply before clearing.");
                    return None;
                }
                self.controller.clear_history();
                self.timeline.clear();
                self.rendered_upto = 0;
                self.persisted_upto = 0;
                if let Some(transcript) = &self.transcript {
                    if let Err(e) = transcript.clear() {
                        warn!("Failed to clear transcript: {}", e);
                    }
                }
                self.scroll = 0;
                None
            }
            "/logout" => {
                self.controller.input_mut().clear();
                self.controller.logout();
                self.user_label = None;
                self.add_system("Logged out.");
                None
            }
            _ if !self.controller.is_authenticated() => {
                self.add_system("Not logged in. Run `fin-assist login` first.");
                None
            }
            _ => {
                let request = self.controller.prepare(&content);
                if request.is_some() {
                    self.sync_history();
                }
                request
            }
        }
    }

    fn status_line(&self) -> String {
        let auth = match (&self.user_label, self.controller.is_authenticated()) {
            (Some(name), true) => format!("signed in as {}", name),
            (None, true) => "signed in".to_string(),
            (_, false) => "signed out".to_string(),
        };
        let status = if self.controller.is_loading() {
            "processing"
        } else {
            "idle"
        };
        format!("backend: {} | {} | status: {}", self.backend_url, auth, status)
    }

    fn timeline_lines(&self) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for item in &self.timeline {
            let (label, color) = item.kind.label();
            lines.push(Line::from(Span::styled(
                format!("[{}]", label),
                Style::default().fg(color).add_modifier(Modifier::BOLD),
            )));
            lines.extend(item.lines.iter().cloned());
            lines.push(Line::default());
        }
        if self.controller.is_loading() {
            lines.push(Line::styled(
                "assistant is thinking...",
                Style::default().fg(Color::DarkGray),
            ));
        }
        lines
    }
}

/// Run the interactive chat until the user quits
pub async fn run_tui(
    controller: ChatController,
    api: Arc<ApiClient>,
    store: Arc<dyn KeyValueStore>,
    auth: AuthState,
    options: TuiOptions,
) -> Result<()> {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<QueryRequest>();
    let (result_tx, mut result_rx) =
        mpsc::unbounded_channel::<Result<QueryResponse, ClientError>>();
    let (auth_tx, mut auth_rx) = mpsc::unbounded_channel::<AuthState>();

    let worker_api = api.clone();
    let worker = tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let result = worker_api.query(&request).await;
            if result_tx.send(result).is_err() {
                break;
            }
        }
    });

    let user_label = match &auth {
        AuthState::Verified { profile, .. } => bootstrap::display_name(profile),
        _ => None,
    };
    if options.verify_in_background && matches!(auth, AuthState::Unverified(_)) {
        let verify_api = api.clone();
        let verify_store = store.clone();
        tokio::spawn(async move {
            let state = bootstrap::verify(verify_store.as_ref(), verify_api.as_ref(), auth).await;
            let _ = auth_tx.send(state);
        });
    }

    let mut app = TuiApp::new(controller, options, user_label);

    let mut stdout = io::stdout();
    enable_raw_mode()?;
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    info!("Interactive chat started");
    let outcome = event_loop(&mut terminal, &mut app, &request_tx, &mut result_rx, &mut auth_rx);

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    drop(request_tx);
    worker.abort();
    info!("Interactive chat stopped");
    outcome
}

fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    request_tx: &mpsc::UnboundedSender<QueryRequest>,
    result_rx: &mut mpsc::UnboundedReceiver<Result<QueryResponse, ClientError>>,
    auth_rx: &mut mpsc::UnboundedReceiver<AuthState>,
) -> Result<()> {
    loop {
        while let Ok(state) = auth_rx.try_recv() {
            app.apply_verification(state);
        }
        while let Ok(result) = result_rx.try_recv() {
            app.apply_result(result);
        }

        terminal.draw(|frame| draw(frame, app))?;

        if event::poll(std::time::Duration::from_millis(60))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        app.should_quit = true;
                    }
                    KeyCode::Esc => app.should_quit = true,
                    KeyCode::PageUp | KeyCode::Up => {
                        app.follow = false;
                        app.scroll = app.scroll.saturating_sub(1);
                    }
                    KeyCode::PageDown | KeyCode::Down => {
                        app.scroll = app.scroll.saturating_add(1);
                    }
                    KeyCode::End => app.follow = true,
                    KeyCode::Enter if key.modifiers.contains(KeyModifiers::SHIFT) => {
                        app.controller.input_mut().push('\n');
                    }
                    KeyCode::Enter => {
                        if let Some(request) = app.submit_input() {
                            if request_tx.send(request).is_err() {
                                app.apply_result(Err(ClientError::Connect(
                                    "request worker stopped".to_string(),
                                )));
                            }
                        }
                    }
                    KeyCode::Backspace => {
                        app.controller.input_mut().pop();
                    }
                    KeyCode::Char(ch) => {
                        app.controller.input_mut().push(ch);
                    }
                    _ => {}
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn draw(frame: &mut Frame, app: &mut TuiApp) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(5),
        ])
        .split(frame.area());

    frame.render_widget(
        Paragraph::new(app.status_line())
            .block(Block::default().borders(Borders::ALL).title("fin-assist")),
        chunks[0],
    );

    // Lines are wrapped here so the row count used for scrolling is exact.
    let inner_width = chunks[1].width.saturating_sub(2);
    let visible = chunks[1].height.saturating_sub(2);
    let lines = wrap_lines(app.timeline_lines(), usize::from(inner_width));
    if app.follow {
        let total = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        app.scroll = total.saturating_sub(visible);
    }
    frame.render_widget(
        Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("conversation"))
            .scroll((app.scroll, 0)),
        chunks[1],
    );

    let input = app.controller.state().input.clone();
    let (cursor_x, cursor_y) = input_cursor(&input, chunks[2].width, chunks[2].height);
    frame.render_widget(
        Paragraph::new(input)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("message (Enter send, Shift+Enter newline)"),
            )
            .wrap(Wrap { trim: false }),
        chunks[2],
    );
    frame.set_cursor_position((chunks[2].x + 1 + cursor_x, chunks[2].y + 1 + cursor_y));
}

/// Cursor offset inside a bordered input box of the given size
fn input_cursor(input: &str, width: u16, height: u16) -> (u16, u16) {
    let last_line = input.rsplit('\n').next().unwrap_or("");
    let x = u16::try_from(last_line.width()).unwrap_or(u16::MAX);
    let y = u16::try_from(input.matches('\n').count()).unwrap_or(u16::MAX);
    (
        x.min(width.saturating_sub(3)),
        y.min(height.saturating_sub(3)),
    )
}

/// Break lines wider than `width` into rows, keeping span styles
fn wrap_lines(lines: Vec<Line<'static>>, width: usize) -> Vec<Line<'static>> {
    let mut rows = Vec::with_capacity(lines.len());
    for line in lines {
        if width == 0 || line.width() <= width {
            rows.push(line);
            continue;
        }

        let line_style = line.style;
        let mut current: Vec<Span<'static>> = Vec::new();
        let mut used = 0;
        for span in line.spans {
            let mut chunk = String::new();
            for ch in span.content.chars() {
                let ch_width = ch.width().unwrap_or(0);
                if used + ch_width > width && used > 0 {
                    if !chunk.is_empty() {
                        current.push(Span::styled(std::mem::take(&mut chunk), span.style));
                    }
                    rows.push(Line::from(std::mem::take(&mut current)).style(line_style));
                    used = 0;
                }
                chunk.push(ch);
                used += ch_width;
            }
            if !chunk.is_empty() {
                current.push(Span::styled(chunk, span.style));
            }
        }
        if !current.is_empty() {
            rows.push(Line::from(current).style(line_style));
        }
    }
    rows
}

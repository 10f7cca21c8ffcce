//! CLI entry point for fin-assist

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, Input, Password};
use fin_assist_cli::bootstrap::{self, AuthState};
use fin_assist_cli::render::render_plain;
use fin_assist_cli::tui::{run_tui, TuiOptions};
use fin_assist_cli::{ApiClient, Backend, ChatController, ClientError, QueryRequest};
use fin_assist_core::config::{Config, ConfigLoader};
use fin_assist_core::logging::init_logging;
use fin_assist_core::message::context_entries;
use fin_assist_core::transcript::Transcript;
use fin_assist_core::utils::expand_tilde;
use fin_assist_core::{
    ChatMessage, ContextWindow, FileStore, KeyValueStore, MemoryStore, SessionToken,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fin-assist")]
#[command(about = "Chat with your financial assistant from the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Keep the session in memory only, nothing is written to storage.json
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration
    Init,
    /// Launch the interactive chat
    Chat,
    /// Send a single query and print the reply
    Ask {
        /// Query to send
        #[arg(short, long)]
        message: String,
    },
    /// Store a session token after checking it with the backend
    Login {
        /// Token to use instead of prompting
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Forget the stored session token
    Logout,
    /// Show backend, session and configuration status
    Status,
    /// Show the context window built for a query
    Context {
        /// Query to build the context for
        #[arg(short, long)]
        message: String,
        /// Ask the backend's /debug-context instead of building locally
        #[arg(short, long)]
        remote: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    if let Commands::Init = cli.command {
        return run_init(&config_loader);
    }

    let config = config_loader.load()?;
    let log_dir = resolve_log_dir(&config_loader, &config);
    std::fs::create_dir_all(&log_dir)?;
    let _log_guard = init_logging(&config.logging, &log_dir, cli.verbose);

    let store = open_store(&config_loader, cli.ephemeral)?;

    match cli.command {
        Commands::Init => {}
        Commands::Chat => {
            info!("Starting interactive chat");
            run_chat(&config_loader, &config, store).await?;
        }
        Commands::Ask { message } => {
            info!("Running one-shot query");
            run_ask(&config_loader, &config, store, &message).await?;
        }
        Commands::Login { token } => {
            info!("Logging in");
            run_login(&config, store.as_ref(), token).await?;
        }
        Commands::Logout => {
            info!("Logging out");
            run_logout(store.as_ref())?;
        }
        Commands::Status => {
            info!("Showing status");
            run_status(&config_loader, &config, store.as_ref()).await?;
        }
        Commands::Context { message, remote } => {
            info!(remote, "Building context preview");
            run_context(&config_loader, &config, store.as_ref(), &message, remote).await?;
        }
    }

    Ok(())
}

/// Log directory; relative paths resolve against the config directory
fn resolve_log_dir(loader: &ConfigLoader, config: &Config) -> PathBuf {
    let dir = expand_tilde(&config.logging.dir);
    if dir.is_relative() {
        loader.config_dir().join(dir)
    } else {
        dir
    }
}

fn open_store(loader: &ConfigLoader, ephemeral: bool) -> Result<Arc<dyn KeyValueStore>> {
    if ephemeral {
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(FileStore::open(loader.config_dir())?))
}

/// Token from configuration wins over the stored one
fn initial_auth(config: &Config, store: &dyn KeyValueStore) -> AuthState {
    match config
        .session
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        Some(token) => AuthState::Unverified(SessionToken::new(token)),
        None => bootstrap::restore(store),
    }
}

fn build_client(config: &Config, token: Option<SessionToken>) -> Result<ApiClient> {
    let client = ApiClient::new(
        &config.backend.url,
        Duration::from_secs(config.backend.timeout_secs),
    )?;
    Ok(client.with_token(token))
}

fn client_id(store: &dyn KeyValueStore) -> Option<String> {
    match store.client_id() {
        Ok(id) => Some(id),
        Err(e) => {
            warn!("Failed to persist client id: {}", e);
            None
        }
    }
}

fn transcript_for(loader: &ConfigLoader, config: &Config) -> Option<Transcript> {
    config
        .history
        .save_transcript
        .then(|| Transcript::new(loader.config_dir()))
}

fn load_history(transcript: Option<&Transcript>) -> Vec<ChatMessage> {
    let Some(transcript) = transcript else {
        return Vec::new();
    };
    transcript.load().unwrap_or_else(|e| {
        warn!("Failed to load transcript: {}", e);
        Vec::new()
    })
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn print_not_logged_in() {
    println!(
        "{} Not logged in. Run {} first.",
        style("✗").red(),
        style("fin-assist login").cyan()
    );
}

/// Run the init wizard
fn run_init(loader: &ConfigLoader) -> Result<()> {
    println!("{}", style("Welcome to fin-assist!").bold().cyan());

    let config_path = loader.config_path();
    if config_path.exists() {
        let overwrite = Confirm::new()
            .with_prompt("Configuration already exists. Overwrite?")
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Init cancelled.");
            return Ok(());
        }
    }

    let mut config = Config::default();
    config.backend.url = Input::new()
        .with_prompt("Backend URL")
        .default(config.backend.url.clone())
        .interact_text()?;
    config.history.save_transcript = Confirm::new()
        .with_prompt("Keep the conversation between runs?")
        .default(false)
        .interact()?;

    loader.save(&config)?;

    println!(
        "\n{} {}",
        style("Configuration saved to").green().bold(),
        config_path.display()
    );
    println!("\nNext steps:");
    println!("  {} - Sign in", style("fin-assist login").cyan());
    println!("  {} - Start chatting", style("fin-assist chat").cyan());
    Ok(())
}

async fn run_chat(
    loader: &ConfigLoader,
    config: &Config,
    store: Arc<dyn KeyValueStore>,
) -> Result<()> {
    let auth = initial_auth(config, store.as_ref());
    let sent_token = auth.token().cloned();
    let api = Arc::new(build_client(config, sent_token.clone())?);

    let verify_first = config.session.verify_before_access;
    let auth = if verify_first && matches!(auth, AuthState::Unverified(_)) {
        let pb = spinner("Verifying session...");
        let state = bootstrap::verify(store.as_ref(), api.as_ref(), auth).await;
        pb.finish_and_clear();
        state
    } else {
        auth
    };

    let transcript = transcript_for(loader, config);
    let controller = ChatController::new(store.clone(), auth.is_authenticated())
        .with_token(sent_token)
        .with_browser_id(client_id(store.as_ref()))
        .with_history(load_history(transcript.as_ref()));

    let options = TuiOptions {
        backend_url: api.base_url().to_string(),
        verify_in_background: !verify_first,
        transcript,
    };
    run_tui(controller, api, store, auth, options).await
}

async fn run_ask(
    loader: &ConfigLoader,
    config: &Config,
    store: Arc<dyn KeyValueStore>,
    message: &str,
) -> Result<()> {
    let auth = initial_auth(config, store.as_ref());
    if !auth.is_authenticated() {
        print_not_logged_in();
        return Ok(());
    }
    let api = build_client(config, auth.token().cloned())?;

    let transcript = transcript_for(loader, config);
    let mut controller = ChatController::new(store.clone(), true)
        .with_token(auth.token().cloned())
        .with_browser_id(client_id(store.as_ref()))
        .with_history(load_history(transcript.as_ref()));
    let before = controller.history().len();

    let pb = spinner("Thinking...");
    let reply = controller.submit(message, &api).await.cloned();
    pb.finish_and_clear();

    match reply {
        Some(reply) => println!("{}", render_plain(&reply)),
        None => println!("Nothing to send."),
    }

    if let Some(transcript) = &transcript {
        if let Err(e) = transcript.append(&controller.history()[before..]) {
            warn!("Failed to save transcript: {}", e);
        }
    }
    Ok(())
}

async fn run_login(config: &Config, store: &dyn KeyValueStore, token: Option<String>) -> Result<()> {
    let raw = match token {
        Some(token) => token,
        None => Password::new().with_prompt("Session token").interact()?,
    };
    let token = SessionToken::new(raw);
    if token.expose().is_empty() {
        println!("{} Token is empty", style("✗").red());
        return Ok(());
    }

    let api = build_client(config, Some(token.clone()))?;
    let pb = spinner("Checking token...");
    let result = api.me().await;
    pb.finish_and_clear();

    match result {
        Ok(profile) => {
            store.set_token(&token)?;
            let name = bootstrap::display_name(&profile).unwrap_or_else(|| "unknown user".into());
            println!("{} Logged in as {}", style("✓").green().bold(), name);
        }
        Err(ClientError::Unauthorized) => {
            println!("{} Token was rejected by the backend", style("✗").red());
        }
        Err(e) => {
            println!("{} Login failed: {}", style("✗").red(), e);
        }
    }
    Ok(())
}

fn run_logout(store: &dyn KeyValueStore) -> Result<()> {
    if store.clear_token()? {
        println!("{} Logged out", style("✓").green().bold());
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

/// Show system status
async fn run_status(loader: &ConfigLoader, config: &Config, store: &dyn KeyValueStore) -> Result<()> {
    println!("{}", style("fin-assist Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config file: {}", loader.config_path().display());
    println!("  Log directory: {}", resolve_log_dir(loader, config).display());
    println!(
        "  Transcript: {}",
        if config.history.save_transcript {
            style("enabled").green()
        } else {
            style("disabled").dim()
        }
    );
    println!();

    let auth = initial_auth(config, store);
    let api = build_client(config, auth.token().cloned())?;

    println!("{}", style("Backend:").bold());
    println!("  URL: {}", api.base_url());
    match api.health().await {
        Ok(health) => {
            println!("  Status: {}", style(&health.status).green());
            println!("  Agent initialized: {}", health.agent_initialized);
            println!("  Client initialized: {}", health.client_initialized);
        }
        Err(e) => println!("  Status: {} ({})", style("unreachable").red(), e),
    }
    println!();

    println!("{}", style("Session:").bold());
    if !auth.is_authenticated() {
        println!("  {}", style("not logged in").dim());
        return Ok(());
    }
    match api.me().await {
        Ok(profile) => {
            let name = bootstrap::display_name(&profile).unwrap_or_else(|| "unknown user".into());
            println!("  {} as {}", style("valid").green(), name);
        }
        Err(ClientError::Unauthorized) => println!("  {}", style("expired").red()),
        Err(e) => println!("  {} ({})", style("unverified").yellow(), e),
    }
    Ok(())
}

async fn run_context(
    loader: &ConfigLoader,
    config: &Config,
    store: &dyn KeyValueStore,
    message: &str,
    remote: bool,
) -> Result<()> {
    let history = Transcript::new(loader.config_dir()).load()?;
    let request = QueryRequest {
        query: message.trim().to_string(),
        chat_history: context_entries(&history),
        browser_id: None,
    };

    let built = if remote {
        let auth = initial_auth(config, store);
        let api = build_client(config, auth.token().cloned())?;
        api.debug_context(&request).await?
    } else {
        ContextWindow::build(&request.chat_history, &request.query, &config.context)
    };

    println!("{}", style("Context window").bold().cyan());
    println!("  History entries: {}", built.chat_history_length);
    println!("  Length: {} characters\n", built.context_length);
    println!("{}", built.full_query);
    Ok(())
}

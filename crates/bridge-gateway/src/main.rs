//! llm-bridge: Bot Framework to LLM backend bridge
//!
//! Main entry point for the bridge.
//!
//! Usage:
//!   llm-bridge                   - Start the bot server
//!   llm-bridge --config <path>   - Start with a specific config file
//!   llm-bridge --help            - Show help

use std::path::PathBuf;
use std::sync::Arc;

use bridge_botframework::BotServer;
use bridge_core::{
    BackendProcess, Config, HttpBackend, InMemoryConversationLog, InMemorySessionRegistry,
    TurnHandler,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Bot server, optionally with an explicit config file
    Server { config: Option<PathBuf> },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = match parse_args(std::env::args().skip(1))? {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("llm-bridge {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server { config } => config,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting llm-bridge...");
    tracing::info!("Backend: {}", config.backend.chat_url());

    run_server(config).await
}

/// Parse command line arguments
fn parse_args<I>(args: I) -> anyhow::Result<RunMode>
where
    I: IntoIterator<Item = String>,
{
    let mut config = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                config = Some(PathBuf::from(path));
            }
            other => anyhow::bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(RunMode::Server { config })
}

/// Print help message
fn print_help() {
    println!("llm-bridge - Bot Framework to LLM backend bridge");
    println!();
    println!("Usage:");
    println!("  llm-bridge                   Start the bot server");
    println!("  llm-bridge --config <path>   Load configuration from <path>");
    println!("  llm-bridge --help            Show this help message");
    println!("  llm-bridge --version         Show version");
    println!();
    println!("Configuration is read from llm-bridge.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  HOST / PORT                  Bind address (default: 0.0.0.0:3978)");
    println!("  BACKEND_URL                  Backend base URL (default: http://127.0.0.1:8000)");
    println!("  BACKEND_CHAT_PATH            Chat endpoint path (default: /chat)");
    println!("  BACKEND_COMMAND              Command that starts the backend (optional)");
    println!("  BACKEND_WORKDIR              Working directory for BACKEND_COMMAND");
    println!("  SESSION_MAX                  Max sessions kept, 0 = unbounded (default: 0)");
    println!("  SESSION_IDLE_TIMEOUT_SECS    Idle session expiry, 0 = never (default: 0)");
    println!("  MicrosoftAppId               Bot Framework app id (optional)");
    println!("  MicrosoftAppPassword         Bot Framework app password (optional)");
    println!("  BOT_APOLOGY                  Reply sent when the backend fails");
}

/// Run the bot server until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    // Track background services for shutdown
    let mut service_handles = Vec::new();

    // Start the backend process if configured
    let backend_monitor = match &config.backend.command {
        Some(command) => {
            let process = BackendProcess::spawn(command, config.backend.workdir.as_deref())
                .map_err(|e| anyhow::anyhow!("Failed to start backend: {}", e))?;
            Some(process.monitor())
        }
        None => {
            tracing::info!("No backend command configured, using external backend");
            None
        }
    };

    let backend = HttpBackend::new(&config.backend)
        .map_err(|e| anyhow::anyhow!("Failed to create backend client: {}", e))?;

    if !backend
        .wait_until_ready(config.backend.ready_attempts, config.backend.ready_interval())
        .await
    {
        tracing::warn!("Continuing without a reachable backend; turns will be answered with the apology");
    }

    // Session state
    let limits = config.sessions.limits();
    let registry = Arc::new(InMemorySessionRegistry::with_limits(limits));
    let log = Arc::new(InMemoryConversationLog::new());

    let turn_handler = Arc::new(
        TurnHandler::new(registry, log, Arc::new(backend)).with_apology(config.bot.apology.clone()),
    );

    if limits.is_bounded() {
        let every = config.sessions.sweep_interval();
        service_handles.push(Arc::clone(&turn_handler).start_sweep_task(every));
        tracing::info!("Session sweep every {:?} ({:?})", every, limits);
    } else {
        tracing::info!("Session registry is unbounded");
    }

    // Start the bot server
    let (shutdown_tx, _) = broadcast::channel(1);
    let server = BotServer::new(&config, turn_handler)
        .map_err(|e| anyhow::anyhow!("Failed to create bot server: {}", e))?;
    let mut server_handle = tokio::spawn(server.run(shutdown_tx.subscribe()));

    tracing::info!("llm-bridge initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    let result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down...");
            let _ = shutdown_tx.send(());
            server_handle.await
        }
        finished = &mut server_handle => finished,
    };

    // Abort all services
    for handle in service_handles {
        handle.abort();
    }
    // Dropping the child kills the backend
    if let Some(monitor) = backend_monitor {
        monitor.abort();
    }

    match result {
        Ok(Ok(())) => {
            tracing::info!("Shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => Err(anyhow::anyhow!("Bot server error: {}", e)),
        Err(e) => Err(anyhow::anyhow!("Bot server task failed: {}", e)),
    }
}

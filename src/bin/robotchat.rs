//! robotchat binary: boundary server and terminal client.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use robotchat::credentials::ProcessEnv;
use robotchat::frontend::ChatFrontend;
use robotchat::speech::NoopSpeech;
use robotchat::stream::{EventStreamReader, StreamCallbacks};
use robotchat::{AppState, RobotChatClient, RobotChatConfig, RobotChatServer};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Voice/text chat front-end that turns AI replies into robot-arm actions.
#[derive(Parser)]
#[command(name = "robotchat", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true, env = "ROBOTCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run the HTTP boundary server.
    Serve {
        /// Override `server.host`.
        #[arg(long)]
        host: Option<String>,
        /// Override `server.port` (0 picks a free port).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Chat with a running server from the terminal.
    Chat {
        /// Server root; defaults to `server.host:server.port` from the config.
        #[arg(long, env = "ROBOTCHAT_SERVER")]
        server: Option<String>,
    },

    /// Send one message to the streaming chat proxy at `stream.base_url` and
    /// print the answer. The proxy is a separate service; `serve` does not
    /// provide it.
    Stream {
        /// Message to send.
        message: String,
        /// Continue an existing conversation.
        #[arg(long)]
        conversation_id: Option<String>,
        /// Endpoint name under `stream.base_url` (`chat` or `workflow`).
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Run the workflow endpoint once and print its JSON result.
    Workflow {
        /// Workflow query.
        query: String,
    },

    /// Write the default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RobotChatConfig> {
    if let Some(path) = path {
        return RobotChatConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()));
    }
    let default_path = RobotChatConfig::default_config_path();
    if default_path.is_file() {
        return RobotChatConfig::from_file(&default_path)
            .with_context(|| format!("loading {}", default_path.display()));
    }
    Ok(RobotChatConfig::default())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            token.cancel();
        }
    });
    cancel
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Chat { server: None });
    if let Command::InitConfig { force } = command {
        return init_config(cli.config, force);
    }

    let mut config = load_config(cli.config.as_ref())?;
    let _log_guard = robotchat::logging::init_tracing(&config.logging)?;

    match command {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_serve(config).await
        }
        Command::Chat { server } => run_chat(config, server).await,
        Command::Stream {
            message,
            conversation_id,
            endpoint,
        } => run_stream(config, &message, conversation_id.as_deref(), endpoint).await,
        Command::Workflow { query } => run_workflow(config, &query).await,
        Command::InitConfig { .. } => Ok(()),
    }
}

async fn run_serve(config: RobotChatConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config, &ProcessEnv)?;
    let server = RobotChatServer::start(state, &config.server).await?;
    println!("robotchat listening on {}", server.base_url());

    cancel_on_ctrl_c().cancelled().await;
    server.shutdown();
    info!("robotchat server stopped");
    Ok(())
}

async fn run_chat(config: RobotChatConfig, server: Option<String>) -> anyhow::Result<()> {
    let base_url = server
        .unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));
    let client = RobotChatClient::new(base_url);
    if !client.health().await {
        anyhow::bail!("no robotchat server at {}", client.base_url());
    }

    let speech = Arc::new(NoopSpeech::new(config.speech.lang.clone()));
    let mut frontend = ChatFrontend::from_config(client, speech, &config);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    frontend
        .run(stdin, tokio::io::stdout(), cancel_on_ctrl_c())
        .await?;
    Ok(())
}

async fn run_stream(
    config: RobotChatConfig,
    message: &str,
    conversation_id: Option<&str>,
    endpoint: Option<String>,
) -> anyhow::Result<()> {
    let mut reader = EventStreamReader::new(&config.stream);
    if let Some(endpoint) = endpoint {
        reader = reader.with_endpoint(endpoint);
    }

    let callbacks = StreamCallbacks::new()
        .on_message(|event| {
            if let Some(answer) = event.answer_text() {
                print!("{answer}");
                let _ = std::io::stdout().flush();
            }
        })
        .on_done(|| println!())
        .on_error(|e| eprintln!("\nstream error: {}", e.message()));

    let url = reader.url();
    let handle = reader.open(message, conversation_id, callbacks);
    let cancel = cancel_on_ctrl_c();
    let token = handle.cancel_token();
    tokio::spawn(async move {
        cancel.cancelled().await;
        token.cancel();
    });
    handle
        .completion()
        .await
        .with_context(|| format!("streaming chat proxy at {url} failed"))?;
    Ok(())
}

async fn run_workflow(config: RobotChatConfig, query: &str) -> anyhow::Result<()> {
    let reader = EventStreamReader::new(&config.stream);
    let result = reader.execute_workflow(query).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(RobotChatConfig::default_config_path);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    RobotChatConfig::default().save_to_file(&path)?;
    println!("wrote {}", path.display());
    Ok(())
}

//! gm-chat - Terminal Front End
//!
//! Line-oriented client for a game master session. Plain lines are sent as
//! user turns; `/help` lists the slash commands. Replies stream to stdout
//! as they arrive, logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (http://localhost:8000, ws://localhost:8000/ws)
//! gm-chat
//!
//! # Another server
//! gm-chat --server-url http://gm.lan:8000 --ws-url ws://gm.lan:8000/ws
//!
//! # Verbose connection logging
//! RUST_LOG=gm_session_core=debug gm-chat
//! ```

mod commands;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use gm_session_core::config::{self, ConfigOverrides};
use gm_session_core::{
    ChatSession, ConnectionState, HttpApi, IgnoreReason, RegenerateOutcome, SendOutcome,
    SessionEvent,
};

use crate::commands::{Command, HELP};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "gm-chat")]
#[command(author, version, about = "Terminal client for a game master session")]
struct Args {
    /// Base URL of the server's REST endpoints
    #[arg(long, env = "GM_SERVER_URL")]
    server_url: Option<String>,

    /// URL of the streaming endpoint
    #[arg(long, env = "GM_WS_URL")]
    ws_url: Option<String>,

    /// Config file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Delay between reconnect attempts, in milliseconds
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,
}

type Session = ChatSession<HttpApi>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = config::load_config_from_path(
        args.config.or_else(config::default_config_path),
    )
    .context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(url) = args.server_url {
        overrides = overrides.with_base_url(url);
    }
    if let Some(url) = args.ws_url {
        overrides = overrides.with_ws_url(url);
    }
    if let Some(ms) = args.reconnect_delay_ms {
        overrides = overrides.with_reconnect_delay_ms(ms);
    }
    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        base_url = %config.base_url,
        ws_url = %config.transport.ws_url,
        source = %config.source(),
        "Starting gm-chat"
    );

    let mut session = ChatSession::from_config(&config).context("Failed to create session")?;
    session.start().await;
    print_transcript(&session);
    notice("Type /help for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read input")? {
                    Some(line) => {
                        if !handle_line(&mut session, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = session.next_event() => {
                match event {
                    Some(event) => {
                        if !render_event(&event) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
                break;
            }
        }
    }

    session.dispose().await;
    info!("gm-chat stopped");
    Ok(())
}

/// Initialize logging to stderr so it does not interleave with replies
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gm_chat={level},gm_session_core={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Run one input line; `false` ends the session
async fn handle_line(session: &mut Session, line: &str) -> bool {
    let command = match commands::parse(line) {
        Ok(command) => command,
        Err(e) => {
            notice(&e.to_string());
            return true;
        }
    };

    let result = match command {
        Command::Say(text) => match session.send(&text) {
            Ok(SendOutcome::Sent { .. }) => Ok(()),
            Ok(SendOutcome::Ignored(IgnoreReason::Empty)) => Ok(()),
            Ok(SendOutcome::Ignored(IgnoreReason::Generating)) => {
                notice("Still replying, wait for the turn to finish");
                Ok(())
            }
            Ok(SendOutcome::Ignored(IgnoreReason::NotConnected)) => {
                notice("Not connected, message not sent");
                Ok(())
            }
            Err(e) => Err(e),
        },
        Command::Edit { id, content } => session.edit(id, &content).await.map(|()| {
            notice(&format!("Edited message {id}"));
        }),
        Command::Delete(id) => session.delete(id).await.map(|()| {
            notice(&format!("Deleted message {id}"));
        }),
        Command::Regenerate => session.regenerate().await.map(|outcome| {
            if outcome == RegenerateOutcome::Skipped {
                notice("Nothing to regenerate");
            }
        }),
        Command::History => {
            let result = session.reload_transcript().await;
            print_transcript(session);
            result
        }
        Command::Fields => {
            print_fields(session);
            Ok(())
        }
        Command::Set { field, value } => session.update_field(&field, &value).await.map(|()| {
            notice(&format!("{field} = {value}"));
        }),
        Command::Save => session.save_game().await.map(|()| notice("Game saved")),
        Command::Status => {
            print_status(session);
            Ok(())
        }
        Command::Help => {
            println!("{HELP}");
            Ok(())
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        warn!(error = %e, "Operation failed");
        notice(&format!("Error: {e}"));
    }
    true
}

/// Render one session event; `false` ends the session
fn render_event(event: &SessionEvent) -> bool {
    match event {
        SessionEvent::Connection(state) => match state {
            ConnectionState::Connected => notice("Connected"),
            ConnectionState::Disconnected => notice("Disconnected, retrying shortly"),
            ConnectionState::Connecting => {}
        },
        SessionEvent::TurnOpened { id } => {
            print!("[{id}] GM: ");
            flush();
        }
        SessionEvent::Fragment { text, .. } => {
            print!("{text}");
            flush();
        }
        SessionEvent::TurnCompleted { .. } => println!(),
        SessionEvent::TurnAbandoned => {
            println!();
            notice("Connection lost mid-reply");
        }
        SessionEvent::Resynced => {}
        SessionEvent::ExitRequested => {
            notice("The game master ended the session");
            return false;
        }
    }
    true
}

fn print_transcript(session: &Session) {
    for message in session.transcript().messages() {
        let marker = if message.provisional { "?" } else { "" };
        println!(
            "[{}{marker}] {}: {}",
            message.id, message.role, message.content
        );
    }
}

fn print_fields(session: &Session) {
    if session.fields().is_empty() {
        notice("No fields");
        return;
    }
    for (name, value) in session.fields() {
        println!("{name}: {value}");
    }
}

fn print_status(session: &Session) {
    println!("connection: {}", session.connection_state());
    println!("messages:   {}", session.transcript().len());
    println!("next id:    {}", session.next_id());
    println!("generating: {}", session.is_generating());
}

fn notice(text: &str) {
    println!("* {text}");
}

fn flush() {
    // Partial lines need an explicit flush
    let _ = std::io::stdout().flush();
}

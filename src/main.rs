use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use voice_relay::{
    BridgeConfig, ConversationEntry, EntryKind, MarkdownExporter, RelayClient, ResponseModality,
    SessionBridge, TranscriptExporter, create_session,
};

/// How long to wait for in-flight relay calls when the chat ends.
const DISPATCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Voice Relay - realtime AI session bridge with relay dispatch
#[derive(Parser, Debug)]
#[command(name = "voice-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `chat`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a text-mode session and send stdin lines as user turns
    Chat {
        /// Write a Markdown transcript to this file on exit
        #[arg(short = 't', long = "transcript", value_name = "FILE")]
        transcript: Option<PathBuf>,
    },

    /// Send one structured action to the relay
    Action {
        /// Action name
        name: String,

        /// Parameters as key=value pairs
        params: Vec<String>,
    },

    /// Send one free-form command to the relay
    Message {
        /// Command text
        text: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            println!("Loading configuration from {}", path.display());
            BridgeConfig::from_file(path).map_err(|e| anyhow!(e.to_string()))?
        }
        None => BridgeConfig::from_env().map_err(|e| anyhow!(e.to_string()))?,
    };

    match cli.command.unwrap_or(Commands::Chat { transcript: None }) {
        Commands::Chat { transcript } => run_chat(config, transcript).await,
        Commands::Action { name, params } => {
            let params = parse_params(&params)?;
            let relay = config.relay_client().map_err(|e| anyhow!(e.to_string()))?;
            let response = relay.dispatch_action(&name, &params).await;
            report(response.success, &response.message)
        }
        Commands::Message { text } => {
            let relay = config.relay_client().map_err(|e| anyhow!(e.to_string()))?;
            let response = relay.dispatch_message(&text).await;
            report(response.success, &response.message)
        }
    }
}

fn parse_params(pairs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| anyhow!("Invalid parameter '{}', expected key=value", pair))
        })
        .collect()
}

fn report(success: bool, message: &str) -> anyhow::Result<()> {
    if success {
        println!("sent: {}", message);
        Ok(())
    } else {
        Err(anyhow!("relay call failed: {}", message))
    }
}

async fn run_chat(mut config: BridgeConfig, transcript: Option<PathBuf>) -> anyhow::Result<()> {
    config.response_modality = ResponseModality::Text;

    let session_config = config.session_config().map_err(|e| anyhow!(e))?;
    let session = create_session("gemini", session_config)?;
    let relay: Arc<dyn RelayClient> =
        Arc::new(config.relay_client().map_err(|e| anyhow!(e.to_string()))?);

    let bridge = SessionBridge::new(session, relay);
    let mut state_rx = bridge.subscribe();

    let printer = tokio::spawn(async move {
        let mut printed: HashSet<(u64, EntryKind, String)> = HashSet::new();
        let mut was_connected = false;
        while state_rx.changed().await.is_ok() {
            let state = state_rx.borrow_and_update().clone();
            if state.connected != was_connected {
                was_connected = state.connected;
                println!(
                    "-- {}",
                    if state.connected {
                        "connected"
                    } else {
                        "disconnected"
                    }
                );
            }
            for entry in &state.conversation {
                if printed.insert((entry.seq, entry.kind, entry.text.clone())) {
                    print_entry(entry);
                }
            }
        }
    });

    bridge.start().await.context("Failed to start session")?;
    info!("Session started, type a message and press enter (/quit to exit)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = bridge.send_text(line).await {
            warn!("Failed to send text: {}", e);
            if !bridge.is_connected() {
                break;
            }
        }
    }

    if let Err(e) = bridge.stop().await {
        warn!("Error while closing session: {}", e);
    }
    if tokio::time::timeout(DISPATCH_DRAIN_TIMEOUT, bridge.wait_for_dispatches())
        .await
        .is_err()
    {
        warn!(
            pending = bridge.dispatcher().pending(),
            "Relay calls still in flight, exiting without their outcome"
        );
    }

    if let Some(path) = transcript {
        let exporter = MarkdownExporter::new();
        let document = exporter.export(&bridge.conversation(), OffsetDateTime::now_utc().date());
        tokio::fs::write(&path, document)
            .await
            .with_context(|| format!("Failed to write transcript to {}", path.display()))?;
        println!("Transcript written to {}", path.display());
    }

    drop(bridge);
    printer.abort();
    Ok(())
}

fn print_entry(entry: &ConversationEntry) {
    match entry.kind {
        EntryKind::Speech => println!("{}: {}", entry.role, entry.text),
        EntryKind::Dispatch | EntryKind::DispatchResult => println!("   [{}]", entry.text),
    }
}

//! PromptGuard command-line front end.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use promptguard::storage::FileStore;
use promptguard::{ExtensionStatus, GuardConfig, GuardConfigJson, Node, PromptGuard};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Redact personal data from chat prompts and restore it in rendered replies
///
/// Redactions and exclusions are kept per conversation in a JSON store file.
#[derive(Parser, Debug)]
#[command(name = "promptguard")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the JSON store file
    #[arg(long, env = "PROMPTGUARD_STORE", default_value = "promptguard-store.json")]
    store: PathBuf,

    /// URL of the chat page; selects the conversation (pending if absent)
    #[arg(long, env = "PROMPTGUARD_URL")]
    url: Option<String>,

    /// Path of a JSON configuration file
    #[arg(long, env = "PROMPTGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "PROMPTGUARD_JSON_LOGS", default_value = "false")]
    json_logs: bool,

    /// Enable verbose debug logging
    #[arg(long, short, env = "VERBOSE", default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Redact a prompt (reads stdin when TEXT is omitted)
    Redact { text: Option<String> },
    /// Restore placeholders in rendered text (reads stdin when TEXT is omitted)
    Restore {
        text: Option<String>,
        /// Print the restored nodes as JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Stop protecting a value in this conversation
    Exclude { value: String },
    /// Protect a previously excluded value again
    Include { value: String },
    /// Show or set the extension status
    Status {
        /// New status: enabled or disabled
        set: Option<String>,
    },
    /// Print the conversation's redaction map and exclusion list
    Show,
}

fn read_input(text: Option<String>) -> Result<String> {
    match text {
        Some(text) => Ok(text),
        None => {
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .context("Failed to read stdin")?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<GuardConfig> {
    let Some(path) = path else {
        return Ok(GuardConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config '{}'", path.display()))?;
    let json: GuardConfigJson = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid config '{}'", path.display()))?;
    Ok(json.into())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only command output
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    if args.json_logs {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = load_config(args.config.as_ref())?;
    info!("Starting PromptGuard");
    let store = Arc::new(FileStore::new(&args.store));
    info!("  Store: {}", store.path().display());
    info!("  Disabled types: {:?}", config.disabled_types);

    let guard = PromptGuard::new(config, store);

    if let Some(ref url) = args.url {
        let conversation = guard.navigate(url).await;
        info!("  Conversation: {}", conversation);
    }

    match args.command {
        Command::Redact { text } => {
            let text = read_input(text)?;
            let outcome = guard.submit_prompt(&text).await;
            if let Some(notification) = outcome.notification {
                info!("{}", notification);
            }
            println!("{}", outcome.text);
        }
        Command::Restore { text, json } => {
            let text = read_input(text)?;
            let restored = guard.restore(&[Node::text(text)]).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&restored)?);
            } else {
                for fragment in &restored {
                    println!("{}", fragment.render_plain());
                }
            }
        }
        Command::Exclude { value } => {
            println!("{}", guard.set_excluded(&value, true).await);
        }
        Command::Include { value } => {
            println!("{}", guard.set_excluded(&value, false).await);
        }
        Command::Status { set } => {
            if let Some(set) = set {
                guard.set_status(ExtensionStatus::parse_setting(&set)?).await;
            }
            println!("{}", guard.status().await.as_str());
        }
        Command::Show => {
            let report = serde_json::json!({
                "conversation": guard.conversation().await,
                "redactions": guard.redaction_map().await,
                "excludedPII": guard.exclusion_list().await,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

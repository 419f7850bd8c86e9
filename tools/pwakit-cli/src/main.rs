//! Command-line driver for the PwaKit offline agent.
//!
//! Each invocation delivers one lifecycle signal to an agent backed by a
//! SQLite cache store, so state carries over between runs.
//!
//! ## Usage
//!
//! ```bash
//! # Populate the shell cache and take control
//! pwakit install && pwakit activate
//!
//! # Fetch through the agent as a navigation
//! pwakit fetch /products --navigate
//!
//! # Queue an order and replay it later
//! pwakit enqueue /orders/submit/42 --body '{"sku":"A1"}'
//! pwakit sync
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pwakit_cache::{CacheStorage, SqliteBackend};
use pwakit_common::{init_logging, LogConfig, LogFormat, OptionExt, ResultExt};
use pwakit_net::{HttpFetcher, LoaderConfig, Request};
use pwakit_sw::{AgentConfig, NotificationClick, OfflineAgent, PushMessage};
use serde::Serialize;
use tracing::debug;

mod summary;

use summary::{list_caches, FetchSummary};

#[derive(Parser)]
#[command(name = "pwakit")]
#[command(about = "Drive the PwaKit offline agent from the command line")]
struct Cli {
    /// Agent configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite cache store
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Log output format: pretty, compact or json
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and cache the app shell
    Install,

    /// Delete caches from previous versions and take control
    Activate,

    /// Fetch a path through the agent
    Fetch {
        /// Path relative to the configured origin
        path: String,
        /// Treat the request as a top-level navigation
        #[arg(long)]
        navigate: bool,
    },

    /// Queue a write request for background replay
    Enqueue {
        /// Submission path relative to the configured origin
        path: String,
        /// Request body
        #[arg(long, default_value = "")]
        body: String,
    },

    /// Deliver a background sync signal
    Sync {
        /// Sync tag (defaults to the configured tag)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Deliver a push message
    Push {
        /// Payload text
        #[arg(long)]
        text: Option<String>,
    },

    /// Deliver a notification click
    Click {
        /// Action button pressed
        #[arg(long)]
        action: Option<String>,
    },

    /// List cache buckets and their entries
    Caches,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::debug()
    } else {
        LogConfig::default()
    };
    init_logging(log_config.with_format(cli.log_format));

    let config = match cli.config {
        Some(ref path) => AgentConfig::load(path)?,
        None => AgentConfig::default(),
    };
    let store = cli.store.clone().unwrap_or_else(default_store);
    let caches = open_storage(&store)?;
    debug!(store = %store.display(), "Opened cache store");

    let fetcher = HttpFetcher::new(LoaderConfig::default().with_origin(config.origin.clone()))?;
    let agent = OfflineAgent::new(config, caches, Arc::new(fetcher))?;
    agent.restore().await?;

    match cli.command {
        Commands::Install => print_json(&agent.install().await)?,

        Commands::Activate => print_json(&agent.activate().await)?,

        Commands::Fetch { path, navigate } => {
            let url = agent.config().resolve(&path)?;
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };
            let outcome = agent.fetch(request).await;
            print_json(&FetchSummary::new(agent.state().await, &outcome))?;
        }

        Commands::Enqueue { path, body } => {
            let url = agent.config().resolve(&path)?;
            agent.queue().enqueue(&Request::post(url, body.into())).await?;
            print_json(&agent.queue().pending().await?)?;
        }

        Commands::Sync { tag } => {
            let tag = tag.unwrap_or_else(|| agent.config().sync_tag.clone());
            let report = agent
                .sync(&tag)
                .await
                .ok_or_not_found(format!("queue for sync tag {tag}"))?;
            print_json(&report)?;
        }

        Commands::Push { text } => {
            let message = text.map(PushMessage::text).unwrap_or_default();
            print_json(&agent.push(&message))?;
        }

        Commands::Click { action } => {
            print_json(&agent.notification_click(&NotificationClick { action }))?;
        }

        Commands::Caches => print_json(&list_caches(agent.caches()).await?)?,
    }

    agent.settle().await;
    Ok(())
}

fn default_store() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pwakit")
        .join("caches.db")
}

fn open_storage(path: &Path) -> Result<CacheStorage, Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .context(format!("creating store directory {}", parent.display()))?;
    }
    Ok(CacheStorage::new(SqliteBackend::open(path)?))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "pwakit",
            "fetch",
            "/products",
            "--navigate",
            "--log-format",
            "json",
            "-v",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Fetch { ref path, navigate: true } if path == "/products"
        ));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let result = Cli::try_parse_from(["pwakit", "--log-format", "xml", "caches"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_storage_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("caches.db");
        let caches = open_storage(&path).unwrap();
        caches.open("ftc-pwa-v1.0.0").await.unwrap();
        assert!(path.exists());
    }
}

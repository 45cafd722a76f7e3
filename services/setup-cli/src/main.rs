//! API credential setup
//!
//! Single-binary CLI that:
//! 1. Serves a one-shot setup page on an ephemeral loopback port
//! 2. Opens the user's browser at it
//! 3. Validates the entered credentials against the remote API
//! 4. Persists them to the local credential store
//!
//! `list`, `show <name>` and `remove <name>` manage what was stored.

mod config;
mod validator;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keystore::{Credentials, FileSecretStore, SecretStore};
use setup_flow::{BrowserError, BrowserLauncher, SetupServer, SystemBrowser};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::validator::HttpCredentialValidator;

#[derive(Parser)]
#[command(name = "api-setup", about = "Set up API credentials through the browser")]
struct Cli {
    /// Config file (falls back to CONFIG_PATH, then ./api-setup.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
enum Command {
    /// Open the setup page and store the entered credentials (default)
    Setup,
    /// List stored accounts
    List,
    /// Show one account with its API key masked
    Show { name: String },
    /// Delete one account's credentials
    Remove { name: String },
}

/// Opens the system browser and tells the user where the page is.
///
/// Without a browser the printed URL is the only way in, so it goes to
/// stderr alongside the JSON logs.
struct ConsoleBrowser;

impl BrowserLauncher for ConsoleBrowser {
    fn open(&self, url: &str) -> std::result::Result<(), BrowserError> {
        eprintln!("Opening {url} in your browser to finish setup...");
        SystemBrowser.open(url).inspect_err(|_| {
            eprintln!("Could not open a browser. Visit {url} to continue.");
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Setup);

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), ?command, "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store = FileSecretStore::load(config.store.path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open credential store at {}",
                config.store.path.display()
            )
        })?;

    match command {
        Command::Setup => run_setup(config, Arc::new(store)).await,
        Command::List => {
            let accounts = store.list().await.context("failed to list credentials")?;
            if accounts.is_empty() {
                println!("No stored credentials.");
            }
            for (name, credentials) in &accounts {
                println!("{}", summary_line(name, credentials));
            }
            Ok(())
        }
        Command::Show { name } => {
            let credentials = store
                .get(&name)
                .await
                .context("failed to read credentials")?
                .with_context(|| format!("no credentials stored for {name}"))?;
            print!("{}", describe(&name, &credentials));
            Ok(())
        }
        Command::Remove { name } => {
            store
                .delete(&name)
                .await
                .context("failed to remove credentials")?
                .with_context(|| format!("no credentials stored for {name}"))?;
            println!("Removed credentials for {name}.");
            Ok(())
        }
    }
}

/// Run the browser flow until it finishes, the user interrupts, or the
/// configured flow timeout passes.
async fn run_setup(config: Config, store: Arc<FileSecretStore>) -> Result<()> {
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    if let Some(secs) = config.flow_timeout_secs {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!(flow_timeout_secs = secs, "setup timed out, cancelling");
            cancel.cancel();
        });
    }

    let validator = HttpCredentialValidator::new(
        reqwest::Client::new(),
        config.validator.url.clone(),
        config.validator.timeout(),
    );
    let server = SetupServer::new(
        config.setup,
        Arc::new(validator),
        store.clone(),
        Arc::new(ConsoleBrowser),
    );

    match server.start(cancel).await {
        Ok(result) => {
            info!(account_name = %result.account_name, "credentials stored");
            println!(
                "Credentials for {} saved to {}.",
                result.account_name,
                store.path().display()
            );
            Ok(())
        }
        Err(setup_flow::Error::Cancelled) => anyhow::bail!("setup cancelled before completion"),
        Err(e) => Err(e).context("setup failed"),
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// If a handler cannot be installed that signal is never observed; the
/// other still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, cancelling setup"),
        _ = terminate => info!("received SIGTERM, cancelling setup"),
    }
}

/// Show only the ends of a key.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

fn summary_line(name: &str, credentials: &Credentials) -> String {
    match &credentials.account_id {
        Some(id) => format!("{name}\tclient_id={}\taccount_id={id}", credentials.client_id),
        None => format!("{name}\tclient_id={}", credentials.client_id),
    }
}

fn describe(name: &str, credentials: &Credentials) -> String {
    let mut out = format!(
        "account:    {name}\nclient_id:  {}\napi_key:    {}\n",
        credentials.client_id,
        mask_key(credentials.api_key.expose())
    );
    if let Some(id) = &credentials.account_id {
        out.push_str(&format!("account_id: {id}\n"));
    }
    if credentials.created_at > 0 {
        out.push_str(&format!("created_at: {}\n", credentials.created_at));
    }
    out
}

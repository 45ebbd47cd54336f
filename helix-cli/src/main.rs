//! Terminal frontend for the Helix client.
//!
//! One subcommand per facade query. "Not found" exits with code 1 so
//! shell scripts can branch on it without parsing output.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use helix_client::{FileTokenStore, HelixClient, RequestDispatcher, default_client};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "helix", version, about = "Query Twitch streams, users and VODs")]
struct Args {
    /// Twitch application client id.
    #[arg(long, env = "TWITCH_CLIENT_ID")]
    client_id: String,

    /// Twitch application client secret.
    #[arg(long, env = "TWITCH_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Storage namespace for the cached token.
    #[arg(long, default_value = helix_client::DEFAULT_STORAGE_NAMESPACE)]
    namespace: String,

    /// Per-request timeout in seconds.
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    timeout: u64,

    /// Token cache file. Defaults to the user data directory.
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up a user profile by login name.
    User { login: String },
    /// Look up the live stream for a login name.
    Stream { login: String },
    /// Print "live" or "offline" for a login name.
    Live { login: String },
    /// Look up a video by id.
    Vod { id: String },
    /// Most recent archived broadcast for a login name.
    LastVod { login: String },
    /// Check whether the configured credentials are accepted.
    Check,
}

fn store_path(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }
    let base = dirs::data_dir().context("could not determine the user data directory")?;
    Ok(base.join("helix-cli").join("tokens.json"))
}

/// Print a lookup result, or exit 1 when the resource was not found.
fn emit<T: Serialize>(result: Option<T>, what: &str) -> Result<()> {
    match result {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        None => {
            eprintln!("{what} not found");
            process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("helix=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let store = Arc::new(FileTokenStore::new(store_path(args.store)?));
    let dispatcher = Arc::new(RequestDispatcher::new(
        default_client(),
        Duration::from_secs(args.timeout),
    ));
    let client = HelixClient::with_namespace(
        store,
        dispatcher,
        args.client_id,
        args.client_secret,
        args.namespace,
    );

    match args.command {
        Command::User { login } => {
            debug!(login, "looking up user");
            emit(client.get_user(&login).await?, "user")?;
        }
        Command::Stream { login } => {
            emit(client.get_stream(&login).await?, "stream")?;
        }
        Command::Live { login } => {
            if client.is_live(&login).await {
                println!("live");
            } else {
                println!("offline");
                process::exit(1);
            }
        }
        Command::Vod { id } => {
            emit(client.get_vod(&id).await?, "video")?;
        }
        Command::LastVod { login } => {
            emit(client.get_last_archive_vod(&login).await?, "archive video")?;
        }
        Command::Check => {
            if client.validate_credentials().await {
                println!("credentials ok");
            } else {
                eprintln!("credentials rejected");
                process::exit(1);
            }
        }
    }

    Ok(())
}

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tileboard_backend::client::EndpointClient;
use tileboard_backend::config::{self, Credentials, ServerConfig};
use tileboard_backend::realtime::Subscription;
use tileboard_backend::state::AppState;
use tileboard_backend::store::rest::RestClient;
use tileboard_backend::{log_bridge, server, view};
use tileboard_core::store::{Broadcaster, NoBroadcast, UploadRequest};
use tileboard_core::types::{PaletteEntry, Selection};
use tileboard_core::BoardSession;
use tokio::sync::mpsc;

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tileboard: shared tile board with live sync",
    long_about = None
)]
struct Cli {
    /// Config file (defaults to $TILEBOARD_CONFIG or ~/.config/tileboard/server.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the write endpoints. Defaults to the configured server.
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the write endpoints.
    Serve,
    /// Show the board and follow live changes until Ctrl-C.
    Watch,
    /// Paint one cell.
    Paint {
        x: u32,
        y: u32,
        /// `wall`, `reset` or a palette entry id.
        #[arg(long, default_value = "wall")]
        mode: String,
    },
    /// Upload an image as a new palette entry.
    Upload {
        file: PathBuf,
        /// Entry name. Defaults to the file name without extension.
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a palette entry, blanking every cell that uses it.
    Delete {
        id: String,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
}

type Session<B> = BoardSession<RestClient, EndpointClient, B>;

fn open_session<B: Broadcaster>(
    config: &ServerConfig,
    credentials: &Credentials,
    endpoint: Option<&str>,
    broadcaster: B,
) -> Result<Session<B>, Box<dyn std::error::Error>> {
    let (url, key) = credentials.anon()?;
    let store = RestClient::new(url, key, &config.bucket);
    let api = EndpointClient::new(endpoint.unwrap_or(&config.endpoint_url()));
    Ok(BoardSession::new(config.board_size, store, api, broadcaster))
}

/// Report the session's error banner as the command's failure.
fn finish<B: Broadcaster>(session: &Session<B>, done: bool) -> CliResult {
    match session.state().error() {
        Some(error) => Err(error.to_string().into()),
        None if !done => Err("Nothing was changed".into()),
        None => Ok(()),
    }
}

fn confirm_delete(entry: &PaletteEntry) -> bool {
    print!(
        "Delete palette entry {} ({})? [y/N] ",
        entry.id,
        entry.name.as_deref().unwrap_or("unnamed")
    );
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

async fn watch(config: &ServerConfig, credentials: &Credentials, endpoint: Option<&str>) -> CliResult {
    let (url, key) = credentials.anon()?;
    let (tx, mut rx) = mpsc::channel(256);
    let subscription = Subscription::connect(url, key, tx).await?;
    let mut session = open_session(config, credentials, endpoint, subscription.broadcaster())?;

    session.start().await;
    print!("{}", view::render_text(session.state()));

    loop {
        tokio::select! {
            inbound = rx.recv() => {
                let Some(inbound) = inbound else {
                    log::warn!(target: "tileboard.cli", "Realtime feed closed");
                    break;
                };
                session.handle(inbound).await;
                println!();
                print!("{}", view::render_text(session.state()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    drop(subscription);
    Ok(())
}

async fn paint(session: &mut Session<NoBroadcast>, x: u32, y: u32, mode: &str) -> CliResult {
    session.ensure_wall().await;
    session.load().await;
    match mode {
        "wall" => {}
        "reset" => session.select(Selection::Reset).await,
        id => {
            if !session.select_palette(id).await {
                return Err(format!("No palette entry with an image: {}", id).into());
            }
        }
    }
    let done = session.click(x, y).await;
    finish(session, done)?;
    print!("{}", view::render_text(session.state()));
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult {
    if let Err(e) = log_bridge::init() {
        eprintln!("failed to initialize logger: {}", e);
    }

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path);
    let credentials = Credentials::from_env();
    let endpoint = cli.endpoint.as_deref();
    log::debug!(target: "tileboard.cli", "{:?}", credentials);

    match cli.command {
        Commands::Serve => {
            let state = AppState::new(config, &credentials);
            server::serve(state).await
        }
        Commands::Watch => watch(&config, &credentials, endpoint).await,
        Commands::Paint { x, y, mode } => {
            let mut session = open_session(&config, &credentials, endpoint, NoBroadcast)?;
            paint(&mut session, x, y, &mode).await
        }
        Commands::Upload { file, name } => {
            let bytes = tokio::fs::read(&file).await?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.png".to_string());
            let mut session = open_session(&config, &credentials, endpoint, NoBroadcast)?;
            let entry = session
                .upload_palette(UploadRequest {
                    file_name,
                    bytes,
                    content_type: None,
                    name,
                })
                .await;
            finish(&session, entry.is_some())?;
            if let Some(entry) = entry {
                println!("{}", entry.id);
            }
            Ok(())
        }
        Commands::Delete { id, yes } => {
            let mut session = open_session(&config, &credentials, endpoint, NoBroadcast)?;
            session.load().await;
            let deleted = session
                .delete_palette(&id, |entry| yes || confirm_delete(entry))
                .await;
            finish(&session, deleted)
        }
    }
}

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    load_remote_config, BoardError, BoardPolicy, DedupPolicy, DragEnd, DragLocation,
    DuplicatePolicy, RelayDocumentStore, SessionEvent, SessionOptions, SyncError,
    TierListSession,
};
use shared::{
    document,
    domain::{Board, ItemId, SeedPolicy, TierKey},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

use render::render_board;

#[derive(Parser, Debug)]
#[command(name = "tierlist", about = "Edit a shared tier list board")]
struct Cli {
    /// Remote config file; defaults to ./tierlist.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Document path on the relay, overriding the config.
    #[arg(long, global = true)]
    path: Option<String>,
    /// Seconds to wait for the first snapshot.
    #[arg(long, global = true, default_value_t = 10)]
    timeout: u64,
    /// Print the canonical JSON document instead of a table.
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true, value_enum, default_value_t = DedupArg::ById)]
    dedup: DedupArg,
    /// Accept items whose text and image match an existing item.
    #[arg(long, global = true)]
    allow_duplicates: bool,
    /// Start new and reset boards without placeholder items.
    #[arg(long, global = true)]
    empty_seed: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the board.
    Show,
    /// Add an item to the unranked pool.
    Add {
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        image: Option<String>,
    },
    /// Move an item. Without --to the drop lands outside every tier and
    /// nothing changes.
    Move {
        #[arg(long)]
        from: TierKey,
        #[arg(long)]
        index: usize,
        #[arg(long)]
        to: Option<TierKey>,
        /// Position in the destination tier; defaults to the end.
        #[arg(long)]
        at: Option<usize>,
    },
    Remove {
        #[arg(long)]
        id: String,
    },
    Rename {
        #[arg(long)]
        tier: TierKey,
        /// Blank restores the default label.
        #[arg(long)]
        name: String,
    },
    /// Replace the board with the default one.
    Reset,
    /// Print every change until Ctrl-C.
    Watch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DedupArg {
    Off,
    ById,
    ByContent,
}

impl Cli {
    fn policy(&self) -> BoardPolicy {
        BoardPolicy {
            dedup: match self.dedup {
                DedupArg::Off => DedupPolicy::Off,
                DedupArg::ById => DedupPolicy::ById,
                DedupArg::ByContent => DedupPolicy::ByContent,
            },
            duplicates: if self.allow_duplicates {
                DuplicatePolicy::Allow
            } else {
                DuplicatePolicy::RejectSameContent
            },
            seed: if self.empty_seed {
                SeedPolicy::Empty
            } else {
                SeedPolicy::Placeholders
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = load_remote_config(cli.config.as_deref())?;
    if let Some(path) = &cli.path {
        config.document_path = Some(path.clone());
    }
    let remote = RelayDocumentStore::new(&config).context("invalid remote config")?;
    info!(relay = %remote.base_url(), path = config.document_path(), "connecting");

    let session = TierListSession::start(
        Arc::new(remote),
        SessionOptions {
            path: config.document_path().to_string(),
            policy: cli.policy(),
            project_id: config.project_id.clone(),
        },
    );
    let result = run(&cli, &session).await;
    session.close();
    result
}

async fn run(cli: &Cli, session: &TierListSession) -> Result<()> {
    let loaded = session
        .wait_until_loaded(Duration::from_secs(cli.timeout))
        .await
        .with_context(|| format!("failed to load board '{}'", session.path()))?;

    match &cli.command {
        Command::Show => {}
        Command::Add { text, image } => {
            match session
                .add_item(text.as_deref().unwrap_or_default(), image.as_deref())
                .await
            {
                Ok(id) => eprintln!("added {id}"),
                Err(SyncError::Board(err @ BoardError::DuplicateItem { .. })) => {
                    eprintln!("not added: {err}");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Command::Move {
            from,
            index,
            to,
            at,
        } => {
            let destination = to.map(|tier| {
                let end = loaded
                    .tier(tier)
                    .items
                    .len()
                    .saturating_sub(usize::from(tier == *from));
                DragLocation::new(tier, at.unwrap_or(end))
            });
            let moved = session
                .handle_drag_end(DragEnd {
                    source: DragLocation::new(*from, *index),
                    destination,
                })
                .await?;
            if moved.is_none() {
                eprintln!("dropped outside the board; nothing moved");
            }
        }
        Command::Remove { id } => {
            let removed = session.remove_item(&ItemId::from(id.as_str())).await?;
            eprintln!("removed '{}'", removed.content);
        }
        Command::Rename { tier, name } => {
            session.rename_tier(*tier, name).await?;
        }
        Command::Reset => {
            session.reset().await?;
        }
        Command::Watch => return watch(session, loaded, cli.json).await,
    }

    session
        .flush()
        .await
        .context("failed to publish board")?;
    let board = session.board().await.unwrap_or(loaded);
    print_board(&board, cli.json)
}

async fn watch(session: &TierListSession, initial: Board, json: bool) -> Result<()> {
    let mut events = session.subscribe_events();
    print_board(&initial, json)?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::BoardChanged(board)) => {
                    println!();
                    print_board(&board, json)?;
                }
                Ok(SessionEvent::Notice(notice)) => eprintln!("{notice}"),
                Ok(SessionEvent::Error(error)) => eprintln!("error: {error}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "watch fell behind"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    // Anything queued by self-healing snapshots while watching.
    session.flush().await.context("failed to publish board")?;
    Ok(())
}

fn print_board(board: &Board, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&document::to_value(board))?);
    } else {
        print!("{}", render_board(board));
    }
    Ok(())
}

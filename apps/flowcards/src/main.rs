use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowcards::db::{DeckStore, SettingsStore, SqliteStore, StatusStore, StudyLogStore};
use flowcards::package;
use flowcards::session::Session;
use flowcards::sync::{
    self, export_file_name, export_user_data, import_from_file, import_user_data, ImportStrategy,
    SyncEngine,
};
use flowcards::sync::remote::{RemoteCredentials, RemoteStore};
use flowcards_core::schedule::{study_date, Grade};

#[derive(Parser)]
#[command(name = "flowcards", version, about = "Flashcard decks, reviews and cross-device sync")]
struct Cli {
    /// Acting user (defaults to $FLOWCARDS_USER).
    #[arg(long, global = true)]
    user: Option<String>,

    /// Local database path override.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a card package (zip archive).
    Import { package: PathBuf },
    /// List decks with card and due counts.
    Decks,
    /// List cards due for review.
    Due,
    /// Mark a card as read (first flip).
    Read { deck_id: i64, card_id: i64 },
    /// Grade a card: again, hard, good, easy or done.
    Grade {
        deck_id: i64,
        card_id: i64,
        grade: String,
    },
    /// Smart sync: download, merge, upload, prune.
    Sync,
    /// Upload the local snapshot to the remote store.
    Upload,
    /// Merge the remote snapshot into the local store.
    Download,
    /// Write the full snapshot to a JSON file (or directory).
    Export { path: PathBuf },
    /// Merge a JSON snapshot file into the local store.
    ImportFile { path: PathBuf },
    /// Study volume and streak.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let session = Session::resolve(cli.user.clone())?;
    let db_path = cli.db.clone().unwrap_or_else(flowcards::default_db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("cannot open database at {}", db_path.display()))?;
    let username = session.username.clone();

    match cli.command {
        Command::Import { package: path } => {
            let metadata = std::fs::metadata(&path)
                .with_context(|| format!("cannot read {}", path.display()))?;
            package::check_package_size(metadata.len())?;
            let bytes = std::fs::read(&path)?;

            let store_ref = &store;
            let user_ref = username.as_str();
            let mut imported = 0usize;
            package::decode_streaming(
                bytes,
                |progress| {
                    tracing::info!(
                        stage = ?progress.stage,
                        percent = progress.percent,
                        "{}",
                        progress.detail
                    );
                },
                |deck| {
                    imported += 1;
                    let decks = [deck];
                    async move {
                        store_ref
                            .save_decks(user_ref, &decks)
                            .map_err(anyhow::Error::from)
                    }
                },
            )
            .await?;
            println!("imported {imported} decks");
        }
        Command::Decks => {
            let decks = store.load_decks(&username)?;
            let due = store.get_due_cards(&username, &decks, Utc::now().timestamp_millis())?;
            for deck in &decks {
                let due_count = due.iter().filter(|d| d.card.deck_id == deck.id).count();
                println!("{:>8}  {} ({} cards, {} due)", deck.id, deck.name, deck.cards.len(), due_count);
            }
        }
        Command::Due => {
            let decks = store.load_decks(&username)?;
            let due = store.get_due_cards(&username, &decks, Utc::now().timestamp_millis())?;
            if due.is_empty() {
                println!("nothing due");
            }
            for item in due {
                println!("{:>8}/{:<8}  [{}] {}", item.card.deck_id, item.card.id, item.deck_name, preview(&item.card.front));
            }
        }
        Command::Read { deck_id, card_id } => {
            store.mark_card_read(&username, deck_id, card_id)?;
            store.log_study(&username, card_id, &study_date(Utc::now()))?;
            println!("marked as read");
        }
        Command::Grade {
            deck_id,
            card_id,
            grade,
        } => {
            let Some(grade) = Grade::parse(&grade) else {
                bail!("unknown grade {grade:?}; use again, hard, good, easy or done");
            };
            let state = store.schedule_review(
                &username,
                deck_id,
                card_id,
                grade.interval_days(),
                Utc::now().timestamp_millis(),
            )?;
            println!("scheduled: {state:?}");
        }
        Command::Sync => {
            let engine = sync_engine(&store, &username)?;
            let report = engine.smart_sync(&store, &username).await?;
            println!(
                "synced: downloaded={} decks={} statuses={} pruned={}",
                report.downloaded, report.decks_uploaded, report.card_statuses, report.tombstones_pruned
            );
        }
        Command::Upload => {
            let engine = sync_engine(&store, &username)?;
            let snapshot = export_user_data(&store, &username, Utc::now().timestamp_millis())?;
            engine.upload(&snapshot).await?;
            println!("uploaded {} decks", snapshot.decks.len());
        }
        Command::Download => {
            let engine = sync_engine(&store, &username)?;
            match engine.download(&username).await? {
                Some(snapshot) => {
                    import_user_data(&store, &snapshot, ImportStrategy::Merge)?;
                    println!("merged {} decks from the cloud", snapshot.decks.len());
                }
                None => println!("no sync data found in the cloud"),
            }
        }
        Command::Export { path } => {
            let now_ms = Utc::now().timestamp_millis();
            let snapshot = export_user_data(&store, &username, now_ms)?;
            let target = if path.is_dir() {
                path.join(export_file_name(&username, now_ms))
            } else {
                path
            };
            sync::export_to_file(&target, &snapshot)?;
            println!("exported to {}", target.display());
        }
        Command::ImportFile { path } => {
            let snapshot = import_from_file(&path)?;
            import_user_data(&store, &snapshot, ImportStrategy::Merge)?;
            println!("merged snapshot for {}", snapshot.username);
        }
        Command::Stats => {
            let stats = store.get_study_stats(&username, &study_date(Utc::now()))?;
            println!("studied {} cards, {} day streak", stats.total_studied, stats.streak_days);
        }
    }

    Ok(())
}

fn sync_engine(store: &SqliteStore, username: &str) -> Result<SyncEngine> {
    let settings = store.load_settings(username)?;
    let credentials = RemoteCredentials::from_settings(settings.as_ref());
    Ok(SyncEngine::new(RemoteStore::new(credentials)))
}

fn preview(html: &str) -> String {
    let text: String = html
        .chars()
        .take(80)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect();
    text
}

//! CareSync CLI - Command line interface for the sync engine.
//!
//! This tool operates a local replica: create and inspect records, trigger
//! one-shot syncs, or run the periodic scheduler in the foreground.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use caresync_common::{AccountId, RecordId};
use caresync_model::{
    ClientHistoryItem, ConsultationKind, Notification, NotificationKind, SyncRecord,
};
use caresync_remote::{HttpRemote, HttpRemoteConfig, MemoryRemote, RemoteStore};
use caresync_store::RecordStore;
use caresync_sync::{
    ScheduleConfig, SyncEngine, SyncMode, SyncScheduler, SyncStatus, META_LAST_FULL_SYNC,
};

#[derive(Parser)]
#[command(name = "caresync")]
#[command(about = "CareSync - offline-first record synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Path to the local record database (default: platform data dir).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Account the local replica belongs to.
    #[arg(short, long)]
    account: String,

    /// Base URL of the remote document API. Without it, an in-memory remote
    /// is used (useful for smoke runs; nothing leaves the process).
    #[arg(long)]
    remote_url: Option<String>,

    /// Bearer token for the remote document API.
    #[arg(long)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync pass and print the result.
    Sync,

    /// Run the periodic scheduler in the foreground until ctrl-c.
    Watch {
        /// Interval between automatic syncs, in seconds.
        #[arg(short, long, default_value_t = 900)]
        interval: u64,
    },

    /// Show local replica state.
    Status,

    /// Create a notification.
    Notify {
        /// Headline.
        #[arg(short, long)]
        title: String,

        /// Body text.
        #[arg(short, long)]
        message: String,

        /// Kind: general, appointment, reminder or system.
        #[arg(short, long, default_value = "general")]
        kind: String,
    },

    /// List notifications for the account.
    Notifications,

    /// Record a consultation history entry.
    Consult {
        /// Patient identifier.
        #[arg(long)]
        patient_id: String,

        /// Patient display name.
        #[arg(long)]
        patient_name: String,

        /// Consultation date (YYYY-MM-DD).
        #[arg(long)]
        date: NaiveDate,

        /// Kind: in-person, online, phone-call or other.
        #[arg(short, long, default_value = "in-person")]
        kind: String,

        /// Free-form notes.
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// List consultation history for the account.
    History,

    /// Delete a record; the deletion propagates on the next sync.
    Delete {
        /// Entity type: notification or history.
        #[arg(short, long)]
        entity: String,

        /// Record id.
        #[arg(short, long)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let account = AccountId::new(cli.account.clone()).context("Invalid account id")?;
    let store = Arc::new(open_store(cli.data_dir.clone())?);
    store.register::<Notification>()?;
    store.register::<ClientHistoryItem>()?;

    let remote_url = cli.remote_url.clone();
    let token = cli.token.clone();

    match cli.command {
        Commands::Sync => {
            let engine = build_engine(&remote_url, &token, store, account)?;
            cmd_sync(&engine).await
        }
        Commands::Watch { interval } => {
            let engine = build_engine(&remote_url, &token, store, account)?;
            cmd_watch(engine, interval).await
        }
        Commands::Status => cmd_status(&store, &account),
        Commands::Notify {
            title,
            message,
            kind,
        } => cmd_notify(&store, account, &title, &message, &kind),
        Commands::Notifications => cmd_notifications(&store, &account),
        Commands::Consult {
            patient_id,
            patient_name,
            date,
            kind,
            notes,
        } => cmd_consult(&store, account, &patient_id, &patient_name, date, &kind, &notes),
        Commands::History => cmd_history(&store, &account),
        Commands::Delete { entity, id } => cmd_delete(&store, &entity, &id),
    }
}

fn open_store(data_dir: Option<PathBuf>) -> Result<RecordStore> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("No platform data directory; pass --data-dir")?
            .join("caresync"),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join("records.db");
    RecordStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))
}

fn build_remote(
    remote_url: &Option<String>,
    token: &Option<String>,
) -> Result<Arc<dyn RemoteStore>> {
    match remote_url {
        Some(url) => {
            let mut config = HttpRemoteConfig::new(url.clone());
            config.bearer_token = token.clone();
            Ok(Arc::new(HttpRemote::new(config)?))
        }
        None => {
            info!("No remote url given; using in-memory remote");
            Ok(Arc::new(MemoryRemote::new()))
        }
    }
}

fn build_engine(
    remote_url: &Option<String>,
    token: &Option<String>,
    store: Arc<RecordStore>,
    account: AccountId,
) -> Result<SyncEngine> {
    let remote = build_remote(remote_url, token)?;
    let mut engine = SyncEngine::new(store, remote, account);
    engine.register::<Notification>()?;
    engine.register::<ClientHistoryItem>()?;
    Ok(engine)
}

async fn cmd_sync(engine: &SyncEngine) -> Result<()> {
    let result = engine.run().await;

    for entity in &result.report.entities {
        println!(
            "{}: {} pulled, {} pushed, {} deleted remotely, {} push failure(s)",
            entity.entity, entity.pulled, entity.pushed, entity.deletions, entity.push_failures
        );
        for id in &entity.skipped_documents {
            println!("  skipped malformed document: {}", id);
        }
    }
    println!("Sync finished in {:?}: {}", result.report.duration, result.status);

    // Distinct exit codes so wrappers can decide whether to retry.
    match result.status {
        SyncStatus::Success => Ok(()),
        SyncStatus::Retryable { .. } => std::process::exit(10),
        SyncStatus::PermanentFailure { .. } => std::process::exit(11),
    }
}

async fn cmd_watch(engine: SyncEngine, interval: u64) -> Result<()> {
    let cancel = engine.cancel_flag();
    let engine = Arc::new(engine);

    let config = ScheduleConfig {
        mode: SyncMode::Periodic {
            interval: Duration::from_secs(interval),
        },
        ..ScheduleConfig::default()
    };
    let (scheduler, handle) = SyncScheduler::new(config);

    let engine_for_loop = engine.clone();
    let task = tokio::spawn(handle.run(move || {
        let engine = engine_for_loop.clone();
        async move { engine.run().await }
    }));

    println!("Watching; syncing every {}s (ctrl-c to stop)", interval);
    tokio::signal::ctrl_c().await?;

    info!("Stopping scheduler");
    cancel.cancel();
    scheduler.shutdown().await;
    task.await?;
    Ok(())
}

fn cmd_status(store: &RecordStore, account: &AccountId) -> Result<()> {
    println!("Account: {}", account);
    println!(
        "Notifications: {} total, {} pending push",
        store.count::<Notification>()?,
        store.unsynced_count::<Notification>()?
    );
    let unread = store
        .get_for_owner::<Notification>(account)?
        .iter()
        .filter(|n| !n.read)
        .count();
    println!("  unread: {}", unread);
    println!(
        "History: {} total, {} pending push",
        store.count::<ClientHistoryItem>()?,
        store.unsynced_count::<ClientHistoryItem>()?
    );
    let pending_deletes = store.tombstones(Notification::COLLECTION)?.len()
        + store.tombstones(ClientHistoryItem::COLLECTION)?.len();
    println!("Pending deletions: {}", pending_deletes);
    match store.meta_get(META_LAST_FULL_SYNC)? {
        Some(at) => println!("Last sync: {}", at),
        None => println!("Last sync: never"),
    }
    Ok(())
}

fn cmd_notify(
    store: &RecordStore,
    account: AccountId,
    title: &str,
    message: &str,
    kind: &str,
) -> Result<()> {
    let kind = parse_notification_kind(kind)?;
    let mut notification = Notification::new(account, title, message, kind);
    store.save_local(&mut notification)?;
    println!("Created notification {}", notification.id);
    Ok(())
}

fn cmd_notifications(store: &RecordStore, account: &AccountId) -> Result<()> {
    let mut notifications = store.get_for_owner::<Notification>(account)?;
    notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    for n in notifications {
        println!(
            "{} [{}] {}: {} ({}{})",
            n.timestamp.format("%Y-%m-%d %H:%M"),
            n.id,
            n.title,
            n.message,
            if n.read { "read" } else { "unread" },
            if n.synced { "" } else { ", pending push" },
        );
    }
    Ok(())
}

fn cmd_consult(
    store: &RecordStore,
    account: AccountId,
    patient_id: &str,
    patient_name: &str,
    date: NaiveDate,
    kind: &str,
    notes: &str,
) -> Result<()> {
    let kind = parse_consultation_kind(kind)?;
    let mut item = ClientHistoryItem::new(account, patient_id, patient_name, date, kind);
    item.notes = notes.to_string();
    store.save_local(&mut item)?;
    println!("Created history entry {}", item.id);
    Ok(())
}

fn cmd_history(store: &RecordStore, account: &AccountId) -> Result<()> {
    let mut items = store.get_for_owner::<ClientHistoryItem>(account)?;
    items.sort_by(|a, b| b.consultation_date.cmp(&a.consultation_date));
    for item in items {
        println!(
            "{} [{}] {} ({:?}){}",
            item.consultation_date,
            item.id,
            item.patient_name,
            item.kind,
            if item.synced { "" } else { " (pending push)" },
        );
    }
    Ok(())
}

fn cmd_delete(store: &RecordStore, entity: &str, id: &str) -> Result<()> {
    let id = RecordId::new(id)?;
    match entity {
        "notification" => store.delete_record::<Notification>(&id)?,
        "history" => store.delete_record::<ClientHistoryItem>(&id)?,
        other => bail!("Unknown entity type '{}'; use notification or history", other),
    }
    println!("Deleted {}; removal propagates on the next sync", id);
    Ok(())
}

fn parse_notification_kind(kind: &str) -> Result<NotificationKind> {
    match kind {
        "general" => Ok(NotificationKind::General),
        "appointment" => Ok(NotificationKind::Appointment),
        "reminder" => Ok(NotificationKind::Reminder),
        "system" => Ok(NotificationKind::System),
        other => bail!(
            "Unknown notification kind '{}'; use general, appointment, reminder or system",
            other
        ),
    }
}

fn parse_consultation_kind(kind: &str) -> Result<ConsultationKind> {
    match kind {
        "in-person" => Ok(ConsultationKind::InPerson),
        "online" => Ok(ConsultationKind::Online),
        "phone-call" => Ok(ConsultationKind::PhoneCall),
        "other" => Ok(ConsultationKind::Other),
        other => bail!(
            "Unknown consultation kind '{}'; use in-person, online, phone-call or other",
            other
        ),
    }
}

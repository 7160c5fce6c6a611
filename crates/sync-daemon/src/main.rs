//! gitnotes: headless sync daemon and CLI for a Git-backed notes folder.
//!
//! Uses the same sync-core engine as the app, with settings from
//! `config.json` and the command line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use sync_core::{
    BackgroundScheduler, CommitOutcome, NetworkMonitor, OpenOutcome, ScheduleDecision,
    StorageManager, SyncOutcome,
};
use sync_daemon::config::{default_config_dir, default_data_dir, expand_tilde, Config};
use sync_daemon::indexer::spawn_refresh;
use sync_daemon::network::{NetworkKind, StaticNetwork};
use sync_daemon::watcher::{FileEvent, FileWatcher};

#[derive(Parser, Debug)]
#[command(name = "gitnotes")]
#[command(about = "Sync a folder of markdown notes through Git")]
struct Args {
    /// Directory holding config.json
    #[arg(long, global = true, env = "GITNOTES_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Directory for the app repository, index and preferences
    #[arg(long, global = true, env = "GITNOTES_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Notes folder on this device (overrides config.json)
    #[arg(long, global = true, env = "GITNOTES_NOTES_DIR")]
    notes_dir: Option<PathBuf>,

    /// Remote URL (overrides config.json)
    #[arg(long, global = true, env = "GITNOTES_REMOTE_URL")]
    remote_url: Option<String>,

    /// Network this host is on (overrides config.json)
    #[arg(long, global = true, value_enum, env = "GITNOTES_NETWORK")]
    network: Option<NetworkKind>,

    /// WiFi network name, with --network wifi
    #[arg(long, global = true, env = "GITNOTES_SSID")]
    ssid: Option<String>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the notes folder and sync in the background until Ctrl+C
    Run,
    /// Commit local changes, pull, merge, push and rebuild the index
    Sync,
    /// Commit local changes without syncing
    Commit {
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Update the index if the notes changed since the last rebuild
    Reload {
        /// Rebuild even if nothing changed
        #[arg(long)]
        force: bool,
    },
    /// Show repository, sync and index state
    Status,
    /// Throw away uncommitted changes under a path
    Discard { path: String },
    /// Clone a remote into the configured location
    Clone { url: String },
    /// Search indexed notes
    Search {
        query: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

/// Long-running state for `run`.
struct Daemon {
    manager: Arc<StorageManager>,
    scheduler: BackgroundScheduler,
    watcher: FileWatcher,
}

impl Daemon {
    fn on_file_changed(&self, event: FileEvent) {
        spawn_refresh(Arc::clone(&self.manager), event);
    }

    fn on_tick(&self) {
        match self.scheduler.sync_if_due() {
            ScheduleDecision::Spawned => info!("Background sync started"),
            decision => debug!("Background sync not started: {:?}", decision),
        }
    }

    async fn shutdown(self) {
        self.scheduler.shutdown().await;
        self.manager.close_repo().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,sync_core=debug,sync_daemon=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_dir = args
        .config_dir
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(default_config_dir);
    let data_dir = args
        .data_dir
        .as_deref()
        .map(expand_tilde)
        .unwrap_or_else(default_data_dir);
    let config = apply_overrides(Config::load(&config_dir)?, &args);

    let manager = Arc::new(StorageManager::new(
        data_dir.clone(),
        data_dir.join("state"),
        config.sync.clone(),
    ));
    let monitor: Arc<dyn NetworkMonitor> = Arc::new(StaticNetwork::new(&config.network));

    match args.command {
        Command::Clone { url } => {
            manager
                .clone_repo(config.storage(), &url)
                .await
                .with_context(|| format!("Failed to clone {}", url))?;
            println!("Cloned {}", url);
            manager.close_repo().await;
            Ok(())
        }
        Command::Run => run(manager, monitor, &config).await,
        command => {
            let opened = manager
                .open_repo(config.storage())
                .await
                .context("Failed to open repository")?;
            if opened == OpenOutcome::Initialized {
                println!("Initialized a new repository");
            }

            let result = one_shot(&manager, monitor.as_ref(), &config, command).await;
            manager.close_repo().await;
            result
        }
    }
}

fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(dir) = &args.notes_dir {
        config.notes_dir = Some(dir.clone());
    }
    if let Some(url) = &args.remote_url {
        config.sync.remote.get_or_insert_with(Default::default).url = Some(url.clone());
    }
    if let Some(kind) = args.network {
        config.network.kind = kind;
    }
    if let Some(ssid) = &args.ssid {
        config.network.ssid = Some(ssid.clone());
    }
    config
}

async fn run(
    manager: Arc<StorageManager>,
    monitor: Arc<dyn NetworkMonitor>,
    config: &Config,
) -> Result<()> {
    manager
        .open_repo(config.storage())
        .await
        .context("Failed to open repository")?;
    let root = manager
        .current_root()
        .await
        .context("Repository closed during startup")?;
    info!("Notes root: {:?}", root);

    let watcher = FileWatcher::new(root, config.sync.note_extensions.clone())?;
    info!("File watcher started");

    let mut daemon = Daemon {
        scheduler: BackgroundScheduler::new(Arc::clone(&manager), monitor),
        manager,
        watcher,
    };

    match daemon.scheduler.on_app_start() {
        ScheduleDecision::Spawned => info!("Startup sync started"),
        decision => info!("Startup sync not started: {:?}", decision),
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.poll_interval_secs.max(1)));
    ticker.tick().await;

    info!("Daemon running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            Some(event) = daemon.watcher.event_rx().recv() => {
                daemon.on_file_changed(event);
            }

            _ = ticker.tick() => {
                daemon.on_tick();
            }

            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    daemon.shutdown().await;
    info!("Shut down");
    Ok(())
}

async fn one_shot(
    manager: &StorageManager,
    monitor: &dyn NetworkMonitor,
    config: &Config,
    command: Command,
) -> Result<()> {
    match command {
        Command::Sync => {
            let status = monitor.current();
            if !config.sync.network.permits(&status) {
                bail!("Network {:?} is not allowed by the sync policy", status);
            }
            let report = manager.perform_background_git_operations().await?;
            if let Some(CommitOutcome::Committed { id }) = &report.commit {
                println!("Committed {}", id);
            }
            println!("{}", describe_sync(&report.sync));
            println!(
                "Indexed {} notes ({} skipped)",
                report.index.indexed,
                report.index.skipped.len()
            );
        }
        Command::Commit { message } => {
            let message = message.unwrap_or_else(|| config.sync.commit_message.clone());
            match manager.commit_all(&message).await? {
                CommitOutcome::Committed { id } => println!("Committed {}", id),
                CommitOutcome::NothingToCommit => println!("Nothing to commit"),
            }
        }
        Command::Reload { force } => {
            if manager.update_database(force).await? {
                println!("Index rebuilt");
            } else {
                println!("Index already up to date");
            }
        }
        Command::Status => {
            if let Some(root) = manager.current_root().await {
                println!("Root:        {}", root.display());
            }
            match manager.last_commit().await? {
                Some(commit) => println!(
                    "Last commit: {} {} ({}, {})",
                    &commit.id[..commit.id.len().min(8)],
                    commit.summary,
                    commit.author,
                    commit.time
                ),
                None => println!("Last commit: none"),
            }
            match manager.last_sync_at() {
                Some(at) => println!("Last sync:   {}", at),
                None => println!("Last sync:   never"),
            }
            println!("Indexed:     {} notes", manager.indexed_paths().await?.len());
            for skipped in manager.skipped_notes().await? {
                println!("  skipped {}: {}", skipped.path, skipped.reason);
            }
            let changed = manager.uncommitted_paths().await?;
            println!("Uncommitted: {}", changed.len());
            for path in changed {
                println!("  {}", path);
            }
        }
        Command::Discard { path } => {
            manager.discard_changes(&path).await?;
            println!("Discarded changes under {}", path);
        }
        Command::Search { query, limit } => {
            for hit in manager.search_notes(&query, limit).await? {
                match hit.title {
                    Some(title) => println!("{}  {}", hit.path, title),
                    None => println!("{}", hit.path),
                }
            }
        }
        Command::Run | Command::Clone { .. } => {}
    }
    Ok(())
}

fn describe_sync(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::LocalOnly => "No remote configured".to_string(),
        SyncOutcome::UpToDate => "Already up to date".to_string(),
        SyncOutcome::FastForwarded { head } => format!("Fast-forwarded to {}", head),
        SyncOutcome::Merged { head } => format!("Merged remote changes as {}", head),
        SyncOutcome::Pushed { head } => format!("Pushed {}", head),
    }
}

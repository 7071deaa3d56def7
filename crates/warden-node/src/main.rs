//! warden-node: runs one bridge watcher.
//!
//! Startup sequence:
//!   1. Load and validate the JSON config
//!   2. Open (or create) the watcher database
//!   3. Load the watcher key file
//!   4. Tick the watcher jobs on a fixed interval until interrupted
//!
//! With `--report` it prints this watcher's stored commitments and triggers
//! after step 3 and exits.

mod config;
mod rpc_client;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use warden_core::constants::DEFAULT_API_LIMIT;
use warden_core::types::Wid;
use warden_crypto::KeyPair;
use warden_state::WatcherDb;
use warden_watcher::Watcher;

use crate::config::NodeConfig;
use crate::rpc_client::{ChainRpcClient, ScannerRpcClient};

#[derive(Parser, Debug)]
#[command(name = "warden-node", version, about = "Bridge watcher: commits to observed events and merges them into triggers")]
struct Args {
    /// Path to the node config JSON.
    #[arg(long, default_value = "~/.warden/config.json")]
    config: PathBuf,

    /// Override the database directory from the config.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Run a single tick and exit.
    #[arg(long)]
    once: bool,

    /// Print this watcher's commitments and triggers and exit.
    #[arg(long, conflicts_with = "once")]
    report: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden=debug".into()),
        )
        .init();

    let args = Args::parse();
    let config = NodeConfig::load(&expand_tilde(&args.config))?;
    info!("warden watcher starting");

    // ── Database ──────────────────────────────────────────────────────────────
    let data_dir = expand_tilde(args.data_dir.as_ref().unwrap_or(&config.data_dir));
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(WatcherDb::open(&data_dir).context("opening watcher database")?);

    // ── Identity ──────────────────────────────────────────────────────────────
    let key_path = expand_tilde(&config.key_file);
    let json = std::fs::read_to_string(&key_path)
        .with_context(|| format!("reading key file {}", key_path.display()))?;
    let keypair: KeyPair = serde_json::from_str(&json).context("parsing key file")?;
    info!(wid = %keypair.wid, "watcher identity loaded");

    if args.report {
        write_report(&db, &keypair.wid, &mut std::io::stdout().lock())?;
        return Ok(());
    }

    // ── Collaborators ─────────────────────────────────────────────────────────
    let chain = Arc::new(ChainRpcClient::new(&config.chain_rpc_url));
    let feed = Arc::new(ScannerRpcClient::new(&config.scanner_rpc_url));
    let watcher = Watcher::new(config.watcher.clone(), db.clone(), chain, feed, Arc::new(keypair));

    if args.once {
        watcher.tick().await;
        db.flush().context("flushing database")?;
        return Ok(());
    }

    // ── Main loop ─────────────────────────────────────────────────────────────
    let mut interval = tokio::time::interval(Duration::from_secs(config.tick_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(every_secs = config.tick_interval_secs, "watcher ready");
    loop {
        tokio::select! {
            _ = interval.tick() => watcher.tick().await,
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    db.flush().context("flushing database")?;
    Ok(())
}

/// One line per commitment and trigger involving `wid`, read page by page.
fn write_report(db: &WatcherDb, wid: &Wid, out: &mut impl Write) -> anyhow::Result<()> {
    let page = DEFAULT_API_LIMIT as usize;
    let mut offset = 0;
    loop {
        let batch = db.commitments_by_wid(wid, offset, page)?;
        for c in &batch {
            let spent = c.spend_height.map_or_else(|| "-".to_string(), |h| h.to_string());
            writeln!(out, "commitment {} event={} height={} spent={}", c.box_id, c.event_id, c.height, spent)?;
        }
        if batch.len() < page {
            break;
        }
        offset += page;
    }
    offset = 0;
    loop {
        let batch = db.triggers_by_wid(wid, offset, page)?;
        for t in &batch {
            writeln!(out, "trigger {} event={} height={} wids={}", t.box_id, t.event_id, t.height, t.wids.len())?;
        }
        if batch.len() < page {
            break;
        }
        offset += page;
    }
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

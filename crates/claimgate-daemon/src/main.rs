//! claimgate-daemon - Claim Admission Policy Engine Daemon
//!
//! Watches a claim store for pending claims and drives each through the
//! allowlist validator and the store enforcer until a shutdown signal
//! arrives. The ledger-insertion service and the submission API are
//! separate processes sharing the same store directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use claimgate_core::enforcer::StoreEnforcer;
use claimgate_core::policy::{AllowlistValidator, SchemaRef};
use claimgate_core::store::{ClaimStore, FsClaimStore};
use claimgate_daemon::engine::{EngineConfig, PolicyEngine};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// claimgate daemon - transparency-log claim admission
#[derive(Parser, Debug)]
#[command(name = "claimgate-daemon")]
#[command(version, about, long_about = None)]
struct Args {
    /// Root directory of the claim store
    #[arg(long, default_value = "claimgate-store")]
    store_dir: PathBuf,

    /// Path to the admission schema document
    #[arg(long)]
    schema: PathBuf,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_interval_ms: u64,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let store = Arc::new(
        FsClaimStore::open(&args.store_dir)
            .with_context(|| format!("failed to open claim store at {}", args.store_dir.display()))?,
    );
    let store: Arc<dyn ClaimStore> = store;
    let validator = Arc::new(AllowlistValidator::new());
    let enforcer = Arc::new(StoreEnforcer::new(Arc::clone(&store)));

    let config = EngineConfig::new(SchemaRef::new(&args.schema))
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms));

    info!(
        store = %args.store_dir.display(),
        schema = %args.schema.display(),
        "claimgate daemon starting"
    );
    let handle = PolicyEngine::spawn(config, store, validator, enforcer);

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
        },
        _ = sigterm.recv() => {},
    }

    info!("shutdown signal received, draining in-flight pass");
    handle
        .stop()
        .await
        .context("engine task did not shut down cleanly")?;
    info!("claimgate daemon stopped");
    Ok(())
}

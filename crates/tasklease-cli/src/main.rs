//! tasklease-monitor: runs the sweeper against the configured store until
//! interrupted. Workers talk to the same store through `tasklease-core`.

use std::sync::Arc;

use tasklease_core::config::{LeaseConfig, SweeperConfig};
use tasklease_core::ports::{IdGenerator, SystemClock, UlidGenerator};
use tasklease_core::QueueBuilder;
use tasklease_libsql::{LibSqlTaskStore, StoreConfig};
use tracing::{Instrument, info, info_span};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let store_config = StoreConfig::from_env()?;
    let lease_config = LeaseConfig::from_env()?;
    let sweeper_config = SweeperConfig::from_env()?;
    let instance = UlidGenerator::new(SystemClock).generate_worker_id();

    eprintln!("tasklease-monitor v{}", env!("CARGO_PKG_VERSION"));
    match store_config.remote_url() {
        Some(url) => eprintln!("   Store: {url}"),
        None => eprintln!("   Store: {}", store_config.database),
    }
    eprintln!("   Sweep interval: {:?}", sweeper_config.interval);
    let store = LibSqlTaskStore::open(&store_config).await?;
    let queue = QueueBuilder::new()
        .store(Arc::new(store))
        .lease_config(lease_config)
        .sweeper_config(sweeper_config)
        .build()?;
    eprintln!("   Default lease: {:?}", queue.lease().config().default_lease);

    let counts = queue.query().counts(None).await?;
    info!(counts = %serde_json::to_string(&counts)?, "store status");

    let sweeper = queue.sweeper().clone();
    let span = info_span!("sweeper", instance = %instance);
    let handle = span.in_scope(|| sweeper.spawn());

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    handle.shutdown_and_join().instrument(span).await;

    let counts = queue.query().counts(None).await?;
    info!(counts = %serde_json::to_string(&counts)?, "store status at exit");
    Ok(())
}

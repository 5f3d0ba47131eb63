pub mod aggregator;
pub mod config;
pub mod fanout;
pub mod retention;
pub mod server;
pub mod sqlite_pragma;
pub mod store;

use {
    config::Config,
    dotenv::dotenv,
    fanout::PulseHub,
    log::{error, info},
    retention::{retention_task, RetentionPolicy},
    server::{router, AppState},
    std::{sync::Arc, time::Duration},
    store::EventStore,
};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    info!("🚀 PulseFlow server starting...");

    let config = Config::from_env();
    config.validate()?;

    info!("📊 Configuration:");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Bind address: {}", config.bind_addr);
    info!("   ├─ Retention: {} days", config.retention_days);
    info!("   └─ Purge interval: {}s", config.purge_interval_secs);

    let store = Arc::new(EventStore::open(&config.db_path)?);
    let hub = Arc::new(PulseHub::new());

    let policy = RetentionPolicy::new(
        config.retention_days,
        Duration::from_secs(config.purge_interval_secs),
    );
    let store_for_retention = store.clone();
    tokio::spawn(async move {
        retention_task(store_for_retention, policy).await;
    });
    info!("✅ Retention task spawned");

    let state = AppState {
        store,
        hub,
        max_history_days: config.retention_days,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("📡 Listening on {}", config.bind_addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(e) = result {
                error!("❌ Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("⚠️  Received CTRL+C, shutting down...");
        }
    }

    info!("✅ PulseFlow server stopped");
    Ok(())
}

//! Robodeck console - headless runner for the synchronization core.
//!
//! Mirrors the operator log and snapshot summaries to the tracing output until
//! Ctrl-C.

use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use robodeck_console::infrastructure::ApiAdapter;
use robodeck_domain::LogEntryId;
use robodeck_console::{ConsoleConfig, RawApiPort, SyncCore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Reads .env / .env.local before the filter so RUST_LOG can live there too
    let config = ConsoleConfig::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "robodeck_console=debug,robodeck_domain=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Robodeck console");

    let api: Arc<dyn RawApiPort> = Arc::new(ApiAdapter::new(
        config.api_url.clone(),
        config.request_timeout,
    )?);
    let core = SyncCore::new(config, api)?;

    // Listeners get the full log on every change; print only what is new.
    let last_printed: Mutex<Option<LogEntryId>> = Mutex::new(None);
    let log_subscription = core.logs().subscribe(move |entries| {
        let mut last = last_printed.lock().unwrap_or_else(PoisonError::into_inner);
        let start = (*last)
            .and_then(|id| entries.iter().position(|e| e.id == id))
            .map_or(0, |idx| idx + 1);
        for entry in &entries[start..] {
            tracing::info!("[{:>7}] {}", entry.level, entry.message);
        }
        if let Some(newest) = entries.last() {
            *last = Some(newest.id);
        }
    });

    let link = core.connection();
    let robot_subscription = core.store().subscribe_robots(move |robots| {
        let connected = robots.iter().filter(|r| r.is_connected()).count();
        let paired = robots.iter().filter(|r| r.is_paired()).count();
        tracing::info!(
            total = robots.len(),
            connected,
            paired,
            push_channel = %link.state(),
            "Robot snapshot"
        );
    });
    let controller_subscription = core.store().subscribe_controllers(|controllers| {
        let enabled = controllers.iter().filter(|c| c.enabled).count();
        tracing::info!(total = controllers.len(), enabled, "Controller snapshot");
    });
    let timer_subscription = core.timer().subscribe(|state| {
        tracing::debug!(
            phase = ?state.phase,
            remaining_secs = state.remaining_seconds(),
            emergency_stop = state.emergency_stop_active,
            "Match timer"
        );
    });

    core.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    for subscription in [
        log_subscription,
        robot_subscription,
        controller_subscription,
        timer_subscription,
    ] {
        subscription.dispose();
    }
    core.stop().await;

    Ok(())
}

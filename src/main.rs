use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use innkeep::config::EngineConfig;
use innkeep::engine::Engine;
use innkeep::model::Event;

const COMPACT_CHECK_EVERY: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EngineConfig::from_env()?;
    innkeep::observability::init(config.metrics_port)?;

    let engine = Arc::new(Engine::open(&config)?);
    let rooms = config.load_rooms()?;
    engine.seed_rooms(&rooms).await?;

    info!("innkeep engine ready");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  rooms: {}", engine.list_rooms().await?.len());
    info!("  storage_timeout: {:?}", config.storage_timeout);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor = tokio::spawn(innkeep::maintenance::run_compactor(
        engine.clone(),
        config.compact_threshold,
        COMPACT_CHECK_EVERY,
    ));

    // Stand-in for the mail collaborator: log each new booking it would act on.
    let mut changes = engine.subscribe();
    let mailer = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(Event::ReservationCommitted { reservation, .. }) => info!(
                    "new reservation {} for {} {} <{}>",
                    reservation.id,
                    reservation.guest.first_name,
                    reservation.guest.last_name,
                    reservation.guest.email
                ),
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => warn!("mail listener lagged, {missed} changes missed"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    shutdown_signal().await?;
    info!("shutdown signal received");
    compactor.abort();
    mailer.abort();

    let events = engine.compact_wal().await?;
    info!("final compaction wrote {events} events; innkeep stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::core::state::AppState;
use crate::tasks::expiry;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles = vec![tokio::spawn(expiry_loop(state.clone(), shutdown_rx))];

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

pub(crate) async fn expiry_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let settings = state.settings().exam();
    let batch_size = settings.expiry_sweep_batch_size;
    let mut tick = interval(Duration::from_secs(settings.expiry_sweep_interval_seconds));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_seconds = settings.expiry_sweep_interval_seconds,
        batch_size,
        "Expiry sweep started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                let result = expiry::close_expired_attempts(state.attempts(), batch_size).await;
                if let Err(err) = result {
                    tracing::error!(error = %err, "close_expired_attempts failed");
                }
            }
        }
    }

    tracing::info!("Expiry sweep stopped");
}

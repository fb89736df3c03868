use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    // A second install (tests, worker + api in one process) keeps the first recorder.
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("attempts_started_total", "Attempts created or resumed by start");
    metrics::describe_counter!("answers_saved_total", "Answers accepted while in progress");
    metrics::describe_counter!("attempts_submitted_total", "Attempts sealed, by trigger");
    metrics::describe_counter!(
        "expiry_sweep_submitted_total",
        "Attempts force-submitted by the expiry sweep"
    );
    metrics::describe_counter!("grades_recorded_total", "Per-question grades written by faculty");
    metrics::describe_counter!("attempts_returned_total", "Results released to students");
    metrics::describe_histogram!(
        "attempt_clock_drift_seconds",
        "Absolute difference between client-reported and server elapsed time"
    );
}

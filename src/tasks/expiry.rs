use crate::db::types::SubmitTrigger;
use crate::services::attempts::{AttemptResult, AttemptService};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepReport {
    pub(crate) examined: usize,
    pub(crate) submitted: usize,
    pub(crate) already_sealed: usize,
    pub(crate) failed: usize,
}

/// Force-submits one batch of attempts whose time limit has run out. Anything
/// left over, including failures, is picked up by the next tick.
pub(crate) async fn close_expired_attempts(
    service: &AttemptService,
    batch_size: u32,
) -> AttemptResult<SweepReport> {
    let now = service.now();
    let expired = service.store().list_expired(now, i64::from(batch_size)).await?;
    let mut report = SweepReport { examined: expired.len(), ..SweepReport::default() };

    for attempt_id in expired {
        match service.submit(&attempt_id, SubmitTrigger::Timeout).await {
            Ok(outcome) if outcome.already_submitted => report.already_sealed += 1,
            Ok(_) => report.submitted += 1,
            Err(err) => {
                report.failed += 1;
                tracing::warn!(attempt_id, error = %err, "Failed to force-submit expired attempt");
            }
        }
    }

    if report.submitted > 0 {
        metrics::counter!("expiry_sweep_submitted_total").increment(report.submitted as u64);
        tracing::info!(
            submitted = report.submitted,
            failed = report.failed,
            "Expired attempts force-submitted"
        );
    }

    Ok(report)
}

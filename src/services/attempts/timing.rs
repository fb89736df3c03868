use time::{Duration, PrimitiveDateTime};

/// Server-side deadline of an attempt; `None` when the exam is untimed.
pub(crate) fn deadline(
    started_at: PrimitiveDateTime,
    time_limit_minutes: Option<i32>,
) -> Option<PrimitiveDateTime> {
    time_limit_minutes.map(|minutes| started_at + Duration::minutes(i64::from(minutes)))
}

/// Writes are refused strictly after the deadline; the error carries it. The
/// sweep picks attempts up at the deadline itself, so the two never disagree
/// about who is late.
pub(crate) fn ensure_open(
    deadline: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Result<(), PrimitiveDateTime> {
    match deadline {
        Some(deadline) if now > deadline => Err(deadline),
        _ => Ok(()),
    }
}

pub(crate) fn remaining_seconds(
    deadline: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Option<i64> {
    deadline.map(|deadline| (deadline - now).whole_seconds().max(0))
}

pub(crate) fn elapsed_seconds(started_at: PrimitiveDateTime, now: PrimitiveDateTime) -> i64 {
    (now - started_at).whole_seconds().max(0)
}

/// Absolute gap between what the client claims has elapsed and what the
/// server measured.
pub(crate) fn clock_drift_seconds(server_elapsed: i64, client_elapsed: i64) -> i64 {
    (server_elapsed - client_elapsed).abs()
}

use serde::Serialize;

use crate::db::models::Attempt;
use crate::db::types::AttemptStatus;
use crate::services::attempts::{AttemptResult, AttemptService};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ReturnFailure {
    pub(crate) attempt_id: String,
    pub(crate) code: &'static str,
    pub(crate) detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct BulkReturnReport {
    pub(crate) returned: Vec<String>,
    pub(crate) failed: Vec<ReturnFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ExamStatistics {
    pub(crate) exam_id: String,
    pub(crate) attempt_count: usize,
    pub(crate) average_percentage: Option<f64>,
    pub(crate) min_percentage: Option<f64>,
    pub(crate) max_percentage: Option<f64>,
    pub(crate) pass_count: usize,
    pub(crate) pass_rate: Option<f64>,
}

impl AttemptService {
    /// Returns every graded attempt of an exam. Each attempt is handled on its
    /// own; one failure never stops the rest.
    pub(crate) async fn return_all_graded(
        &self,
        exam_id: &str,
        overall_feedback: Option<String>,
    ) -> AttemptResult<BulkReturnReport> {
        let graded = self.list_for_exam(exam_id, Some(AttemptStatus::Graded)).await?;
        let mut report = BulkReturnReport::default();

        for attempt in graded {
            match self.return_to_student(&attempt.id, overall_feedback.clone()).await {
                Ok(returned) => report.returned.push(returned.id),
                Err(err) => {
                    tracing::warn!(
                        exam_id,
                        attempt_id = %attempt.id,
                        error = %err,
                        "Bulk return skipped attempt"
                    );
                    report.failed.push(ReturnFailure {
                        attempt_id: attempt.id,
                        code: err.code(),
                        detail: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            exam_id,
            returned = report.returned.len(),
            failed = report.failed.len(),
            "Bulk return finished"
        );
        Ok(report)
    }

    pub(crate) async fn statistics(&self, exam_id: &str) -> AttemptResult<ExamStatistics> {
        let attempts = self.list_for_exam(exam_id, None).await?;
        Ok(fold_statistics(exam_id, &attempts))
    }
}

/// Folds over every attempt that has left the in-progress state.
pub(crate) fn fold_statistics(exam_id: &str, attempts: &[Attempt]) -> ExamStatistics {
    let finished: Vec<&Attempt> =
        attempts.iter().filter(|attempt| attempt.status != AttemptStatus::InProgress).collect();

    let attempt_count = finished.len();
    let pass_count = finished.iter().filter(|attempt| attempt.is_passing).count();
    let percentages = finished.iter().map(|attempt| attempt.percentage);

    let (average_percentage, pass_rate) = if attempt_count == 0 {
        (None, None)
    } else {
        let count = attempt_count as f64;
        (
            Some(percentages.clone().sum::<f64>() / count),
            Some(pass_count as f64 * 100.0 / count),
        )
    };

    ExamStatistics {
        exam_id: exam_id.to_string(),
        attempt_count,
        average_percentage,
        min_percentage: percentages.clone().reduce(f64::min),
        max_percentage: percentages.reduce(f64::max),
        pass_count,
        pass_rate,
    }
}

//! Attempt state machine: in_progress -> submitted -> graded -> returned.
//!
//! Every transition is a compare-and-set against the store, so concurrent
//! saves, submits and grades resolve without locks held across requests.

mod aggregate;
mod errors;
pub(crate) mod timing;


use std::sync::Arc;

use serde_json::json;
use sqlx::types::Json;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::time::Clock;
use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::{AttemptStatus, SubmitTrigger};
use crate::repositories::store::{
    AggregateWrite, AnswerWrite, AttemptStore, ExamSource, GradeWrite, ReturnWrite, ScoreWrite,
    SubmissionWrite,
};
use crate::services::notifications::{Notification, NotificationKind, NotificationSink};
use crate::services::question_bank::{validate_exam, AnswerPayload, ExamConfig, Question};
use crate::services::scoring;
use crate::services::shuffle::{self, QuestionView};

pub(crate) use errors::{AttemptError, AttemptResult};

/// Upper bound on optimistic retries before reporting contention.
pub(crate) const MAX_CAS_RETRIES: usize = 8;

#[derive(Clone)]
pub(crate) struct AttemptService {
    store: Arc<dyn AttemptStore>,
    exams: Arc<dyn ExamSource>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    drift_warn_seconds: i64,
}

#[derive(Debug, Clone)]
pub(crate) struct StartRequest {
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct StartOutcome {
    pub(crate) attempt: Attempt,
    /// The student already had this attempt in progress.
    pub(crate) resumed: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct SaveRequest {
    pub(crate) question_id: String,
    pub(crate) payload: AnswerPayload,
    pub(crate) client_elapsed_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SavedAnswer {
    pub(crate) attempt_id: String,
    pub(crate) question_id: String,
    pub(crate) answered_at: PrimitiveDateTime,
    pub(crate) remaining_seconds: Option<i64>,
}

#[derive(Debug, Clone)]
pub(crate) struct SubmitOutcome {
    pub(crate) attempt: Attempt,
    /// Someone sealed the attempt first; this call changed nothing.
    pub(crate) already_submitted: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct GradeRequest {
    pub(crate) question_id: String,
    pub(crate) points_earned: f64,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_by_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Viewer {
    Student,
    Faculty,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AnswerView {
    pub(crate) question_id: String,
    pub(crate) payload: Option<AnswerPayload>,
    pub(crate) answered_at: Option<PrimitiveDateTime>,
    pub(crate) points_earned: Option<f64>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) feedback: Option<String>,
    pub(crate) graded_at: Option<PrimitiveDateTime>,
    /// Faculty only.
    pub(crate) graded_by_id: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptView {
    pub(crate) attempt: Attempt,
    /// Scores, correctness and feedback are included.
    pub(crate) results_visible: bool,
    pub(crate) questions: Vec<QuestionView>,
    /// Full definitions including the key; faculty only.
    pub(crate) answer_key: Option<Vec<Question>>,
    pub(crate) answers: Vec<AnswerView>,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) remaining_seconds: Option<i64>,
}

impl AttemptService {
    pub(crate) fn new(
        store: Arc<dyn AttemptStore>,
        exams: Arc<dyn ExamSource>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, exams, notifier, clock, drift_warn_seconds: 30 }
    }

    pub(crate) fn with_drift_warning(mut self, seconds: u64) -> Self {
        self.drift_warn_seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        self
    }

    pub(crate) fn now(&self) -> PrimitiveDateTime {
        self.clock.now()
    }

    pub(crate) async fn exam(&self, exam_id: &str) -> AttemptResult<ExamConfig> {
        self.exams
            .load_exam(exam_id)
            .await?
            .ok_or_else(|| AttemptError::ExamNotFound(exam_id.to_string()))
    }

    pub(crate) async fn attempt(&self, attempt_id: &str) -> AttemptResult<Attempt> {
        self.store
            .find_attempt(attempt_id)
            .await?
            .ok_or_else(|| AttemptError::AttemptNotFound(attempt_id.to_string()))
    }

    pub(crate) fn store(&self) -> &dyn AttemptStore {
        self.store.as_ref()
    }

    /// Starts a new attempt, or hands back the one already in progress.
    pub(crate) async fn start(&self, request: StartRequest) -> AttemptResult<StartOutcome> {
        let exam = self.exam(&request.exam_id).await?;

        for _ in 0..MAX_CAS_RETRIES {
            if let Some(existing) =
                self.store.find_in_progress(&exam.id, &request.student_id).await?
            {
                tracing::debug!(
                    attempt_id = %existing.id,
                    exam_id = %exam.id,
                    student_id = %request.student_id,
                    "Resuming attempt already in progress"
                );
                metrics::counter!("attempts_started_total", "outcome" => "resumed").increment(1);
                return Ok(StartOutcome { attempt: existing, resumed: true });
            }

            // Only new attempts depend on the live exam; a resume uses its snapshot.
            validate_exam(&exam)?;

            let used = self.store.count_finished(&exam.id, &request.student_id).await?;
            if used >= i64::from(exam.max_attempts) {
                tracing::debug!(
                    exam_id = %exam.id,
                    student_id = %request.student_id,
                    used,
                    max_attempts = exam.max_attempts,
                    "Attempt limit reached"
                );
                return Err(AttemptError::AttemptLimitExceeded {
                    max_attempts: exam.max_attempts,
                    used,
                });
            }

            let attempt = self.new_attempt(&exam, &request, used);
            if self.store.insert_attempt(&attempt).await? {
                tracing::info!(
                    attempt_id = %attempt.id,
                    exam_id = %attempt.exam_id,
                    student_id = %attempt.student_id,
                    attempt_number = attempt.attempt_number,
                    status = %attempt.status,
                    "Attempt started"
                );
                metrics::counter!("attempts_started_total", "outcome" => "created").increment(1);
                return Ok(StartOutcome { attempt, resumed: false });
            }

            tracing::debug!(
                exam_id = %exam.id,
                student_id = %request.student_id,
                "Concurrent start detected, re-reading"
            );
        }

        Err(AttemptError::Contention)
    }

    fn new_attempt(&self, exam: &ExamConfig, request: &StartRequest, used: i64) -> Attempt {
        let now = self.clock.now();
        Attempt {
            id: Uuid::new_v4().to_string(),
            exam_id: exam.id.clone(),
            student_id: request.student_id.clone(),
            attempt_number: i32::try_from(used + 1).unwrap_or(i32::MAX),
            status: AttemptStatus::InProgress,
            started_at: now,
            submitted_at: None,
            submit_trigger: None,
            returned_at: None,
            time_limit_minutes: exam.time_limit_minutes,
            passing_percentage: exam.passing_percentage,
            shuffle_questions: exam.shuffle_questions,
            shuffle_choices: exam.shuffle_choices,
            shuffle_seed: shuffle::new_seed(),
            questions: Json(exam.questions.clone()),
            total_score: 0.0,
            max_score: exam.max_score(),
            percentage: 0.0,
            is_passing: false,
            overall_feedback: None,
            ip_address: request.ip_address.clone(),
            user_agent: request.user_agent.clone(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records one answer while the attempt is open. The provisional score is
    /// stored but never returned.
    pub(crate) async fn save_answer(
        &self,
        attempt_id: &str,
        request: SaveRequest,
    ) -> AttemptResult<SavedAnswer> {
        let attempt = self.attempt(attempt_id).await?;
        if attempt.status != AttemptStatus::InProgress {
            tracing::debug!(attempt_id, status = %attempt.status, "Save rejected, attempt sealed");
            return Err(AttemptError::AttemptNotEditable { status: attempt.status });
        }

        let now = self.clock.now();
        let deadline = timing::deadline(attempt.started_at, attempt.time_limit_minutes);
        timing::ensure_open(deadline, now).map_err(|deadline| {
            tracing::debug!(attempt_id, "Save rejected, time limit passed");
            AttemptError::AttemptExpired { deadline }
        })?;

        let question = attempt
            .question(&request.question_id)
            .ok_or_else(|| AttemptError::QuestionNotFound(request.question_id.clone()))?;
        scoring::validate_answer(question, &request.payload)
            .map_err(AttemptError::MalformedAnswer)?;
        let provisional = scoring::score(question, Some(&request.payload));

        let write = AnswerWrite {
            question_id: request.question_id.clone(),
            payload: request.payload,
            points_earned: provisional.points_earned,
            is_correct: provisional.is_correct,
            answered_at: now,
        };
        if !self.store.save_answer(attempt_id, &write).await? {
            let status = self
                .store
                .find_attempt(attempt_id)
                .await?
                .map_or(AttemptStatus::Submitted, |current| current.status);
            tracing::debug!(attempt_id, status = %status, "Save lost the race against submit");
            return Err(AttemptError::AttemptNotEditable { status });
        }
        metrics::counter!("answers_saved_total").increment(1);

        if let Some(client_elapsed) = request.client_elapsed_seconds {
            self.record_drift(&attempt, now, client_elapsed);
        }

        Ok(SavedAnswer {
            attempt_id: attempt.id,
            question_id: request.question_id,
            answered_at: now,
            remaining_seconds: timing::remaining_seconds(deadline, now),
        })
    }

    fn record_drift(&self, attempt: &Attempt, now: PrimitiveDateTime, client_elapsed: i64) {
        let server_elapsed = timing::elapsed_seconds(attempt.started_at, now);
        let drift = timing::clock_drift_seconds(server_elapsed, client_elapsed);
        metrics::histogram!("attempt_clock_drift_seconds").record(drift as f64);

        if drift > self.drift_warn_seconds {
            tracing::warn!(
                attempt_id = %attempt.id,
                server_elapsed,
                client_elapsed,
                drift,
                "Client clock drift exceeds threshold"
            );
        }
    }

    /// Seals the attempt with authoritative scores. Calling it on an attempt
    /// that is already sealed returns that attempt unchanged.
    pub(crate) async fn submit(
        &self,
        attempt_id: &str,
        trigger: SubmitTrigger,
    ) -> AttemptResult<SubmitOutcome> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut attempt = self.attempt(attempt_id).await?;
            if attempt.status != AttemptStatus::InProgress {
                tracing::debug!(
                    attempt_id,
                    status = %attempt.status,
                    trigger = trigger.as_str(),
                    "Submit on sealed attempt is a no-op"
                );
                return Ok(SubmitOutcome { attempt, already_submitted: true });
            }

            let now = self.clock.now();
            let mut answers = self.store.list_answers(attempt_id).await?;
            let scores = rescore(&attempt.questions.0, &mut answers);
            let totals =
                aggregate::compute(&attempt.questions.0, &answers, attempt.passing_percentage);
            let status =
                if totals.fully_graded { AttemptStatus::Graded } else { AttemptStatus::Submitted };

            let write = SubmissionWrite {
                status,
                trigger,
                submitted_at: now,
                total_score: totals.total_score,
                percentage: totals.percentage,
                is_passing: totals.is_passing,
                scores,
            };
            if !self.store.seal_attempt(attempt_id, attempt.revision, &write).await? {
                tracing::debug!(attempt_id, "Attempt changed during submit, retrying");
                continue;
            }

            attempt.status = status;
            attempt.submitted_at = Some(now);
            attempt.submit_trigger = Some(trigger);
            attempt.total_score = totals.total_score;
            attempt.percentage = totals.percentage;
            attempt.is_passing = totals.is_passing;
            attempt.revision += 1;
            attempt.updated_at = now;

            tracing::info!(
                attempt_id = %attempt.id,
                exam_id = %attempt.exam_id,
                status = %attempt.status,
                trigger = trigger.as_str(),
                total_score = attempt.total_score,
                max_score = attempt.max_score,
                "Attempt submitted"
            );
            metrics::counter!("attempts_submitted_total", "trigger" => trigger.as_str())
                .increment(1);
            return Ok(SubmitOutcome { attempt, already_submitted: false });
        }

        Err(AttemptError::Contention)
    }

    /// Writes a faculty grade for one question and refreshes the totals.
    ///
    /// The grade and the totals are separate writes. If the refresh gives up
    /// with `Contention` the grade is kept and the totals stay stale until the
    /// next grade or return on this attempt recomputes them.
    pub(crate) async fn grade_question(
        &self,
        attempt_id: &str,
        request: GradeRequest,
    ) -> AttemptResult<Attempt> {
        let attempt = self.attempt(attempt_id).await?;
        if !attempt.status.is_gradable() {
            return Err(AttemptError::AttemptNotGradable { status: attempt.status });
        }

        let question = attempt
            .question(&request.question_id)
            .ok_or_else(|| AttemptError::QuestionNotFound(request.question_id.clone()))?;
        let max_points = f64::from(question.points);
        if !request.points_earned.is_finite()
            || request.points_earned < 0.0
            || request.points_earned > max_points
        {
            return Err(AttemptError::PointsOutOfRange {
                points_earned: request.points_earned,
                max_points: question.points,
            });
        }

        let grade = GradeWrite {
            question_id: request.question_id.clone(),
            points_earned: request.points_earned,
            is_correct: question.is_auto_scored().then_some(request.points_earned == max_points),
            feedback: request.feedback,
            graded_by_id: request.graded_by_id.clone(),
            graded_at: self.clock.now(),
        };
        if !self.store.record_grade(attempt_id, &grade).await? {
            let status = self
                .store
                .find_attempt(attempt_id)
                .await?
                .map_or(AttemptStatus::Returned, |current| current.status);
            return Err(AttemptError::AttemptNotGradable { status });
        }

        tracing::info!(
            attempt_id,
            question_id = %request.question_id,
            graded_by = %request.graded_by_id,
            points_earned = request.points_earned,
            "Question graded"
        );
        metrics::counter!("grades_recorded_total").increment(1);

        self.refresh_aggregate(attempt_id).await
    }

    async fn refresh_aggregate(&self, attempt_id: &str) -> AttemptResult<Attempt> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut attempt = self.attempt(attempt_id).await?;
            if !attempt.status.is_gradable() {
                return Ok(attempt);
            }

            let answers = self.store.list_answers(attempt_id).await?;
            let totals =
                aggregate::compute(&attempt.questions.0, &answers, attempt.passing_percentage);
            let status =
                if totals.fully_graded { AttemptStatus::Graded } else { AttemptStatus::Submitted };
            let now = self.clock.now();

            let write = AggregateWrite {
                status,
                total_score: totals.total_score,
                percentage: totals.percentage,
                is_passing: totals.is_passing,
                updated_at: now,
            };
            if !self.store.update_aggregate(attempt_id, attempt.revision, &write).await? {
                continue;
            }

            if status != attempt.status {
                tracing::info!(
                    attempt_id,
                    exam_id = %attempt.exam_id,
                    status = %status,
                    total_score = totals.total_score,
                    "Attempt fully graded"
                );
            }
            attempt.status = status;
            attempt.total_score = totals.total_score;
            attempt.percentage = totals.percentage;
            attempt.is_passing = totals.is_passing;
            attempt.updated_at = now;
            return Ok(attempt);
        }

        Err(AttemptError::Contention)
    }

    /// Releases a fully graded result to the student and notifies them.
    pub(crate) async fn return_to_student(
        &self,
        attempt_id: &str,
        overall_feedback: Option<String>,
    ) -> AttemptResult<Attempt> {
        for _ in 0..MAX_CAS_RETRIES {
            let mut attempt = self.attempt(attempt_id).await?;
            if attempt.status == AttemptStatus::Submitted {
                // A grade may have landed without its aggregate refresh.
                attempt = self.refresh_aggregate(attempt_id).await?;
            }
            if attempt.status != AttemptStatus::Graded {
                tracing::debug!(attempt_id, status = %attempt.status, "Return rejected");
                return Err(AttemptError::AttemptNotFullyGraded { status: attempt.status });
            }

            let answers = self.store.list_answers(attempt_id).await?;
            let totals =
                aggregate::compute(&attempt.questions.0, &answers, attempt.passing_percentage);
            if !totals.fully_graded {
                return Err(AttemptError::AttemptNotFullyGraded { status: attempt.status });
            }

            let write = ReturnWrite {
                overall_feedback: overall_feedback.clone(),
                returned_at: self.clock.now(),
                total_score: totals.total_score,
                percentage: totals.percentage,
                is_passing: totals.is_passing,
            };
            let Some(returned) =
                self.store.mark_returned(attempt_id, attempt.revision, &write).await?
            else {
                continue;
            };

            tracing::info!(
                attempt_id,
                exam_id = %returned.exam_id,
                status = %returned.status,
                "Attempt returned to student"
            );
            metrics::counter!("attempts_returned_total").increment(1);

            self.notifier
                .notify(Notification {
                    user_id: returned.student_id.clone(),
                    kind: NotificationKind::AttemptReturned,
                    payload: json!({
                        "attempt_id": returned.id,
                        "exam_id": returned.exam_id,
                        "attempt_number": returned.attempt_number,
                        "total_score": returned.total_score,
                        "max_score": returned.max_score,
                        "percentage": returned.percentage,
                        "is_passing": returned.is_passing,
                    }),
                })
                .await;

            return Ok(returned);
        }

        Err(AttemptError::Contention)
    }

    pub(crate) async fn view(
        &self,
        attempt_id: &str,
        viewer: Viewer,
    ) -> AttemptResult<AttemptView> {
        let attempt = self.attempt(attempt_id).await?;
        let answers = self.store.list_answers(attempt_id).await?;
        let now = self.clock.now();

        let results_visible = match viewer {
            Viewer::Faculty => true,
            Viewer::Student => attempt.status == AttemptStatus::Returned,
        };
        let deadline = timing::deadline(attempt.started_at, attempt.time_limit_minutes);
        let remaining_seconds = if attempt.status == AttemptStatus::InProgress {
            timing::remaining_seconds(deadline, now)
        } else {
            None
        };

        let questions = shuffle::arrange(
            &attempt.questions.0,
            attempt.shuffle_seed,
            attempt.shuffle_questions,
            attempt.shuffle_choices,
        );
        let answer_key = (viewer == Viewer::Faculty).then(|| attempt.questions.0.clone());
        let answers = answers
            .into_iter()
            .map(|answer| answer_view(answer, viewer, results_visible))
            .collect();

        Ok(AttemptView {
            attempt,
            results_visible,
            questions,
            answer_key,
            answers,
            deadline,
            remaining_seconds,
        })
    }

    pub(crate) async fn list_for_student(
        &self,
        student_id: &str,
        exam_id: Option<&str>,
    ) -> AttemptResult<Vec<Attempt>> {
        Ok(self.store.list_for_student(student_id, exam_id).await?)
    }

    pub(crate) async fn list_for_exam(
        &self,
        exam_id: &str,
        status: Option<AttemptStatus>,
    ) -> AttemptResult<Vec<Attempt>> {
        Ok(self.store.list_for_exam(exam_id, status).await?)
    }
}

/// Recomputes every stored answer from its payload. Cached scores from the
/// save step are never trusted.
fn rescore(questions: &[Question], answers: &mut [AttemptAnswer]) -> Vec<ScoreWrite> {
    let mut scores = Vec::with_capacity(answers.len());
    for answer in answers.iter_mut() {
        let Some(question) = questions.iter().find(|question| question.id == answer.question_id)
        else {
            continue;
        };
        let score = scoring::score(question, answer.payload.as_ref().map(|payload| &payload.0));
        answer.points_earned = score.points_earned;
        answer.is_correct = score.is_correct;
        scores.push(ScoreWrite {
            question_id: answer.question_id.clone(),
            points_earned: score.points_earned,
            is_correct: score.is_correct,
        });
    }
    scores
}

fn answer_view(answer: AttemptAnswer, viewer: Viewer, results_visible: bool) -> AnswerView {
    AnswerView {
        question_id: answer.question_id,
        payload: answer.payload.map(|payload| payload.0),
        answered_at: answer.answered_at,
        points_earned: results_visible.then_some(answer.points_earned),
        is_correct: if results_visible { answer.is_correct } else { None },
        feedback: if results_visible { answer.feedback } else { None },
        graded_at: if results_visible { answer.graded_at } else { None },
        graded_by_id: if viewer == Viewer::Faculty { answer.graded_by_id } else { None },
    }
}

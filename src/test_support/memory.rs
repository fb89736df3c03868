use std::collections::HashMap;

use async_trait::async_trait;
use time::PrimitiveDateTime;
use tokio::sync::Mutex;

use crate::db::models::{Attempt, AttemptAnswer};
use crate::db::types::AttemptStatus;
use crate::repositories::store::{
    AggregateWrite, AnswerWrite, AttemptStore, ExamSource, GradeWrite, ReturnWrite, StoreResult,
    SubmissionWrite,
};
use crate::services::attempts::timing;
use crate::services::question_bank::ExamConfig;

type Hook = Box<dyn FnOnce(&mut MemoryState) + Send>;

/// In-memory stand-in for Postgres. Each call runs under one lock, which
/// gives the same atomicity the SQL statements have.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
    before_seal: Mutex<Option<Hook>>,
    before_aggregate: Mutex<Option<Hook>>,
    before_return: Mutex<Option<Hook>>,
}

#[derive(Default)]
pub(crate) struct MemoryState {
    exams: HashMap<String, ExamConfig>,
    attempts: HashMap<String, Attempt>,
    answers: HashMap<(String, String), AttemptAnswer>,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn insert_exam(&self, exam: ExamConfig) {
        self.state.lock().await.exams.insert(exam.id.clone(), exam);
    }

    pub(crate) async fn attempts_for(&self, exam_id: &str, student_id: &str) -> Vec<Attempt> {
        let state = self.state.lock().await;
        let mut attempts: Vec<Attempt> = state
            .attempts
            .values()
            .filter(|attempt| attempt.exam_id == exam_id && attempt.student_id == student_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|attempt| attempt.attempt_number);
        attempts
    }

    /// Runs `hook` right before the next seal, as if another request slipped in.
    pub(crate) async fn before_next_seal(
        &self,
        hook: impl FnOnce(&mut MemoryState) + Send + 'static,
    ) {
        *self.before_seal.lock().await = Some(Box::new(hook));
    }

    pub(crate) async fn before_next_aggregate(
        &self,
        hook: impl FnOnce(&mut MemoryState) + Send + 'static,
    ) {
        *self.before_aggregate.lock().await = Some(Box::new(hook));
    }

    pub(crate) async fn before_next_return(
        &self,
        hook: impl FnOnce(&mut MemoryState) + Send + 'static,
    ) {
        *self.before_return.lock().await = Some(Box::new(hook));
    }

    async fn run_hook(&self, slot: &Mutex<Option<Hook>>, state: &mut MemoryState) {
        if let Some(hook) = slot.lock().await.take() {
            hook(state);
        }
    }
}

impl MemoryState {
    pub(crate) fn apply_save(&mut self, attempt_id: &str, write: &AnswerWrite) -> bool {
        let Some(attempt) = self.attempts.get_mut(attempt_id) else {
            return false;
        };
        if attempt.status != AttemptStatus::InProgress {
            return false;
        }
        attempt.revision += 1;
        attempt.updated_at = write.answered_at;

        let answer = self
            .answers
            .entry((attempt_id.to_string(), write.question_id.clone()))
            .or_insert_with(|| blank_answer(&write.question_id));
        answer.payload = Some(sqlx::types::Json(write.payload.clone()));
        answer.points_earned = write.points_earned;
        answer.is_correct = write.is_correct;
        answer.answered_at = Some(write.answered_at);
        true
    }

    pub(crate) fn apply_grade(&mut self, attempt_id: &str, grade: &GradeWrite) -> bool {
        let Some(attempt) = self.attempts.get_mut(attempt_id) else {
            return false;
        };
        if !attempt.status.is_gradable() {
            return false;
        }
        attempt.revision += 1;
        attempt.updated_at = grade.graded_at;

        let answer = self
            .answers
            .entry((attempt_id.to_string(), grade.question_id.clone()))
            .or_insert_with(|| blank_answer(&grade.question_id));
        answer.points_earned = grade.points_earned;
        answer.is_correct = grade.is_correct;
        answer.feedback = grade.feedback.clone();
        answer.graded_by_id = Some(grade.graded_by_id.clone());
        answer.graded_at = Some(grade.graded_at);
        true
    }

    /// Flips a graded attempt to returned, as a competing faculty request would.
    pub(crate) fn apply_return(&mut self, attempt_id: &str, now: PrimitiveDateTime) -> bool {
        let Some(attempt) = self.attempts.get_mut(attempt_id) else {
            return false;
        };
        if attempt.status != AttemptStatus::Graded {
            return false;
        }
        attempt.status = AttemptStatus::Returned;
        attempt.returned_at = Some(now);
        attempt.revision += 1;
        attempt.updated_at = now;
        true
    }
}

fn blank_answer(question_id: &str) -> AttemptAnswer {
    AttemptAnswer {
        question_id: question_id.to_string(),
        payload: None,
        points_earned: 0.0,
        is_correct: None,
        feedback: None,
        graded_at: None,
        graded_by_id: None,
        answered_at: None,
    }
}

#[async_trait]
impl ExamSource for MemoryStore {
    async fn load_exam(&self, exam_id: &str) -> StoreResult<Option<ExamConfig>> {
        Ok(self.state.lock().await.exams.get(exam_id).cloned())
    }
}

#[async_trait]
impl AttemptStore for MemoryStore {
    async fn find_attempt(&self, attempt_id: &str) -> StoreResult<Option<Attempt>> {
        Ok(self.state.lock().await.attempts.get(attempt_id).cloned())
    }

    async fn find_in_progress(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> StoreResult<Option<Attempt>> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .values()
            .find(|attempt| {
                attempt.exam_id == exam_id
                    && attempt.student_id == student_id
                    && attempt.status == AttemptStatus::InProgress
            })
            .cloned())
    }

    async fn count_finished(&self, exam_id: &str, student_id: &str) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .values()
            .filter(|attempt| {
                attempt.exam_id == exam_id
                    && attempt.student_id == student_id
                    && attempt.status != AttemptStatus::InProgress
            })
            .count() as i64)
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let conflict = state.attempts.contains_key(&attempt.id)
            || state.attempts.values().any(|existing| {
                existing.exam_id == attempt.exam_id
                    && existing.student_id == attempt.student_id
                    && (existing.attempt_number == attempt.attempt_number
                        || (existing.status == AttemptStatus::InProgress
                            && attempt.status == AttemptStatus::InProgress))
            });
        if conflict {
            return Ok(false);
        }

        state.attempts.insert(attempt.id.clone(), attempt.clone());
        Ok(true)
    }

    async fn list_answers(&self, attempt_id: &str) -> StoreResult<Vec<AttemptAnswer>> {
        let state = self.state.lock().await;
        let mut answers: Vec<AttemptAnswer> = state
            .answers
            .iter()
            .filter(|((owner, _), _)| owner == attempt_id)
            .map(|(_, answer)| answer.clone())
            .collect();
        answers.sort_by(|a, b| a.question_id.cmp(&b.question_id));
        Ok(answers)
    }

    async fn save_answer(&self, attempt_id: &str, answer: &AnswerWrite) -> StoreResult<bool> {
        Ok(self.state.lock().await.apply_save(attempt_id, answer))
    }

    async fn seal_attempt(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &SubmissionWrite,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        self.run_hook(&self.before_seal, &mut state).await;

        let Some(attempt) = state.attempts.get_mut(attempt_id) else {
            return Ok(false);
        };
        if attempt.revision != expected_revision || attempt.status != AttemptStatus::InProgress {
            return Ok(false);
        }

        attempt.status = write.status;
        attempt.submitted_at = Some(write.submitted_at);
        attempt.submit_trigger = Some(write.trigger);
        attempt.total_score = write.total_score;
        attempt.percentage = write.percentage;
        attempt.is_passing = write.is_passing;
        attempt.revision += 1;
        attempt.updated_at = write.submitted_at;

        for score in &write.scores {
            let key = (attempt_id.to_string(), score.question_id.clone());
            if let Some(answer) = state.answers.get_mut(&key) {
                answer.points_earned = score.points_earned;
                answer.is_correct = score.is_correct;
            }
        }
        Ok(true)
    }

    async fn record_grade(&self, attempt_id: &str, grade: &GradeWrite) -> StoreResult<bool> {
        Ok(self.state.lock().await.apply_grade(attempt_id, grade))
    }

    async fn update_aggregate(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &AggregateWrite,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        self.run_hook(&self.before_aggregate, &mut state).await;

        let Some(attempt) = state.attempts.get_mut(attempt_id) else {
            return Ok(false);
        };
        if attempt.revision != expected_revision || !attempt.status.is_gradable() {
            return Ok(false);
        }

        attempt.status = write.status;
        attempt.total_score = write.total_score;
        attempt.percentage = write.percentage;
        attempt.is_passing = write.is_passing;
        attempt.updated_at = write.updated_at;
        Ok(true)
    }

    async fn mark_returned(
        &self,
        attempt_id: &str,
        expected_revision: i64,
        write: &ReturnWrite,
    ) -> StoreResult<Option<Attempt>> {
        let mut state = self.state.lock().await;
        self.run_hook(&self.before_return, &mut state).await;

        let Some(attempt) = state.attempts.get_mut(attempt_id) else {
            return Ok(None);
        };
        if attempt.revision != expected_revision || attempt.status != AttemptStatus::Graded {
            return Ok(None);
        }

        attempt.status = AttemptStatus::Returned;
        attempt.overall_feedback = write.overall_feedback.clone();
        attempt.returned_at = Some(write.returned_at);
        attempt.total_score = write.total_score;
        attempt.percentage = write.percentage;
        attempt.is_passing = write.is_passing;
        attempt.revision += 1;
        attempt.updated_at = write.returned_at;
        Ok(Some(attempt.clone()))
    }

    async fn list_for_student(
        &self,
        student_id: &str,
        exam_id: Option<&str>,
    ) -> StoreResult<Vec<Attempt>> {
        let state = self.state.lock().await;
        let mut attempts: Vec<Attempt> = state
            .attempts
            .values()
            .filter(|attempt| attempt.student_id == student_id)
            .filter(|attempt| exam_id.map_or(true, |exam_id| attempt.exam_id == exam_id))
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(attempts)
    }

    async fn list_for_exam(
        &self,
        exam_id: &str,
        status: Option<AttemptStatus>,
    ) -> StoreResult<Vec<Attempt>> {
        let state = self.state.lock().await;
        let mut attempts: Vec<Attempt> = state
            .attempts
            .values()
            .filter(|attempt| attempt.exam_id == exam_id)
            .filter(|attempt| status.map_or(true, |status| attempt.status == status))
            .cloned()
            .collect();
        attempts.sort_by(|a, b| {
            a.student_id.cmp(&b.student_id).then(a.attempt_number.cmp(&b.attempt_number))
        });
        Ok(attempts)
    }

    async fn list_expired(&self, now: PrimitiveDateTime, limit: i64) -> StoreResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut expired: Vec<&Attempt> = state
            .attempts
            .values()
            .filter(|attempt| attempt.status == AttemptStatus::InProgress)
            .filter(|attempt| {
                timing::deadline(attempt.started_at, attempt.time_limit_minutes)
                    .is_some_and(|deadline| deadline <= now)
            })
            .collect();
        expired.sort_by_key(|attempt| attempt.started_at);
        Ok(expired
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|attempt| attempt.id.clone())
            .collect())
    }
}

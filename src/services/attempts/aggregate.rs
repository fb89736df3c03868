use std::collections::HashMap;

use crate::db::models::AttemptAnswer;
use crate::services::question_bank::{max_score, Question};

/// Attempt-level totals folded from the current answer set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Aggregate {
    pub(crate) total_score: f64,
    pub(crate) max_score: f64,
    pub(crate) percentage: f64,
    pub(crate) is_passing: bool,
    /// Every question is either auto-scored or carries a human grade.
    pub(crate) fully_graded: bool,
}

pub(crate) fn compute(
    questions: &[Question],
    answers: &[AttemptAnswer],
    passing_percentage: f64,
) -> Aggregate {
    let by_question: HashMap<&str, &AttemptAnswer> =
        answers.iter().map(|answer| (answer.question_id.as_str(), answer)).collect();

    let mut total_score = 0.0;
    let mut fully_graded = true;
    for question in questions {
        let answer = by_question.get(question.id.as_str());
        total_score += answer.map_or(0.0, |answer| answer.points_earned);

        let human_graded = answer.is_some_and(|answer| answer.graded_at.is_some());
        if !question.is_auto_scored() && !human_graded {
            fully_graded = false;
        }
    }

    let max_score = max_score(questions);
    let percentage = percentage(total_score, max_score);

    Aggregate {
        total_score,
        max_score,
        percentage,
        is_passing: percentage >= passing_percentage,
        fully_graded,
    }
}

pub(crate) fn percentage(total_score: f64, max_score: f64) -> f64 {
    if max_score <= 0.0 {
        return 0.0;
    }
    total_score * 100.0 / max_score
}

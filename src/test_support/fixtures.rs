use crate::services::question_bank::{Choice, ExamConfig, MatchPair, Question, QuestionBody};

fn question(id: &str, points: i32, body: QuestionBody) -> Question {
    Question { id: id.to_string(), points, order_index: 0, prompt: format!("Prompt {id}"), body }
}

/// Three choices `a`, `b`, `c`; `correct` is the right one.
pub(crate) fn multiple_choice(id: &str, points: i32, correct: &str) -> Question {
    let choices = ["a", "b", "c"]
        .into_iter()
        .map(|choice_id| Choice {
            id: choice_id.to_string(),
            text: format!("Choice {choice_id}"),
            is_correct: choice_id == correct,
        })
        .collect();
    question(id, points, QuestionBody::MultipleChoice { choices })
}

pub(crate) fn true_false(id: &str, points: i32, correct_answer: bool) -> Question {
    question(id, points, QuestionBody::TrueFalse { correct_answer })
}

pub(crate) fn short_answer(
    id: &str,
    points: i32,
    accepted: &[&str],
    case_sensitive: bool,
) -> Question {
    question(
        id,
        points,
        QuestionBody::ShortAnswer {
            accepted_answers: accepted.iter().map(|answer| answer.to_string()).collect(),
            case_sensitive,
        },
    )
}

pub(crate) fn fill_in_blank(
    id: &str,
    points: i32,
    accepted: &[&str],
    case_sensitive: bool,
) -> Question {
    question(
        id,
        points,
        QuestionBody::FillInBlank {
            accepted_answers: accepted.iter().map(|answer| answer.to_string()).collect(),
            case_sensitive,
        },
    )
}

pub(crate) fn essay(id: &str, points: i32) -> Question {
    question(
        id,
        points,
        QuestionBody::Essay {
            rubric: "Clear argument, cited sources".to_string(),
            max_words: None,
        },
    )
}

pub(crate) fn matching(id: &str, points: i32, pairs: &[(&str, &str)]) -> Question {
    question(
        id,
        points,
        QuestionBody::Matching {
            pairs: pairs
                .iter()
                .map(|(left, right)| MatchPair { left: left.to_string(), right: right.to_string() })
                .collect(),
        },
    )
}

/// Single attempt, 30 minute limit, pass mark 60%.
pub(crate) fn exam(id: &str, owner_id: &str, questions: Vec<Question>) -> ExamConfig {
    let questions = questions
        .into_iter()
        .enumerate()
        .map(|(index, mut question)| {
            question.order_index = index as i32;
            question
        })
        .collect();

    ExamConfig {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        title: format!("Exam {id}"),
        max_attempts: 1,
        time_limit_minutes: Some(30),
        passing_percentage: 60.0,
        shuffle_questions: false,
        shuffle_choices: false,
        questions,
    }
}

/// MultipleChoice (10 pts, correct `b`) plus an Essay (10 pts).
pub(crate) fn choice_and_essay_exam(id: &str, owner_id: &str) -> ExamConfig {
    exam(id, owner_id, vec![multiple_choice("mc", 10, "b"), essay("essay", 10)])
}

/// Only auto-scored questions: 10 + 5 + 5 points.
pub(crate) fn objective_exam(id: &str, owner_id: &str) -> ExamConfig {
    exam(
        id,
        owner_id,
        vec![
            multiple_choice("mc", 10, "b"),
            true_false("tf", 5, true),
            short_answer("capital", 5, &["Paris"], false),
        ],
    )
}

/// One question of every type.
pub(crate) fn mixed_exam(id: &str, owner_id: &str) -> ExamConfig {
    exam(
        id,
        owner_id,
        vec![
            multiple_choice("mc", 10, "b"),
            true_false("tf", 5, true),
            short_answer("capital", 5, &["Paris"], false),
            fill_in_blank("organelle", 5, &["mitochondria"], false),
            matching("pairs", 4, &[("H", "Hydrogen"), ("O", "Oxygen")]),
            essay("essay", 10),
        ],
    )
}

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A gradable item. Definitions are copied onto the attempt at start and are
/// read-only from then on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) points: i32,
    #[serde(default)]
    pub(crate) order_index: i32,
    #[serde(default)]
    pub(crate) prompt: String,
    #[serde(flatten)]
    pub(crate) body: QuestionBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum QuestionBody {
    MultipleChoice {
        choices: Vec<Choice>,
    },
    TrueFalse {
        correct_answer: bool,
    },
    ShortAnswer {
        accepted_answers: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
    FillInBlank {
        accepted_answers: Vec<String>,
        #[serde(default)]
        case_sensitive: bool,
    },
    Essay {
        #[serde(default)]
        rubric: String,
        #[serde(default)]
        max_words: Option<u32>,
    },
    Matching {
        pairs: Vec<MatchPair>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Choice {
    pub(crate) id: String,
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub(crate) struct MatchPair {
    pub(crate) left: String,
    pub(crate) right: String,
}

/// What a student submits for one question. Exactly one shape per question
/// type; the pairing is checked by `scoring::validate_answer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum AnswerPayload {
    Choice { selected_choice_id: String },
    Boolean { value: bool },
    Text { text: String },
    Matching { pairs: Vec<MatchPair> },
}

impl AnswerPayload {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Choice { .. } => "choice",
            Self::Boolean { .. } => "boolean",
            Self::Text { .. } => "text",
            Self::Matching { .. } => "matching",
        }
    }
}

impl QuestionBody {
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::MultipleChoice { .. } => "multiple_choice",
            Self::TrueFalse { .. } => "true_false",
            Self::ShortAnswer { .. } => "short_answer",
            Self::FillInBlank { .. } => "fill_in_blank",
            Self::Essay { .. } => "essay",
            Self::Matching { .. } => "matching",
        }
    }

    pub(crate) fn answer_kind(&self) -> &'static str {
        match self {
            Self::MultipleChoice { .. } => "choice",
            Self::TrueFalse { .. } => "boolean",
            Self::ShortAnswer { .. } | Self::FillInBlank { .. } | Self::Essay { .. } => "text",
            Self::Matching { .. } => "matching",
        }
    }
}

impl Question {
    /// Everything except essays is scored without a human.
    pub(crate) fn is_auto_scored(&self) -> bool {
        !matches!(self.body, QuestionBody::Essay { .. })
    }
}

/// Exam settings plus the question list, as supplied by the exam
/// configuration source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExamConfig {
    pub(crate) id: String,
    pub(crate) owner_id: String,
    pub(crate) title: String,
    pub(crate) max_attempts: i32,
    pub(crate) time_limit_minutes: Option<i32>,
    pub(crate) passing_percentage: f64,
    pub(crate) shuffle_questions: bool,
    pub(crate) shuffle_choices: bool,
    pub(crate) questions: Vec<Question>,
}

impl ExamConfig {
    pub(crate) fn max_score(&self) -> f64 {
        max_score(&self.questions)
    }
}

pub(crate) fn max_score(questions: &[Question]) -> f64 {
    questions.iter().map(|question| f64::from(question.points.max(0))).sum()
}

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum QuestionBankError {
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(i32),
    #[error("time_limit_minutes must be positive, got {0}")]
    InvalidTimeLimit(i32),
    #[error("passing_percentage must be within 0..=100, got {0}")]
    InvalidPassingPercentage(f64),
    #[error("question id {0} appears more than once")]
    DuplicateQuestionId(String),
    #[error("question {0} has negative points")]
    NegativePoints(String),
    #[error("question {question_id} must have exactly one correct choice, found {found}")]
    CorrectChoiceCount { question_id: String, found: usize },
    #[error("question {0} repeats a choice id")]
    DuplicateChoiceId(String),
    #[error("question {0} has no accepted answers")]
    NoAcceptedAnswers(String),
    #[error("question {0} has no matching pairs")]
    NoMatchingPairs(String),
    #[error("question {0} repeats a left-hand matching item")]
    DuplicateMatchingLeft(String),
}

pub(crate) fn validate_exam(exam: &ExamConfig) -> Result<(), QuestionBankError> {
    if exam.max_attempts < 1 {
        return Err(QuestionBankError::InvalidMaxAttempts(exam.max_attempts));
    }
    if let Some(minutes) = exam.time_limit_minutes {
        if minutes <= 0 {
            return Err(QuestionBankError::InvalidTimeLimit(minutes));
        }
    }
    if !(0.0..=100.0).contains(&exam.passing_percentage) {
        return Err(QuestionBankError::InvalidPassingPercentage(exam.passing_percentage));
    }

    let mut seen = HashSet::new();
    for question in &exam.questions {
        if !seen.insert(question.id.as_str()) {
            return Err(QuestionBankError::DuplicateQuestionId(question.id.clone()));
        }
        validate_question(question)?;
    }

    Ok(())
}

pub(crate) fn validate_question(question: &Question) -> Result<(), QuestionBankError> {
    if question.points < 0 {
        return Err(QuestionBankError::NegativePoints(question.id.clone()));
    }

    match &question.body {
        QuestionBody::MultipleChoice { choices } => {
            let found = choices.iter().filter(|choice| choice.is_correct).count();
            if found != 1 {
                return Err(QuestionBankError::CorrectChoiceCount {
                    question_id: question.id.clone(),
                    found,
                });
            }
            let mut ids = HashSet::new();
            if !choices.iter().all(|choice| ids.insert(choice.id.as_str())) {
                return Err(QuestionBankError::DuplicateChoiceId(question.id.clone()));
            }
        }
        QuestionBody::ShortAnswer { accepted_answers, .. }
        | QuestionBody::FillInBlank { accepted_answers, .. } => {
            if accepted_answers.iter().all(|answer| answer.trim().is_empty()) {
                return Err(QuestionBankError::NoAcceptedAnswers(question.id.clone()));
            }
        }
        QuestionBody::Matching { pairs } => {
            if pairs.is_empty() {
                return Err(QuestionBankError::NoMatchingPairs(question.id.clone()));
            }
            let mut lefts = HashSet::new();
            if !pairs.iter().all(|pair| lefts.insert(pair.left.as_str())) {
                return Err(QuestionBankError::DuplicateMatchingLeft(question.id.clone()));
            }
        }
        QuestionBody::TrueFalse { .. } | QuestionBody::Essay { .. } => {}
    }

    Ok(())
}

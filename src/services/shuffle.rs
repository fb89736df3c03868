use rand::rngs::StdRng;
use rand::{seq::SliceRandom, SeedableRng};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::services::question_bank::{Question, QuestionBody};

/// A question as the student sees it: ordering applied, answer key withheld.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct QuestionView {
    pub(crate) id: String,
    pub(crate) position: usize,
    pub(crate) points: i32,
    pub(crate) prompt: String,
    #[serde(flatten)]
    pub(crate) body: QuestionViewBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum QuestionViewBody {
    MultipleChoice { choices: Vec<ChoiceView> },
    TrueFalse,
    ShortAnswer,
    FillInBlank,
    Essay { max_words: Option<u32> },
    Matching { left_items: Vec<String>, right_options: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ChoiceView {
    pub(crate) id: String,
    pub(crate) text: String,
}

pub(crate) fn new_seed() -> i64 {
    rand::random::<i64>()
}

/// Lays out an attempt's questions. The same seed always yields the same
/// order, so a reload never reshuffles what the student already saw.
pub(crate) fn arrange(
    questions: &[Question],
    seed: i64,
    shuffle_questions: bool,
    shuffle_choices: bool,
) -> Vec<QuestionView> {
    let mut ordered: Vec<&Question> = questions.iter().collect();
    ordered.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.id.cmp(&b.id)));

    if shuffle_questions {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        ordered.shuffle(&mut rng);
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, question)| QuestionView {
            id: question.id.clone(),
            position,
            points: question.points,
            prompt: question.prompt.clone(),
            body: view_body(question, seed, shuffle_choices),
        })
        .collect()
}

fn view_body(question: &Question, seed: i64, shuffle_choices: bool) -> QuestionViewBody {
    match &question.body {
        QuestionBody::MultipleChoice { choices } => {
            let mut choices: Vec<ChoiceView> = choices
                .iter()
                .map(|choice| ChoiceView { id: choice.id.clone(), text: choice.text.clone() })
                .collect();
            if shuffle_choices {
                choices.shuffle(&mut question_rng(seed, &question.id, "choices"));
            }
            QuestionViewBody::MultipleChoice { choices }
        }
        QuestionBody::TrueFalse { .. } => QuestionViewBody::TrueFalse,
        QuestionBody::ShortAnswer { .. } => QuestionViewBody::ShortAnswer,
        QuestionBody::FillInBlank { .. } => QuestionViewBody::FillInBlank,
        QuestionBody::Essay { max_words, .. } => QuestionViewBody::Essay { max_words: *max_words },
        QuestionBody::Matching { pairs } => {
            let mut left_items: Vec<String> = pairs.iter().map(|pair| pair.left.clone()).collect();
            let mut right_options: Vec<String> =
                pairs.iter().map(|pair| pair.right.clone()).collect();
            if shuffle_choices {
                left_items.shuffle(&mut question_rng(seed, &question.id, "left"));
            }
            // Listed in definition order the right column would give the key away.
            right_options.shuffle(&mut question_rng(seed, &question.id, "right"));
            QuestionViewBody::Matching { left_items, right_options }
        }
    }
}

fn question_rng(seed: i64, question_id: &str, purpose: &str) -> StdRng {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(question_id.as_bytes());
    hasher.update(purpose.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    StdRng::seed_from_u64(u64::from_le_bytes(bytes))
}

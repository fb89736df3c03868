use std::collections::{HashMap, HashSet};

use crate::services::question_bank::{AnswerPayload, MatchPair, Question, QuestionBody};

/// Result of scoring one answer. `is_correct` is `None` only for questions a
/// human has to grade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Score {
    pub(crate) points_earned: f64,
    pub(crate) is_correct: Option<bool>,
}

impl Score {
    fn full(points: i32) -> Self {
        Self { points_earned: f64::from(points), is_correct: Some(true) }
    }

    fn wrong() -> Self {
        Self { points_earned: 0.0, is_correct: Some(false) }
    }

    fn ungraded() -> Self {
        Self { points_earned: 0.0, is_correct: None }
    }
}

/// Pure scoring rule for every question type. An absent answer, or one whose
/// shape does not fit the question, earns nothing.
pub(crate) fn score(question: &Question, answer: Option<&AnswerPayload>) -> Score {
    match (&question.body, answer) {
        (QuestionBody::Essay { .. }, _) => Score::ungraded(),
        (_, None) => Score::wrong(),
        (
            QuestionBody::MultipleChoice { choices },
            Some(AnswerPayload::Choice { selected_choice_id }),
        ) => {
            let correct = choices
                .iter()
                .find(|choice| choice.is_correct)
                .is_some_and(|choice| &choice.id == selected_choice_id);
            if correct {
                Score::full(question.points)
            } else {
                Score::wrong()
            }
        }
        (QuestionBody::TrueFalse { correct_answer }, Some(AnswerPayload::Boolean { value })) => {
            if value == correct_answer {
                Score::full(question.points)
            } else {
                Score::wrong()
            }
        }
        (
            QuestionBody::ShortAnswer { accepted_answers, case_sensitive }
            | QuestionBody::FillInBlank { accepted_answers, case_sensitive },
            Some(AnswerPayload::Text { text }),
        ) => {
            let submitted = normalize_text(text, *case_sensitive);
            let matched = accepted_answers
                .iter()
                .any(|accepted| normalize_text(accepted, *case_sensitive) == submitted);
            if matched {
                Score::full(question.points)
            } else {
                Score::wrong()
            }
        }
        (QuestionBody::Matching { pairs }, Some(AnswerPayload::Matching { pairs: submitted })) => {
            score_matching(question.points, pairs, submitted)
        }
        _ => Score::wrong(),
    }
}

/// Trims, collapses inner whitespace runs to one space, and lower-cases unless
/// the comparison is case sensitive.
pub(crate) fn normalize_text(value: &str, case_sensitive: bool) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if case_sensitive {
        collapsed
    } else {
        collapsed.to_lowercase()
    }
}

fn score_matching(points: i32, expected: &[MatchPair], submitted: &[MatchPair]) -> Score {
    if expected.is_empty() {
        return Score::wrong();
    }

    let chosen: HashMap<&str, &str> =
        submitted.iter().map(|pair| (pair.left.as_str(), pair.right.as_str())).collect();
    let correct_pairs = expected
        .iter()
        .filter(|pair| chosen.get(pair.left.as_str()) == Some(&pair.right.as_str()))
        .count() as i64;
    let total_pairs = expected.len() as i64;

    let earned = round_half_up_ratio(i64::from(points.max(0)), correct_pairs, total_pairs);
    Score { points_earned: earned as f64, is_correct: Some(earned == i64::from(points)) }
}

/// `points * correct / total` rounded to the nearest integer, halves up.
fn round_half_up_ratio(points: i64, correct: i64, total: i64) -> i64 {
    (2 * points * correct + total) / (2 * total)
}

/// Checks that a payload fits the question before it is stored.
pub(crate) fn validate_answer(question: &Question, payload: &AnswerPayload) -> Result<(), String> {
    if question.body.answer_kind() != payload.kind() {
        return Err(format!(
            "question {} of type {} expects a {} answer, got {}",
            question.id,
            question.body.type_name(),
            question.body.answer_kind(),
            payload.kind()
        ));
    }

    match (&question.body, payload) {
        (QuestionBody::Essay { max_words: Some(max_words), .. }, AnswerPayload::Text { text }) => {
            let words = text.split_whitespace().count();
            if words > *max_words as usize {
                return Err(format!(
                    "essay answer has {words} words, limit is {max_words}"
                ));
            }
        }
        (QuestionBody::Matching { pairs }, AnswerPayload::Matching { pairs: submitted }) => {
            let known: HashSet<&str> = pairs.iter().map(|pair| pair.left.as_str()).collect();
            let mut seen = HashSet::new();
            for pair in submitted {
                if !seen.insert(pair.left.as_str()) {
                    return Err(format!("matching item {} is answered twice", pair.left));
                }
                if !known.contains(pair.left.as_str()) {
                    return Err(format!("matching item {} is not part of the question", pair.left));
                }
            }
        }
        _ => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixtures;

    fn text(value: &str) -> AnswerPayload {
        AnswerPayload::Text { text: value.to_string() }
    }

    fn pairs(values: &[(&str, &str)]) -> AnswerPayload {
        AnswerPayload::Matching {
            pairs: values
                .iter()
                .map(|(left, right)| MatchPair { left: left.to_string(), right: right.to_string() })
                .collect(),
        }
    }

    #[test]
    fn correct_answer_for_every_type_earns_full_points() {
        let cases = vec![
            (
                fixtures::multiple_choice("mc", 10, "b"),
                AnswerPayload::Choice { selected_choice_id: "b".to_string() },
            ),
            (fixtures::true_false("tf", 5, false), AnswerPayload::Boolean { value: false }),
            (fixtures::short_answer("sa", 3, &["Paris"], false), text("Paris")),
            (fixtures::fill_in_blank("fb", 2, &["mitochondria"], false), text("mitochondria")),
            (
                fixtures::matching("m", 4, &[("a", "1"), ("b", "2")]),
                pairs(&[("a", "1"), ("b", "2")]),
            ),
        ];

        for (question, answer) in cases {
            let result = score(&question, Some(&answer));
            assert_eq!(result.is_correct, Some(true), "{}", question.id);
            assert_eq!(result.points_earned, f64::from(question.points), "{}", question.id);
        }
    }

    #[test]
    fn absent_answer_earns_nothing() {
        let questions = vec![
            fixtures::multiple_choice("mc", 10, "b"),
            fixtures::true_false("tf", 5, true),
            fixtures::short_answer("sa", 3, &["Paris"], false),
            fixtures::matching("m", 4, &[("a", "1")]),
            fixtures::essay("e", 10),
        ];

        for question in questions {
            let result = score(&question, None);
            assert_eq!(result.points_earned, 0.0, "{}", question.id);
            if question.is_auto_scored() {
                assert_eq!(result.is_correct, Some(false), "{}", question.id);
            } else {
                assert_eq!(result.is_correct, None);
            }
        }
    }

    #[test]
    fn unknown_choice_is_incorrect() {
        let question = fixtures::multiple_choice("mc", 10, "b");
        let result =
            score(&question, Some(&AnswerPayload::Choice { selected_choice_id: "zz".to_string() }));
        assert_eq!(result, Score { points_earned: 0.0, is_correct: Some(false) });
    }

    #[test]
    fn short_answer_is_case_insensitive_by_default() {
        let lenient = fixtures::short_answer("sa", 3, &["Paris"], false);
        assert_eq!(score(&lenient, Some(&text("paris"))).is_correct, Some(true));

        let strict = fixtures::short_answer("sa", 3, &["Paris"], true);
        assert_eq!(score(&strict, Some(&text("paris"))).is_correct, Some(false));
        assert_eq!(score(&strict, Some(&text("Paris"))).is_correct, Some(true));
    }

    #[test]
    fn text_normalisation_trims_and_collapses_whitespace() {
        assert_eq!(normalize_text("  New \t  York\n", false), "new york");
        assert_eq!(normalize_text("  New   York ", true), "New York");

        let question = fixtures::short_answer("sa", 3, &["New York"], false);
        assert_eq!(score(&question, Some(&text("  new   york "))).is_correct, Some(true));
    }

    #[test]
    fn essay_is_never_auto_scored() {
        let question = fixtures::essay("e", 10);
        let result = score(&question, Some(&text("a thoughtful answer")));
        assert_eq!(result, Score { points_earned: 0.0, is_correct: None });
    }

    #[test]
    fn matching_awards_partial_credit_rounded_half_up() {
        let question = fixtures::matching("m", 3, &[("a", "1"), ("b", "2")]);

        // 3 * 1/2 = 1.5 rounds up to 2
        let half = score(&question, Some(&pairs(&[("a", "1"), ("b", "1")])));
        assert_eq!(half, Score { points_earned: 2.0, is_correct: Some(false) });

        let question = fixtures::matching("m", 10, &[("a", "1"), ("b", "2"), ("c", "3")]);
        // 10 * 1/3 = 3.33 rounds down to 3
        let third = score(&question, Some(&pairs(&[("a", "1")])));
        assert_eq!(third.points_earned, 3.0);
        // 10 * 2/3 = 6.67 rounds up to 7
        let two_thirds = score(&question, Some(&pairs(&[("a", "1"), ("b", "2"), ("c", "2")])));
        assert_eq!(two_thirds.points_earned, 7.0);
    }

    #[test]
    fn mismatched_payload_shape_is_incorrect_and_rejected() {
        let question = fixtures::true_false("tf", 5, true);
        assert_eq!(score(&question, Some(&text("true"))).is_correct, Some(false));

        let err = validate_answer(&question, &text("true")).expect_err("shape mismatch");
        assert!(err.contains("expects a boolean answer"));
    }

    #[test]
    fn validate_answer_enforces_essay_word_limit() {
        let mut question = fixtures::essay("e", 10);
        if let QuestionBody::Essay { max_words, .. } = &mut question.body {
            *max_words = Some(3);
        }

        assert!(validate_answer(&question, &text("one two three")).is_ok());
        assert!(validate_answer(&question, &text("one two three four")).is_err());
    }

    #[test]
    fn validate_answer_rejects_repeated_or_unknown_matching_items() {
        let question = fixtures::matching("m", 4, &[("a", "1"), ("b", "2")]);

        assert!(validate_answer(&question, &pairs(&[("a", "1"), ("a", "2")])).is_err());
        assert!(validate_answer(&question, &pairs(&[("z", "1")])).is_err());
        assert!(validate_answer(&question, &pairs(&[("b", "2")])).is_ok());
    }
}

use serde_json::Value;
use sqlx::PgPool;

use crate::db::models::{ExamQuestionRow, ExamRow};
use crate::services::question_bank::Question;

pub(crate) const COLUMNS: &str = "\
    id, owner_id, title, max_attempts, time_limit_minutes, passing_percentage, \
    shuffle_questions, shuffle_choices";

pub(crate) const QUESTION_COLUMNS: &str = "id, order_index, points, definition";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ExamRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamRow>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn list_questions(
    pool: &PgPool,
    exam_id: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ExamQuestionRow>(&format!(
        "SELECT {QUESTION_COLUMNS} FROM exam_questions WHERE exam_id = $1 ORDER BY order_index, id"
    ))
    .bind(exam_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| question_from_row(row).map_err(|err| sqlx::Error::Decode(Box::new(err))))
        .collect()
}

/// Builds the question from its row. The columns win over whatever the
/// definition JSON carries for the same keys.
pub(crate) fn question_from_row(row: ExamQuestionRow) -> Result<Question, serde_json::Error> {
    let mut definition = match row.definition.0 {
        Value::Object(map) => map,
        other => return serde_json::from_value(other),
    };

    definition.insert("id".to_string(), Value::from(row.id));
    definition.insert("order_index".to_string(), Value::from(row.order_index));
    definition.insert("points".to_string(), Value::from(row.points));

    serde_json::from_value(Value::Object(definition))
}

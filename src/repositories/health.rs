use sqlx::PgPool;

/// Round-trips to Postgres and reports whether the attempt tables exist.
pub(crate) async fn schema_ready(pool: &PgPool) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        "SELECT to_regclass('public.attempts') IS NOT NULL
            AND to_regclass('public.attempt_answers') IS NOT NULL",
    )
    .fetch_one(pool)
    .await
}

/// Takes a transaction-scoped advisory lock keyed by `key`; released on commit or rollback.
pub(crate) async fn advisory_xact_lock(
    executor: impl sqlx::PgExecutor<'_>,
    key: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(key)
        .execute(executor)
        .await?;
    Ok(())
}

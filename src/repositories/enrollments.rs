use rust_decimal::Decimal;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Enrollment;
use crate::db::types::{AccessStatus, EnrollmentStatus, PaymentStatus};

pub(crate) const COLUMNS: &str = "\
    id, learner_id, course_id, learner_email, status, payment_status, access_status, \
    total_amount, amount_paid, amount_due, upfront_amount, remaining_amount, \
    parent_enrollment_id, is_component_of_bundle, is_split_payment, is_admin_enrollment, \
    progress, certificate_generated, certificate_generated_at, enrolled_at, last_accessed_at, \
    completed_at, version, created_at, updated_at";

pub(crate) fn enrollment_id(learner_id: &str, course_id: &str) -> String {
    format!("{learner_id}_{course_id}")
}

pub(crate) struct CreateEnrollment<'a> {
    pub(crate) learner_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) learner_email: Option<&'a str>,
    pub(crate) status: EnrollmentStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    pub(crate) total_amount: Decimal,
    pub(crate) amount_paid: Decimal,
    pub(crate) amount_due: Decimal,
    pub(crate) upfront_amount: Decimal,
    pub(crate) remaining_amount: Decimal,
    pub(crate) parent_enrollment_id: Option<&'a str>,
    pub(crate) is_component_of_bundle: bool,
    pub(crate) is_split_payment: bool,
    pub(crate) is_admin_enrollment: bool,
    pub(crate) now: PrimitiveDateTime,
}

/// Post-increment balance returned by [`increment_balance`].
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub(crate) struct BalanceRow {
    pub(crate) amount_paid: Decimal,
    pub(crate) amount_due: Decimal,
    pub(crate) version: i64,
}

/// Inserts the row unless `(learner_id, course_id)` already exists. Returns whether it inserted.
pub(crate) async fn insert_if_absent(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateEnrollment<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO enrollments (
            id, learner_id, course_id, learner_email, status, payment_status, access_status,
            total_amount, amount_paid, amount_due, upfront_amount, remaining_amount,
            parent_enrollment_id, is_component_of_bundle, is_split_payment, is_admin_enrollment,
            progress, certificate_generated, enrolled_at, completed_at, version,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,0,FALSE,$17,NULL,1,$17,$17)
        ON CONFLICT (learner_id, course_id) DO NOTHING",
    )
    .bind(enrollment_id(params.learner_id, params.course_id))
    .bind(params.learner_id)
    .bind(params.course_id)
    .bind(params.learner_email)
    .bind(params.status)
    .bind(params.payment_status)
    .bind(params.access_status)
    .bind(params.total_amount)
    .bind(params.amount_paid)
    .bind(params.amount_due)
    .bind(params.upfront_amount)
    .bind(params.remaining_amount)
    .bind(params.parent_enrollment_id)
    .bind(params.is_component_of_bundle)
    .bind(params.is_split_payment)
    .bind(params.is_admin_enrollment)
    .bind(params.now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn find(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {COLUMNS} FROM enrollments WHERE learner_id = $1 AND course_id = $2"
    ))
    .bind(learner_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!("SELECT {COLUMNS} FROM enrollments WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Row-locks the enrollment until the surrounding transaction ends.
pub(crate) async fn lock(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    course_id: &str,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {COLUMNS} FROM enrollments WHERE learner_id = $1 AND course_id = $2 FOR UPDATE"
    ))
    .bind(learner_id)
    .bind(course_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_for_learner(
    pool: &PgPool,
    learner_id: &str,
) -> Result<Vec<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {COLUMNS} FROM enrollments WHERE learner_id = $1 ORDER BY created_at DESC, id"
    ))
    .bind(learner_id)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_components(
    executor: impl sqlx::PgExecutor<'_>,
    parent_enrollment_id: &str,
) -> Result<Vec<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "SELECT {COLUMNS} FROM enrollments WHERE parent_enrollment_id = $1 ORDER BY course_id"
    ))
    .bind(parent_enrollment_id)
    .fetch_all(executor)
    .await
}

/// Adds at most the outstanding balance to `amount_paid`; `amount_due` never goes below zero.
pub(crate) async fn increment_balance(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    amount: Decimal,
    now: PrimitiveDateTime,
) -> Result<Option<BalanceRow>, sqlx::Error> {
    sqlx::query_as::<_, BalanceRow>(
        "UPDATE enrollments
         SET amount_paid = amount_paid + LEAST($2, amount_due),
             amount_due = GREATEST(amount_due - $2, 0),
             version = version + 1,
             updated_at = $3
         WHERE id = $1
         RETURNING amount_paid, amount_due, version",
    )
    .bind(id)
    .bind(amount)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub(crate) struct StatusUpdate {
    pub(crate) status: EnrollmentStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

/// Writes derived statuses only if the row still carries `expected_version`.
pub(crate) async fn write_statuses(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    expected_version: i64,
    update: &StatusUpdate,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE enrollments
         SET status = $3,
             payment_status = $4,
             access_status = $5,
             completed_at = COALESCE($6, completed_at),
             version = version + 1,
             updated_at = $7
         WHERE id = $1 AND version = $2",
    )
    .bind(id)
    .bind(expected_version)
    .bind(update.status)
    .bind(update.payment_status)
    .bind(update.access_status)
    .bind(update.completed_at)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Grants a bundle component the access paid for through its bundle.
pub(crate) async fn unlock_component(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE enrollments
         SET status = $2,
             payment_status = $3,
             access_status = $4,
             version = version + 1,
             updated_at = $5
         WHERE id = $1
           AND is_component_of_bundle
           AND status = $6",
    )
    .bind(id)
    .bind(EnrollmentStatus::Active)
    .bind(PaymentStatus::Completed)
    .bind(AccessStatus::Unlocked)
    .bind(now)
    .bind(EnrollmentStatus::PendingPayment)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Re-locks a bundle component; only rows that hang off a bundle are touched.
pub(crate) async fn relock_component(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE enrollments
         SET status = $2,
             payment_status = $3,
             access_status = $4,
             amount_paid = 0,
             amount_due = total_amount,
             completed_at = NULL,
             version = version + 1,
             updated_at = $5
         WHERE id = $1
           AND is_component_of_bundle",
    )
    .bind(id)
    .bind(EnrollmentStatus::PendingPayment)
    .bind(PaymentStatus::Pending)
    .bind(AccessStatus::Locked)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub(crate) async fn reset_to_pending(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    course_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Enrollment>, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "UPDATE enrollments
         SET status = $3,
             payment_status = $4,
             access_status = $5,
             amount_paid = 0,
             amount_due = total_amount,
             completed_at = NULL,
             version = version + 1,
             updated_at = $6
         WHERE learner_id = $1 AND course_id = $2
         RETURNING {COLUMNS}"
    ))
    .bind(learner_id)
    .bind(course_id)
    .bind(EnrollmentStatus::PendingPayment)
    .bind(PaymentStatus::Pending)
    .bind(AccessStatus::Locked)
    .bind(now)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn update_status(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    status: EnrollmentStatus,
    now: PrimitiveDateTime,
) -> Result<Enrollment, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "UPDATE enrollments
         SET status = $2,
             completed_at = CASE WHEN $2 = 'completed'::enrollmentstatus THEN $3 ELSE completed_at END,
             version = version + 1,
             updated_at = $3
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(status)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn record_certificate(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    access_status: AccessStatus,
    now: PrimitiveDateTime,
) -> Result<Enrollment, sqlx::Error> {
    sqlx::query_as::<_, Enrollment>(&format!(
        "UPDATE enrollments
         SET certificate_generated = TRUE,
             certificate_generated_at = COALESCE(certificate_generated_at, $3),
             access_status = $2,
             version = version + 1,
             updated_at = $3
         WHERE id = $1
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(access_status)
    .bind(now)
    .fetch_one(executor)
    .await
}

/// Mirrors the course-progress percentage onto the enrollment, if one exists.
pub(crate) async fn mirror_progress(
    executor: impl sqlx::PgExecutor<'_>,
    learner_id: &str,
    course_id: &str,
    progress: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE enrollments
         SET progress = $3,
             last_accessed_at = $4,
             version = version + 1,
             updated_at = $4
         WHERE learner_id = $1 AND course_id = $2",
    )
    .bind(learner_id)
    .bind(course_id)
    .bind(progress.clamp(0, 100))
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[cfg(test)]
mod tests {
    use super::enrollment_id;

    #[test]
    fn enrollment_id_joins_learner_and_course() {
        assert_eq!(enrollment_id("u-42", "online-course"), "u-42_online-course");
    }
}

use rust_decimal::Decimal;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::PaymentApplication;
use crate::db::types::{AccessStatus, EnrollmentStatus, PaymentStatus};

pub(crate) const COLUMNS: &str = "\
    id, enrollment_id, learner_id, course_id, requested_amount, applied_amount, surplus, \
    amount_paid_after, amount_due_after, payment_status, access_status, enrollment_status, \
    idempotency_key, created_at";

pub(crate) struct CreatePaymentApplication<'a> {
    pub(crate) id: &'a str,
    pub(crate) enrollment_id: &'a str,
    pub(crate) learner_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) requested_amount: Decimal,
    pub(crate) applied_amount: Decimal,
    pub(crate) surplus: Decimal,
    pub(crate) amount_paid_after: Decimal,
    pub(crate) amount_due_after: Decimal,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    pub(crate) enrollment_status: EnrollmentStatus,
    pub(crate) idempotency_key: Option<&'a str>,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreatePaymentApplication<'_>,
) -> Result<PaymentApplication, sqlx::Error> {
    sqlx::query_as::<_, PaymentApplication>(&format!(
        "INSERT INTO payment_applications (
            id, enrollment_id, learner_id, course_id, requested_amount, applied_amount, surplus,
            amount_paid_after, amount_due_after, payment_status, access_status,
            enrollment_status, idempotency_key, created_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.enrollment_id)
    .bind(params.learner_id)
    .bind(params.course_id)
    .bind(params.requested_amount)
    .bind(params.applied_amount)
    .bind(params.surplus)
    .bind(params.amount_paid_after)
    .bind(params.amount_due_after)
    .bind(params.payment_status)
    .bind(params.access_status)
    .bind(params.enrollment_status)
    .bind(params.idempotency_key)
    .bind(params.created_at)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_idempotency_key(
    executor: impl sqlx::PgExecutor<'_>,
    enrollment_id: &str,
    idempotency_key: &str,
) -> Result<Option<PaymentApplication>, sqlx::Error> {
    sqlx::query_as::<_, PaymentApplication>(&format!(
        "SELECT {COLUMNS} FROM payment_applications \
         WHERE enrollment_id = $1 AND idempotency_key = $2"
    ))
    .bind(enrollment_id)
    .bind(idempotency_key)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn list_for_enrollment(
    pool: &PgPool,
    enrollment_id: &str,
) -> Result<Vec<PaymentApplication>, sqlx::Error> {
    sqlx::query_as::<_, PaymentApplication>(&format!(
        "SELECT {COLUMNS} FROM payment_applications \
         WHERE enrollment_id = $1 ORDER BY created_at DESC, id"
    ))
    .bind(enrollment_id)
    .fetch_all(pool)
    .await
}

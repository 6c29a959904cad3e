use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::PaymentApplication;
use crate::db::types::{AccessStatus, EnrollmentStatus, PaymentStatus};
use crate::schemas::enrollment::EnrollmentResponse;
use crate::services::payment_engine::PaymentOutcome;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct PaymentCreate {
    pub(crate) amount: Decimal,
    #[serde(default)]
    #[serde(alias = "idempotencyKey")]
    #[validate(length(min = 1, max = 128, message = "idempotency_key must be 1-128 characters"))]
    pub(crate) idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct PaymentResponse {
    pub(crate) application_id: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) applied: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) surplus: Decimal,
    pub(crate) replayed: bool,
    pub(crate) unlocked_components: Vec<String>,
    pub(crate) enrollment: EnrollmentResponse,
}

impl PaymentResponse {
    pub(crate) fn from_outcome(outcome: PaymentOutcome) -> Self {
        Self {
            application_id: outcome.application_id,
            applied: outcome.applied,
            surplus: outcome.surplus,
            replayed: outcome.replayed,
            unlocked_components: outcome.unlocked_components,
            enrollment: EnrollmentResponse::from_db(outcome.enrollment),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PaymentApplicationResponse {
    pub(crate) id: String,
    pub(crate) enrollment_id: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) requested_amount: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) applied_amount: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) surplus: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) amount_paid_after: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) amount_due_after: Decimal,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    pub(crate) enrollment_status: EnrollmentStatus,
    pub(crate) idempotency_key: Option<String>,
    pub(crate) created_at: String,
}

impl PaymentApplicationResponse {
    pub(crate) fn from_db(row: PaymentApplication) -> Self {
        Self {
            id: row.id,
            enrollment_id: row.enrollment_id,
            requested_amount: row.requested_amount,
            applied_amount: row.applied_amount,
            surplus: row.surplus,
            amount_paid_after: row.amount_paid_after,
            amount_due_after: row.amount_due_after,
            payment_status: row.payment_status,
            access_status: row.access_status,
            enrollment_status: row.enrollment_status,
            idempotency_key: row.idempotency_key,
            created_at: format_primitive(row.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn amount_accepts_numbers_and_strings() {
        let from_number: PaymentCreate =
            serde_json::from_value(json!({ "amount": 99.99 })).expect("number");
        assert_eq!(from_number.amount, dec!(99.99));

        let from_string: PaymentCreate =
            serde_json::from_value(json!({ "amount": "450.00", "idempotencyKey": "pay-1" }))
                .expect("string");
        assert_eq!(from_string.amount, dec!(450.00));
        assert_eq!(from_string.idempotency_key.as_deref(), Some("pay-1"));
    }
}

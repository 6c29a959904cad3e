use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::Enrollment;
use crate::db::types::{AccessStatus, EnrollmentStatus, PaymentStatus};
use crate::services::access_gate::{AccessDecision, DenialReason};
use crate::services::enrollment_ledger::{next_installment_due, BundleEnrollment};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct EnrollmentCreate {
    #[serde(alias = "learnerId")]
    #[validate(length(min = 1, max = 128, message = "learner_id must be 1-128 characters"))]
    pub(crate) learner_id: String,
    #[serde(alias = "courseId")]
    #[validate(length(min = 1, max = 128, message = "course_id must be 1-128 characters"))]
    pub(crate) course_id: String,
    #[serde(default)]
    #[serde(alias = "learnerEmail")]
    #[validate(email(message = "learner_email must be a valid email address"))]
    pub(crate) learner_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BundleEnrollmentCreate {
    #[serde(alias = "learnerId")]
    #[validate(length(min = 1, max = 128, message = "learner_id must be 1-128 characters"))]
    pub(crate) learner_id: String,
    #[serde(alias = "bundleCourseId", alias = "course_id", alias = "courseId")]
    #[validate(length(min = 1, max = 128, message = "bundle_course_id must be 1-128 characters"))]
    pub(crate) bundle_course_id: String,
    #[serde(default)]
    #[serde(alias = "learnerEmail")]
    #[validate(email(message = "learner_email must be a valid email address"))]
    pub(crate) learner_email: Option<String>,
    #[serde(default)]
    #[serde(alias = "splitPayment", alias = "isSplitPayment")]
    pub(crate) split_payment: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusChangeRequest {
    pub(crate) status: EnrollmentStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct AutoEnrollRequest {
    #[serde(alias = "learnerId")]
    #[validate(length(min = 1, max = 128, message = "learner_id must be 1-128 characters"))]
    pub(crate) learner_id: String,
    #[validate(email(message = "email must be a valid email address"))]
    pub(crate) email: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct EnrollmentResponse {
    pub(crate) id: String,
    pub(crate) learner_id: String,
    pub(crate) course_id: String,
    pub(crate) status: EnrollmentStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) total_amount: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) amount_paid: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) amount_due: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) upfront_amount: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) remaining_amount: Decimal,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub(crate) next_installment_due: Decimal,
    pub(crate) parent_enrollment_id: Option<String>,
    pub(crate) is_component_of_bundle: bool,
    pub(crate) is_split_payment: bool,
    pub(crate) is_admin_enrollment: bool,
    pub(crate) progress: i32,
    pub(crate) certificate_generated: bool,
    pub(crate) certificate_generated_at: Option<String>,
    pub(crate) enrolled_at: String,
    pub(crate) last_accessed_at: Option<String>,
    pub(crate) completed_at: Option<String>,
    pub(crate) updated_at: String,
}

impl EnrollmentResponse {
    pub(crate) fn from_db(enrollment: Enrollment) -> Self {
        let next_installment_due = next_installment_due(&enrollment);
        Self {
            id: enrollment.id,
            learner_id: enrollment.learner_id,
            course_id: enrollment.course_id,
            status: enrollment.status,
            payment_status: enrollment.payment_status,
            access_status: enrollment.access_status,
            total_amount: enrollment.total_amount,
            amount_paid: enrollment.amount_paid,
            amount_due: enrollment.amount_due,
            upfront_amount: enrollment.upfront_amount,
            remaining_amount: enrollment.remaining_amount,
            next_installment_due,
            parent_enrollment_id: enrollment.parent_enrollment_id,
            is_component_of_bundle: enrollment.is_component_of_bundle,
            is_split_payment: enrollment.is_split_payment,
            is_admin_enrollment: enrollment.is_admin_enrollment,
            progress: enrollment.progress,
            certificate_generated: enrollment.certificate_generated,
            certificate_generated_at: format_optional(enrollment.certificate_generated_at),
            enrolled_at: format_primitive(enrollment.enrolled_at),
            last_accessed_at: format_optional(enrollment.last_accessed_at),
            completed_at: format_optional(enrollment.completed_at),
            updated_at: format_primitive(enrollment.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BundleEnrollmentResponse {
    pub(crate) bundle: EnrollmentResponse,
    pub(crate) components: Vec<EnrollmentResponse>,
}

impl BundleEnrollmentResponse {
    pub(crate) fn from_service(created: BundleEnrollment) -> Self {
        Self {
            bundle: EnrollmentResponse::from_db(created.bundle),
            components: created.components.into_iter().map(EnrollmentResponse::from_db).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct AccessResponse {
    pub(crate) has_access: bool,
    pub(crate) access_status: Option<AccessStatus>,
    pub(crate) enrollment_status: Option<EnrollmentStatus>,
    pub(crate) payment_status: Option<PaymentStatus>,
    pub(crate) reason: Option<DenialReason>,
    pub(crate) message: Option<&'static str>,
    #[serde(serialize_with = "rust_decimal::serde::float_option::serialize")]
    pub(crate) amount_due: Option<Decimal>,
}

impl From<AccessDecision> for AccessResponse {
    fn from(decision: AccessDecision) -> Self {
        Self {
            message: decision.message(),
            has_access: decision.has_access,
            access_status: decision.access_status,
            enrollment_status: decision.enrollment_status,
            payment_status: decision.payment_status,
            reason: decision.reason,
            amount_due: decision.amount_due,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;
    use time::macros::datetime;
    use validator::Validate;

    use super::*;

    #[test]
    fn enrollment_create_accepts_camel_case_aliases() {
        let payload: EnrollmentCreate = serde_json::from_value(json!({
            "learnerId": "u1",
            "courseId": "online-course",
            "learnerEmail": "u1@example.com"
        }))
        .expect("payload");
        assert!(payload.validate().is_ok());
        assert_eq!(payload.course_id, "online-course");
    }

    #[test]
    fn enrollment_create_rejects_bad_email() {
        let payload: EnrollmentCreate = serde_json::from_value(json!({
            "learner_id": "u1",
            "course_id": "online-course",
            "learner_email": "not-an-email"
        }))
        .expect("payload");
        assert!(payload.validate().is_err());
    }

    #[test]
    fn response_renders_amounts_as_numbers() {
        let now = datetime!(2025-01-01 12:00:00);
        let enrollment = Enrollment {
            id: "u1_complete-package".to_string(),
            learner_id: "u1".to_string(),
            course_id: "complete-package".to_string(),
            learner_email: None,
            status: EnrollmentStatus::PendingPayment,
            payment_status: PaymentStatus::Partial,
            access_status: AccessStatus::Locked,
            total_amount: dec!(549.99),
            amount_paid: dec!(99.99),
            amount_due: dec!(450.00),
            upfront_amount: dec!(99.99),
            remaining_amount: dec!(450.00),
            parent_enrollment_id: None,
            is_component_of_bundle: false,
            is_split_payment: false,
            is_admin_enrollment: false,
            progress: 0,
            certificate_generated: false,
            certificate_generated_at: None,
            enrolled_at: now,
            last_accessed_at: None,
            completed_at: None,
            version: 2,
            created_at: now,
            updated_at: now,
        };

        let value = serde_json::to_value(EnrollmentResponse::from_db(enrollment)).expect("json");
        assert_eq!(value["amount_due"], json!(450.0));
        assert_eq!(value["amount_paid"], json!(99.99));
        assert_eq!(value["status"], json!("PENDING_PAYMENT"));
        assert_eq!(value["access_status"], json!("LOCKED"));
        assert_eq!(value["enrolled_at"], json!("2025-01-01T12:00:00Z"));
    }
}

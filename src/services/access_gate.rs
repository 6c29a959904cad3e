use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;

use crate::db::models::Enrollment;
use crate::db::types::{AccessStatus, EnrollmentStatus, PaymentStatus};
use crate::repositories::enrollments;
use crate::services::errors::{require_id, LedgerResult};

pub(crate) const NO_ENROLLMENT_MESSAGE: &str = "No enrollment found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DenialReason {
    NotEnrolled,
    PaymentRequired,
    CertificatePending,
    EnrollmentInactive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct AccessDecision {
    pub(crate) has_access: bool,
    pub(crate) access_status: Option<AccessStatus>,
    pub(crate) enrollment_status: Option<EnrollmentStatus>,
    pub(crate) payment_status: Option<PaymentStatus>,
    pub(crate) reason: Option<DenialReason>,
    pub(crate) amount_due: Option<Decimal>,
}

impl AccessDecision {
    pub(crate) fn message(&self) -> Option<&'static str> {
        match self.reason? {
            DenialReason::NotEnrolled => Some(NO_ENROLLMENT_MESSAGE),
            DenialReason::PaymentRequired => Some("Payment required"),
            DenialReason::CertificatePending => Some("Certificate pending"),
            DenialReason::EnrollmentInactive => Some("Enrollment is not active"),
        }
    }
}

/// Total over every ledger state: access iff unlocked and active.
pub(crate) fn evaluate(enrollment: Option<&Enrollment>) -> AccessDecision {
    let Some(enrollment) = enrollment else {
        return AccessDecision {
            has_access: false,
            access_status: None,
            enrollment_status: None,
            payment_status: None,
            reason: Some(DenialReason::NotEnrolled),
            amount_due: None,
        };
    };

    let reason = match (enrollment.access_status, enrollment.status) {
        (AccessStatus::Unlocked, EnrollmentStatus::Active) => None,
        (_, EnrollmentStatus::Suspended | EnrollmentStatus::Cancelled) => {
            Some(DenialReason::EnrollmentInactive)
        }
        (AccessStatus::Locked, _) => Some(DenialReason::PaymentRequired),
        (AccessStatus::PendingCertificate, _) => Some(DenialReason::CertificatePending),
        (AccessStatus::Unlocked, _) => Some(DenialReason::EnrollmentInactive),
    };

    AccessDecision {
        has_access: reason.is_none(),
        access_status: Some(enrollment.access_status),
        enrollment_status: Some(enrollment.status),
        payment_status: Some(enrollment.payment_status),
        amount_due: (reason == Some(DenialReason::PaymentRequired)).then_some(enrollment.amount_due),
        reason,
    }
}

pub(crate) async fn check_access(
    pool: &PgPool,
    learner_id: &str,
    course_id: &str,
) -> LedgerResult<AccessDecision> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;

    let enrollment = enrollments::find(pool, learner_id, course_id).await?;
    let decision = evaluate(enrollment.as_ref());
    tracing::debug!(
        learner_id,
        course_id,
        has_access = decision.has_access,
        reason = ?decision.reason,
        "Access evaluated"
    );
    Ok(decision)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use super::*;

    fn enrollment(
        status: EnrollmentStatus,
        payment_status: PaymentStatus,
        access_status: AccessStatus,
        amount_due: Decimal,
    ) -> Enrollment {
        let now = datetime!(2025-01-01 12:00:00);
        Enrollment {
            id: "u1_online-course".to_string(),
            learner_id: "u1".to_string(),
            course_id: "online-course".to_string(),
            learner_email: None,
            status,
            payment_status,
            access_status,
            total_amount: dec!(99.99),
            amount_paid: dec!(99.99) - amount_due,
            amount_due,
            upfront_amount: dec!(99.99),
            remaining_amount: Decimal::ZERO,
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
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn missing_enrollment_is_denied_with_message() {
        let decision = evaluate(None);
        assert!(!decision.has_access);
        assert_eq!(decision.reason, Some(DenialReason::NotEnrolled));
        assert_eq!(decision.message(), Some("No enrollment found"));
    }

    #[test]
    fn unlocked_active_enrollment_has_access() {
        let row = enrollment(
            EnrollmentStatus::Active,
            PaymentStatus::Completed,
            AccessStatus::Unlocked,
            Decimal::ZERO,
        );
        let decision = evaluate(Some(&row));
        assert!(decision.has_access);
        assert_eq!(decision.reason, None);
        assert_eq!(decision.message(), None);
    }

    #[test]
    fn locked_enrollment_reports_amount_due() {
        let row = enrollment(
            EnrollmentStatus::PendingPayment,
            PaymentStatus::Partial,
            AccessStatus::Locked,
            dec!(45.00),
        );
        let decision = evaluate(Some(&row));
        assert!(!decision.has_access);
        assert_eq!(decision.reason, Some(DenialReason::PaymentRequired));
        assert_eq!(decision.amount_due, Some(dec!(45.00)));
    }

    #[test]
    fn gate_is_total_over_all_state_combinations() {
        let statuses = [
            EnrollmentStatus::PendingPayment,
            EnrollmentStatus::Active,
            EnrollmentStatus::Completed,
            EnrollmentStatus::Suspended,
            EnrollmentStatus::Cancelled,
        ];
        let accesses =
            [AccessStatus::Locked, AccessStatus::Unlocked, AccessStatus::PendingCertificate];

        for status in statuses {
            for access in accesses {
                let row = enrollment(status, PaymentStatus::Pending, access, Decimal::ZERO);
                let decision = evaluate(Some(&row));
                let expected = access == AccessStatus::Unlocked && status == EnrollmentStatus::Active;
                assert_eq!(decision.has_access, expected, "{status:?}/{access:?}");
                assert_eq!(decision.reason.is_none(), expected, "{status:?}/{access:?}");
            }
        }
    }

    #[test]
    fn suspended_and_pending_certificate_reasons() {
        let suspended = enrollment(
            EnrollmentStatus::Suspended,
            PaymentStatus::Completed,
            AccessStatus::Unlocked,
            Decimal::ZERO,
        );
        assert_eq!(evaluate(Some(&suspended)).reason, Some(DenialReason::EnrollmentInactive));

        let waiting = enrollment(
            EnrollmentStatus::Active,
            PaymentStatus::Completed,
            AccessStatus::PendingCertificate,
            Decimal::ZERO,
        );
        assert_eq!(evaluate(Some(&waiting)).reason, Some(DenialReason::CertificatePending));
    }
}

use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::core::config::LedgerSettings;
use crate::core::time::primitive_now_utc;
use crate::db::models::Enrollment;
use crate::db::types::{AccessStatus, EnrollmentStatus, PaymentStatus};
use crate::repositories::enrollments::{self, enrollment_id, CreateEnrollment};
use crate::services::catalog::CoursePricing;
use crate::services::errors::{require_id, LedgerError, LedgerResult};

/// Statuses and balance an enrollment starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpeningTerms {
    pub(crate) status: EnrollmentStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    pub(crate) amount_paid: Decimal,
    pub(crate) amount_due: Decimal,
}

pub(crate) fn opening_terms(total: Decimal, allowlisted: bool) -> OpeningTerms {
    if allowlisted {
        OpeningTerms {
            status: EnrollmentStatus::Active,
            payment_status: PaymentStatus::Completed,
            access_status: AccessStatus::Unlocked,
            amount_paid: total,
            amount_due: Decimal::ZERO,
        }
    } else {
        OpeningTerms {
            status: EnrollmentStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            access_status: AccessStatus::Locked,
            amount_paid: Decimal::ZERO,
            amount_due: total,
        }
    }
}

/// Status changes an administrator may make outside the payment flow.
pub(crate) fn transition_allowed(from: EnrollmentStatus, to: EnrollmentStatus) -> bool {
    use EnrollmentStatus::*;

    match (from, to) {
        (Active, Suspended) | (Suspended, Active) | (Active, Completed) => true,
        (Cancelled, _) => false,
        (_, Cancelled) => true,
        _ => false,
    }
}

/// Access after a certificate is recorded; non-gated courses keep their current access.
pub(crate) fn certificate_access(
    certificate_gated: bool,
    payment_status: PaymentStatus,
    current: AccessStatus,
) -> AccessStatus {
    if !certificate_gated {
        return current;
    }
    if payment_status == PaymentStatus::Completed {
        AccessStatus::Unlocked
    } else {
        AccessStatus::PendingCertificate
    }
}

/// What the learner must pay next: the rest of the upfront installment while a split
/// bundle's upfront part is still open, otherwise the whole outstanding balance.
pub(crate) fn next_installment_due(enrollment: &Enrollment) -> Decimal {
    if enrollment.is_split_payment
        && !enrollment.is_component_of_bundle
        && enrollment.amount_paid < enrollment.upfront_amount
    {
        return (enrollment.upfront_amount - enrollment.amount_paid).min(enrollment.amount_due);
    }
    enrollment.amount_due
}

#[derive(Debug, Clone)]
pub(crate) struct BundleEnrollment {
    pub(crate) bundle: Enrollment,
    pub(crate) components: Vec<Enrollment>,
}

fn lookup<'a>(ledger: &'a LedgerSettings, course_id: &str) -> LedgerResult<&'a CoursePricing> {
    ledger
        .catalog
        .lookup(course_id)
        .ok_or_else(|| LedgerError::InvalidCourse { course_id: course_id.to_string() })
}

fn is_allowlisted(ledger: &LedgerSettings, learner_email: Option<&str>) -> bool {
    learner_email.map(|email| ledger.auto_enroll.contains(email)).unwrap_or(false)
}

pub(crate) async fn create_enrollment(
    pool: &PgPool,
    ledger: &LedgerSettings,
    learner_id: &str,
    course_id: &str,
    learner_email: Option<&str>,
) -> LedgerResult<Enrollment> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;

    let pricing = lookup(ledger, course_id)?;
    if pricing.is_bundle() {
        let created =
            create_bundle_enrollment(pool, ledger, learner_id, course_id, learner_email, false)
                .await?;
        return Ok(created.bundle);
    }

    if let Some(existing) = enrollments::find(pool, learner_id, course_id).await? {
        return Ok(existing);
    }

    let allowlisted = is_allowlisted(ledger, learner_email);
    let terms = opening_terms(pricing.total, allowlisted);
    let inserted = enrollments::insert_if_absent(
        pool,
        CreateEnrollment {
            learner_id,
            course_id,
            learner_email,
            status: terms.status,
            payment_status: terms.payment_status,
            access_status: terms.access_status,
            total_amount: pricing.total,
            amount_paid: terms.amount_paid,
            amount_due: terms.amount_due,
            upfront_amount: pricing.upfront_or_total(),
            remaining_amount: pricing.remaining,
            parent_enrollment_id: None,
            is_component_of_bundle: false,
            is_split_payment: false,
            is_admin_enrollment: allowlisted,
            now: primitive_now_utc(),
        },
    )
    .await?;

    if inserted {
        tracing::info!(
            learner_id,
            course_id,
            admin = allowlisted,
            action = "enrollment_created",
            "Enrollment created"
        );
    }

    enrollments::find(pool, learner_id, course_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))
}

pub(crate) async fn create_bundle_enrollment(
    pool: &PgPool,
    ledger: &LedgerSettings,
    learner_id: &str,
    bundle_course_id: &str,
    learner_email: Option<&str>,
    split: bool,
) -> LedgerResult<BundleEnrollment> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", bundle_course_id)?;

    let pricing = lookup(ledger, bundle_course_id)?;
    if !pricing.is_bundle() {
        return Err(LedgerError::Validation(format!(
            "course '{bundle_course_id}' is not a bundle"
        )));
    }

    let bundle_id = enrollment_id(learner_id, bundle_course_id);
    let allowlisted = is_allowlisted(ledger, learner_email);
    let now = primitive_now_utc();

    let mut tx = pool.begin().await?;

    if let Some(bundle) = enrollments::lock(&mut *tx, learner_id, bundle_course_id).await? {
        let components = enrollments::list_components(&mut *tx, &bundle.id).await?;
        tx.commit().await?;
        return Ok(BundleEnrollment { bundle, components });
    }

    for component in &pricing.components {
        if let Some(existing) = enrollments::find(&mut *tx, learner_id, &component.course_id).await?
        {
            if existing.parent_enrollment_id.as_deref() != Some(bundle_id.as_str()) {
                return Err(LedgerError::Conflict(format!(
                    "learner '{learner_id}' is already enrolled in '{}' outside the bundle",
                    component.course_id
                )));
            }
        }
    }

    let terms = opening_terms(pricing.total, allowlisted);
    let inserted = enrollments::insert_if_absent(
        &mut *tx,
        CreateEnrollment {
            learner_id,
            course_id: bundle_course_id,
            learner_email,
            status: terms.status,
            payment_status: terms.payment_status,
            access_status: terms.access_status,
            total_amount: pricing.total,
            amount_paid: terms.amount_paid,
            amount_due: terms.amount_due,
            upfront_amount: pricing.upfront_or_total(),
            remaining_amount: pricing.remaining,
            parent_enrollment_id: None,
            is_component_of_bundle: false,
            is_split_payment: split,
            is_admin_enrollment: allowlisted,
            now,
        },
    )
    .await?;

    if inserted {
        // Components carry no price of their own; the bundle row holds the balance.
        let component_terms = opening_terms(Decimal::ZERO, allowlisted);
        for component in &pricing.components {
            enrollments::insert_if_absent(
                &mut *tx,
                CreateEnrollment {
                    learner_id,
                    course_id: &component.course_id,
                    learner_email,
                    status: component_terms.status,
                    payment_status: component_terms.payment_status,
                    access_status: component_terms.access_status,
                    total_amount: Decimal::ZERO,
                    amount_paid: Decimal::ZERO,
                    amount_due: Decimal::ZERO,
                    upfront_amount: Decimal::ZERO,
                    remaining_amount: Decimal::ZERO,
                    parent_enrollment_id: Some(bundle_id.as_str()),
                    is_component_of_bundle: true,
                    is_split_payment: split,
                    is_admin_enrollment: allowlisted,
                    now,
                },
            )
            .await?;
        }
    }

    let bundle = enrollments::find_by_id(&mut *tx, &bundle_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, bundle_course_id))?;
    let components = enrollments::list_components(&mut *tx, &bundle.id).await?;
    tx.commit().await?;

    if inserted {
        tracing::info!(
            learner_id,
            course_id = bundle_course_id,
            split,
            components = components.len(),
            admin = allowlisted,
            action = "bundle_enrollment_created",
            "Bundle enrollment created"
        );
    }

    Ok(BundleEnrollment { bundle, components })
}

pub(crate) async fn get_enrollment(
    pool: &PgPool,
    learner_id: &str,
    course_id: &str,
) -> LedgerResult<Enrollment> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;

    enrollments::find(pool, learner_id, course_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))
}

pub(crate) async fn list_enrollments(
    pool: &PgPool,
    learner_id: &str,
) -> LedgerResult<Vec<Enrollment>> {
    require_id("learner_id", learner_id)?;
    Ok(enrollments::list_for_learner(pool, learner_id).await?)
}

pub(crate) async fn reset_to_pending(
    pool: &PgPool,
    learner_id: &str,
    course_id: &str,
) -> LedgerResult<Enrollment> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;
    enrollments::lock(&mut *tx, learner_id, course_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;

    let enrollment = enrollments::reset_to_pending(&mut *tx, learner_id, course_id, now)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;

    // Components of a reset bundle lose access along with the bundle.
    let mut components_reset = 0usize;
    if !enrollment.is_component_of_bundle {
        for component in enrollments::list_components(&mut *tx, &enrollment.id).await? {
            if enrollments::relock_component(&mut *tx, &component.id, now).await? {
                components_reset += 1;
            }
        }
    }
    tx.commit().await?;

    tracing::warn!(
        learner_id,
        course_id,
        components_reset,
        action = "enrollment_reset",
        "Enrollment reset to pending"
    );
    Ok(enrollment)
}

pub(crate) async fn change_status(
    pool: &PgPool,
    learner_id: &str,
    course_id: &str,
    new_status: EnrollmentStatus,
) -> LedgerResult<Enrollment> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;

    let mut tx = pool.begin().await?;
    let current = enrollments::lock(&mut *tx, learner_id, course_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;

    if !transition_allowed(current.status, new_status) {
        return Err(LedgerError::Validation(format!(
            "cannot change enrollment status from {} to {}",
            current.status.as_str(),
            new_status.as_str()
        )));
    }

    let updated =
        enrollments::update_status(&mut *tx, &current.id, new_status, primitive_now_utc()).await?;
    tx.commit().await?;

    tracing::info!(
        learner_id,
        course_id,
        from = current.status.as_str(),
        to = new_status.as_str(),
        action = "enrollment_status_changed",
        "Enrollment status changed"
    );
    Ok(updated)
}

pub(crate) async fn record_certificate(
    pool: &PgPool,
    ledger: &LedgerSettings,
    learner_id: &str,
    course_id: &str,
) -> LedgerResult<Enrollment> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;

    let gated =
        ledger.catalog.lookup(course_id).map(|pricing| pricing.certificate_gated).unwrap_or(false);

    let mut tx = pool.begin().await?;
    let current = enrollments::lock(&mut *tx, learner_id, course_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;

    let access = certificate_access(gated, current.payment_status, current.access_status);
    let updated =
        enrollments::record_certificate(&mut *tx, &current.id, access, primitive_now_utc()).await?;
    tx.commit().await?;

    tracing::info!(
        learner_id,
        course_id,
        gated,
        action = "certificate_recorded",
        "Certificate recorded"
    );
    Ok(updated)
}

/// Enrolls an allowlisted learner in every catalog course. `None` for everyone else.
pub(crate) async fn auto_enroll_admin(
    pool: &PgPool,
    ledger: &LedgerSettings,
    learner_id: &str,
    learner_email: &str,
) -> LedgerResult<Option<Vec<Enrollment>>> {
    require_id("learner_id", learner_id)?;
    if !ledger.auto_enroll.contains(learner_email) {
        return Ok(None);
    }

    // Bundles first so their components are created under them.
    let mut courses: Vec<&CoursePricing> = ledger.catalog.courses().collect();
    courses.sort_by_key(|pricing| !pricing.is_bundle());

    for pricing in courses {
        if pricing.is_bundle() {
            create_bundle_enrollment(
                pool,
                ledger,
                learner_id,
                &pricing.course_id,
                Some(learner_email),
                false,
            )
            .await?;
        } else {
            create_enrollment(pool, ledger, learner_id, &pricing.course_id, Some(learner_email))
                .await?;
        }
    }

    tracing::info!(learner_id, action = "admin_auto_enrolled", "Admin auto-enrolled in catalog");
    Ok(Some(enrollments::list_for_learner(pool, learner_id).await?))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    use super::*;

    fn split_bundle(amount_paid: Decimal) -> Enrollment {
        let now = datetime!(2025-01-01 12:00:00);
        Enrollment {
            id: "u1_complete-package".to_string(),
            learner_id: "u1".to_string(),
            course_id: "complete-package".to_string(),
            learner_email: None,
            status: EnrollmentStatus::PendingPayment,
            payment_status: PaymentStatus::Pending,
            access_status: AccessStatus::Locked,
            total_amount: dec!(549.99),
            amount_paid,
            amount_due: dec!(549.99) - amount_paid,
            upfront_amount: dec!(99.99),
            remaining_amount: dec!(450.00),
            parent_enrollment_id: None,
            is_component_of_bundle: false,
            is_split_payment: true,
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
    fn next_installment_tracks_upfront_then_balance() {
        assert_eq!(next_installment_due(&split_bundle(Decimal::ZERO)), dec!(99.99));
        assert_eq!(next_installment_due(&split_bundle(dec!(50.00))), dec!(49.99));
        assert_eq!(next_installment_due(&split_bundle(dec!(99.99))), dec!(450.00));

        let mut full = split_bundle(Decimal::ZERO);
        full.is_split_payment = false;
        assert_eq!(next_installment_due(&full), dec!(549.99));
    }

    #[test]
    fn opening_terms_for_regular_learner_owe_full_total() {
        let terms = opening_terms(dec!(549.99), false);
        assert_eq!(terms.status, EnrollmentStatus::PendingPayment);
        assert_eq!(terms.payment_status, PaymentStatus::Pending);
        assert_eq!(terms.access_status, AccessStatus::Locked);
        assert_eq!(terms.amount_paid, Decimal::ZERO);
        assert_eq!(terms.amount_due, dec!(549.99));
        assert_eq!(terms.amount_paid + terms.amount_due, dec!(549.99));
    }

    #[test]
    fn opening_terms_for_allowlisted_learner_are_settled() {
        let terms = opening_terms(dec!(99.99), true);
        assert_eq!(terms.status, EnrollmentStatus::Active);
        assert_eq!(terms.payment_status, PaymentStatus::Completed);
        assert_eq!(terms.access_status, AccessStatus::Unlocked);
        assert_eq!(terms.amount_paid, dec!(99.99));
        assert_eq!(terms.amount_due, Decimal::ZERO);
    }

    #[test]
    fn status_transitions() {
        use EnrollmentStatus::*;

        assert!(transition_allowed(Active, Suspended));
        assert!(transition_allowed(Suspended, Active));
        assert!(transition_allowed(Active, Completed));
        assert!(transition_allowed(PendingPayment, Cancelled));
        assert!(transition_allowed(Completed, Cancelled));

        assert!(!transition_allowed(PendingPayment, Active));
        assert!(!transition_allowed(Completed, Active));
        assert!(!transition_allowed(Cancelled, Active));
        assert!(!transition_allowed(Cancelled, Cancelled));
        assert!(!transition_allowed(Suspended, Completed));
    }

    #[test]
    fn certificate_unlocks_gated_course_only_when_paid() {
        assert_eq!(
            certificate_access(true, PaymentStatus::Completed, AccessStatus::PendingCertificate),
            AccessStatus::Unlocked
        );
        assert_eq!(
            certificate_access(true, PaymentStatus::Partial, AccessStatus::Locked),
            AccessStatus::PendingCertificate
        );
        assert_eq!(
            certificate_access(false, PaymentStatus::Pending, AccessStatus::Locked),
            AccessStatus::Locked
        );
    }
}

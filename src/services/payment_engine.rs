use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::config::LedgerSettings;
use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Enrollment, PaymentApplication};
use crate::db::types::{AccessStatus, EnrollmentStatus, PaymentStatus};
use crate::repositories::{enrollments, payments};
use crate::services::catalog::{CoursePricing, UnlockStage};
use crate::services::errors::{require_id, LedgerError, LedgerResult};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Statuses {
    pub(crate) status: EnrollmentStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
}

/// Derives statuses from the balance left after a payment.
///
/// A settled balance activates the enrollment and unlocks it, except that a
/// certificate-gated course waits in `PendingCertificate` until the certificate exists.
/// Suspended and completed enrollments keep their status and access; payments never
/// lift a hold, they only settle the balance.
pub(crate) fn derive_statuses(
    prior: Statuses,
    amount_due_after: Decimal,
    certificate_gated: bool,
    certificate_generated: bool,
) -> Statuses {
    if amount_due_after > Decimal::ZERO {
        return Statuses { payment_status: PaymentStatus::Partial, ..prior };
    }

    if matches!(prior.status, EnrollmentStatus::Suspended | EnrollmentStatus::Completed) {
        return Statuses { payment_status: PaymentStatus::Completed, ..prior };
    }

    let access_status = if certificate_gated && !certificate_generated {
        AccessStatus::PendingCertificate
    } else {
        AccessStatus::Unlocked
    };

    Statuses {
        status: EnrollmentStatus::Active,
        payment_status: PaymentStatus::Completed,
        access_status,
    }
}

/// Components of `bundle` that the balance now pays for.
pub(crate) fn components_to_unlock(
    bundle: &CoursePricing,
    split: bool,
    upfront_amount: Decimal,
    amount_paid_after: Decimal,
    amount_due_after: Decimal,
) -> Vec<&str> {
    let fully_paid = amount_due_after.is_zero();
    let upfront_paid = split && amount_paid_after >= upfront_amount;

    bundle
        .components
        .iter()
        .filter(|component| match component.unlocks_at {
            UnlockStage::FullPayment => fully_paid,
            UnlockStage::Upfront => fully_paid || upfront_paid,
        })
        .map(|component| component.course_id.as_str())
        .collect()
}

/// Splits a payment into the part the balance absorbs and the surplus.
pub(crate) fn split_amount(amount: Decimal, amount_due: Decimal) -> (Decimal, Decimal) {
    let applied = amount.min(amount_due.max(Decimal::ZERO));
    (applied, amount - applied)
}

pub(crate) fn validate_amount(amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount { amount });
    }
    if amount.normalize().scale() > 2 {
        return Err(LedgerError::Validation(format!(
            "payment amount {amount} has more than two decimal places"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) struct PaymentRequest<'a> {
    pub(crate) learner_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) amount: Decimal,
    pub(crate) idempotency_key: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub(crate) struct PaymentOutcome {
    pub(crate) application_id: String,
    pub(crate) enrollment: Enrollment,
    pub(crate) applied: Decimal,
    pub(crate) surplus: Decimal,
    pub(crate) unlocked_components: Vec<String>,
    pub(crate) replayed: bool,
}

pub(crate) async fn apply_payment(
    pool: &PgPool,
    ledger: &LedgerSettings,
    request: PaymentRequest<'_>,
) -> LedgerResult<PaymentOutcome> {
    let PaymentRequest { learner_id, course_id, amount, idempotency_key } = request;
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;
    validate_amount(amount)?;
    if let Some(key) = idempotency_key {
        if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(LedgerError::Validation(format!(
                "idempotency key must be 1..={MAX_IDEMPOTENCY_KEY_LEN} characters"
            )));
        }
    }

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;

    let current = enrollments::lock(&mut *tx, learner_id, course_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;

    if let Some(key) = idempotency_key {
        if let Some(previous) =
            payments::find_by_idempotency_key(&mut *tx, &current.id, key).await?
        {
            tx.commit().await?;
            tracing::info!(
                learner_id,
                course_id,
                idempotency_key = key,
                action = "payment_replayed",
                "Payment replay returned recorded outcome"
            );
            return Ok(PaymentOutcome {
                application_id: previous.id,
                enrollment: current,
                applied: previous.applied_amount,
                surplus: previous.surplus,
                unlocked_components: Vec::new(),
                replayed: true,
            });
        }
    }

    if current.is_component_of_bundle {
        return Err(LedgerError::Validation(format!(
            "course '{course_id}' is part of a bundle; pay the bundle enrollment instead"
        )));
    }
    if current.status == EnrollmentStatus::Cancelled {
        return Err(LedgerError::Validation(format!(
            "enrollment for learner '{learner_id}' in course '{course_id}' is cancelled"
        )));
    }

    let balance = enrollments::increment_balance(&mut *tx, &current.id, amount, now)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;
    let applied = balance.amount_paid - current.amount_paid;
    let surplus = amount - applied;

    let pricing = ledger.catalog.lookup(course_id);
    let gated = pricing.map(|pricing| pricing.certificate_gated).unwrap_or(false);
    let next = derive_statuses(
        Statuses {
            status: current.status,
            payment_status: current.payment_status,
            access_status: current.access_status,
        },
        balance.amount_due,
        gated,
        current.certificate_generated,
    );

    let settled_now = balance.amount_due.is_zero() && !current.amount_due.is_zero();
    let written = enrollments::write_statuses(
        &mut *tx,
        &current.id,
        balance.version,
        &enrollments::StatusUpdate {
            status: next.status,
            payment_status: next.payment_status,
            access_status: next.access_status,
            completed_at: None,
        },
        now,
    )
    .await?;
    if !written {
        return Err(LedgerError::Concurrency(format!(
            "enrollment '{}' changed while applying payment",
            current.id
        )));
    }

    let mut unlocked_components = Vec::new();
    if let Some(bundle) = pricing.filter(|pricing| pricing.is_bundle()) {
        let targets = components_to_unlock(
            bundle,
            current.is_split_payment,
            current.upfront_amount,
            balance.amount_paid,
            balance.amount_due,
        );
        for component_course_id in targets {
            let component_id = enrollments::enrollment_id(learner_id, component_course_id);
            if enrollments::unlock_component(&mut *tx, &component_id, now).await? {
                unlocked_components.push(component_course_id.to_string());
            }
        }
    }

    let application_id = Uuid::new_v4().to_string();
    payments::create(
        &mut *tx,
        payments::CreatePaymentApplication {
            id: &application_id,
            enrollment_id: &current.id,
            learner_id,
            course_id,
            requested_amount: amount,
            applied_amount: applied,
            surplus,
            amount_paid_after: balance.amount_paid,
            amount_due_after: balance.amount_due,
            payment_status: next.payment_status,
            access_status: next.access_status,
            enrollment_status: next.status,
            idempotency_key,
            created_at: now,
        },
    )
    .await?;

    let enrollment = enrollments::find_by_id(&mut *tx, &current.id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;
    tx.commit().await?;

    metrics::record_payment(next.payment_status.as_str(), applied, surplus);
    tracing::info!(
        learner_id,
        course_id,
        amount = %amount,
        applied = %applied,
        surplus = %surplus,
        amount_due = %enrollment.amount_due,
        payment_status = next.payment_status.as_str(),
        settled = settled_now,
        unlocked = ?unlocked_components,
        action = "payment_applied",
        "Payment applied"
    );
    if surplus > Decimal::ZERO {
        tracing::warn!(
            learner_id,
            course_id,
            surplus = %surplus,
            action = "payment_surplus",
            "Payment exceeded the outstanding balance"
        );
    }

    Ok(PaymentOutcome {
        application_id,
        enrollment,
        applied,
        surplus,
        unlocked_components,
        replayed: false,
    })
}

pub(crate) async fn payment_history(
    pool: &PgPool,
    learner_id: &str,
    course_id: &str,
) -> LedgerResult<Vec<PaymentApplication>> {
    require_id("learner_id", learner_id)?;
    require_id("course_id", course_id)?;

    let enrollment = enrollments::find(pool, learner_id, course_id)
        .await?
        .ok_or_else(|| LedgerError::enrollment_not_found(learner_id, course_id))?;
    Ok(payments::list_for_enrollment(pool, &enrollment.id).await?)
}

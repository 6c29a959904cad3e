use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::AdminKey;
use crate::core::state::AppState;
use crate::schemas::enrollment::{
    AccessResponse, AutoEnrollRequest, BundleEnrollmentCreate, BundleEnrollmentResponse,
    EnrollmentCreate, EnrollmentResponse, StatusChangeRequest,
};
use crate::schemas::payment::{PaymentApplicationResponse, PaymentCreate, PaymentResponse};
use crate::services::payment_engine::{self, PaymentRequest};
use crate::services::{access_gate, enrollment_ledger};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_enrollment))
        .route("/bundles", post(create_bundle_enrollment))
        .route("/auto-enroll", post(auto_enroll))
        .route("/learners/:learner_id", get(list_enrollments))
        .route("/learners/:learner_id/courses/:course_id", get(get_enrollment))
        .route("/learners/:learner_id/courses/:course_id/access", get(check_access))
        .route(
            "/learners/:learner_id/courses/:course_id/payments",
            get(payment_history).post(apply_payment),
        )
        .route("/learners/:learner_id/courses/:course_id/reset", post(reset_to_pending))
        .route("/learners/:learner_id/courses/:course_id/status", put(change_status))
        .route("/learners/:learner_id/courses/:course_id/certificate", post(record_certificate))
}

async fn create_enrollment(
    State(state): State<AppState>,
    Json(payload): Json<EnrollmentCreate>,
) -> Result<(StatusCode, Json<EnrollmentResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let enrollment = enrollment_ledger::create_enrollment(
        state.db(),
        state.settings().ledger(),
        payload.learner_id.trim(),
        payload.course_id.trim(),
        payload.learner_email.as_deref(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(EnrollmentResponse::from_db(enrollment))))
}

async fn create_bundle_enrollment(
    State(state): State<AppState>,
    Json(payload): Json<BundleEnrollmentCreate>,
) -> Result<(StatusCode, Json<BundleEnrollmentResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let created = enrollment_ledger::create_bundle_enrollment(
        state.db(),
        state.settings().ledger(),
        payload.learner_id.trim(),
        payload.bundle_course_id.trim(),
        payload.learner_email.as_deref(),
        payload.split_payment,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(BundleEnrollmentResponse::from_service(created))))
}

async fn auto_enroll(
    _admin: AdminKey,
    State(state): State<AppState>,
    Json(payload): Json<AutoEnrollRequest>,
) -> Result<Json<Vec<EnrollmentResponse>>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let enrolled = enrollment_ledger::auto_enroll_admin(
        state.db(),
        state.settings().ledger(),
        payload.learner_id.trim(),
        payload.email.trim(),
    )
    .await?
    .ok_or(ApiError::Forbidden("Email is not on the auto-enroll allowlist"))?;

    Ok(Json(enrolled.into_iter().map(EnrollmentResponse::from_db).collect()))
}

async fn list_enrollments(
    Path(learner_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<EnrollmentResponse>>, ApiError> {
    let enrollments = enrollment_ledger::list_enrollments(state.db(), &learner_id).await?;
    Ok(Json(enrollments.into_iter().map(EnrollmentResponse::from_db).collect()))
}

async fn get_enrollment(
    Path((learner_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    let enrollment = enrollment_ledger::get_enrollment(state.db(), &learner_id, &course_id).await?;
    Ok(Json(EnrollmentResponse::from_db(enrollment)))
}

async fn check_access(
    Path((learner_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<AccessResponse>, ApiError> {
    let decision = access_gate::check_access(state.db(), &learner_id, &course_id).await?;
    Ok(Json(AccessResponse::from(decision)))
}

async fn apply_payment(
    _admin: AdminKey,
    Path((learner_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(payload): Json<PaymentCreate>,
) -> Result<Json<PaymentResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let outcome = payment_engine::apply_payment(
        state.db(),
        state.settings().ledger(),
        PaymentRequest {
            learner_id: &learner_id,
            course_id: &course_id,
            amount: payload.amount,
            idempotency_key: payload.idempotency_key.as_deref(),
        },
    )
    .await?;

    Ok(Json(PaymentResponse::from_outcome(outcome)))
}

async fn payment_history(
    Path((learner_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Vec<PaymentApplicationResponse>>, ApiError> {
    let history = payment_engine::payment_history(state.db(), &learner_id, &course_id).await?;
    Ok(Json(history.into_iter().map(PaymentApplicationResponse::from_db).collect()))
}

async fn reset_to_pending(
    _admin: AdminKey,
    Path((learner_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    let enrollment =
        enrollment_ledger::reset_to_pending(state.db(), &learner_id, &course_id).await?;
    Ok(Json(EnrollmentResponse::from_db(enrollment)))
}

async fn change_status(
    _admin: AdminKey,
    Path((learner_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
    Json(payload): Json<StatusChangeRequest>,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    let enrollment =
        enrollment_ledger::change_status(state.db(), &learner_id, &course_id, payload.status)
            .await?;
    Ok(Json(EnrollmentResponse::from_db(enrollment)))
}

async fn record_certificate(
    _admin: AdminKey,
    Path((learner_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<EnrollmentResponse>, ApiError> {
    let enrollment = enrollment_ledger::record_certificate(
        state.db(),
        state.settings().ledger(),
        &learner_id,
        &course_id,
    )
    .await?;
    Ok(Json(EnrollmentResponse::from_db(enrollment)))
}

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::schemas::compliance::{
    BreakEndRequest, BreakResponse, BreakStartRequest, ComplianceSessionResponse,
    CompletionEventRequest, CompletionResponse, CourseProgressResponse, DailyStudyTimeResponse,
    HistoryQuery, LockoutResponse, SessionCloseRequest, SessionOpenRequest, StudyTimeResponse,
};
use crate::services::compliance_tracker::{self, SessionOpen};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(open_session))
        .route("/sessions/:session_id", get(get_session))
        .route("/sessions/:session_id/close", post(close_session))
        .route("/sessions/:session_id/breaks", post(record_break))
        .route("/sessions/:session_id/breaks/end", post(end_break))
        .route("/sessions/:session_id/completions", post(record_completion))
        .route("/learners/:user_id/courses/:course_id/daily", get(daily_study_time))
        .route("/learners/:user_id/courses/:course_id/lockout", get(daily_lockout))
        .route("/learners/:user_id/courses/:course_id/progress", get(course_progress))
        .route("/learners/:user_id/courses/:course_id/sessions", get(session_history))
        .route("/learners/:user_id/courses/:course_id/total", get(total_study_time))
}

async fn open_session(
    State(state): State<AppState>,
    Json(payload): Json<SessionOpenRequest>,
) -> Result<(StatusCode, Json<ComplianceSessionResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let session = compliance_tracker::open_session(
        state.db(),
        SessionOpen {
            user_id: payload.user_id.trim(),
            course_id: payload.course_id.trim(),
            ip_address: payload.ip_address.as_deref(),
            device_info: payload.device_info.as_deref(),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(ComplianceSessionResponse::from_db(session))))
}

async fn get_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ComplianceSessionResponse>, ApiError> {
    let session = compliance_tracker::get_session(state.db(), &session_id).await?;
    Ok(Json(ComplianceSessionResponse::from_db(session)))
}

async fn close_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<SessionCloseRequest>,
) -> Result<Json<ComplianceSessionResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let session = compliance_tracker::close_session(
        state.db(),
        state.settings().compliance(),
        &session_id,
        payload.into_summary(),
    )
    .await?;
    Ok(Json(ComplianceSessionResponse::from_db(session)))
}

async fn record_break(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<BreakStartRequest>,
) -> Result<(StatusCode, Json<BreakResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let record = compliance_tracker::record_break(
        state.db(),
        &session_id,
        &payload.break_type,
        payload.scheduled_duration_seconds,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(BreakResponse::from_record(record))))
}

async fn end_break(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<BreakEndRequest>,
) -> Result<Json<BreakResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let record = compliance_tracker::end_break(
        state.db(),
        state.settings().compliance(),
        &session_id,
        payload.actual_duration_seconds,
    )
    .await?;
    Ok(Json(BreakResponse::from_record(record)))
}

async fn record_completion(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<CompletionEventRequest>,
) -> Result<(StatusCode, Json<CompletionResponse>), ApiError> {
    let event = payload.into_event()?;
    let outcome = compliance_tracker::record_completion_event(state.db(), &session_id, event).await?;
    Ok((StatusCode::CREATED, Json(CompletionResponse::from(outcome))))
}

async fn daily_study_time(
    Path((user_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<DailyStudyTimeResponse>, ApiError> {
    let daily = compliance_tracker::daily_study_time(
        state.db(),
        state.settings().compliance(),
        &user_id,
        &course_id,
    )
    .await?;
    Ok(Json(DailyStudyTimeResponse::from(daily)))
}

async fn daily_lockout(
    Path((user_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<LockoutResponse>, ApiError> {
    let locked_out = compliance_tracker::is_daily_locked_out(
        state.db(),
        state.settings().compliance(),
        &user_id,
        &course_id,
    )
    .await?;
    Ok(Json(LockoutResponse { locked_out }))
}

async fn course_progress(
    Path((user_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<CourseProgressResponse>, ApiError> {
    compliance_tracker::course_progress(state.db(), &user_id, &course_id)
        .await?
        .map(|progress| Json(CourseProgressResponse::from_db(progress)))
        .ok_or_else(|| ApiError::NotFound("No progress recorded for this course".to_string()))
}

async fn session_history(
    Path((user_id, course_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ComplianceSessionResponse>>, ApiError> {
    let sessions =
        compliance_tracker::session_history(state.db(), &user_id, &course_id, query.limit).await?;
    Ok(Json(sessions.into_iter().map(ComplianceSessionResponse::from_db).collect()))
}

async fn total_study_time(
    Path((user_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<StudyTimeResponse>, ApiError> {
    let total = compliance_tracker::total_study_time(state.db(), &user_id, &course_id).await?;
    Ok(Json(StudyTimeResponse::from(total)))
}

#[cfg(test)]
mod tests;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::AdminKey;
use crate::core::state::AppState;
use crate::schemas::quiz::{
    AttemptsQuery, FinalExamStatusResponse, QuizAttemptResponse, QuizAttemptStart,
    QuizAttemptSubmit, QuizScoreResponse, RetakeQuery, RetakeResponse, ScoreQuery,
};
use crate::services::quiz_governor::{self, AttemptSubmission, QuizStart};

/// Routes addressing a single attempt.
pub(crate) fn attempts_router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_attempt))
        .route("/:attempt_id", get(get_attempt))
        .route("/:attempt_id/submit", post(submit_attempt))
        .route("/:attempt_id/mark-passed", post(mark_passed))
}

/// Per-learner quiz history and eligibility.
pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/learners/:user_id/courses/:course_id/attempts", get(list_attempts))
        .route("/learners/:user_id/courses/:course_id/retake", get(can_retake))
        .route("/learners/:user_id/courses/:course_id/final-exam", get(final_exam_status))
        .route("/learners/:user_id/courses/:course_id/score", get(quiz_score))
}

async fn start_attempt(
    State(state): State<AppState>,
    Json(payload): Json<QuizAttemptStart>,
) -> Result<(StatusCode, Json<QuizAttemptResponse>), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = quiz_governor::start_attempt(
        state.db(),
        state.settings().quiz(),
        QuizStart {
            user_id: payload.user_id.trim(),
            course_id: payload.course_id.trim(),
            quiz_id: payload.quiz_id.trim(),
            quiz_title: payload.quiz_title.as_deref(),
            is_final_exam: payload.is_final_exam,
            session_id: payload.session_id.as_deref(),
            ip_address: payload.ip_address.as_deref(),
            device_info: payload.device_info.as_deref(),
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(QuizAttemptResponse::from_db(attempt))))
}

async fn get_attempt(
    Path(attempt_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QuizAttemptResponse>, ApiError> {
    let attempt = quiz_governor::get_attempt(state.db(), &attempt_id).await?;
    Ok(Json(QuizAttemptResponse::from_db(attempt)))
}

async fn submit_attempt(
    Path(attempt_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<QuizAttemptSubmit>,
) -> Result<Json<QuizAttemptResponse>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let attempt = quiz_governor::submit_attempt(
        state.db(),
        state.settings().quiz(),
        &attempt_id,
        AttemptSubmission {
            correct_answers: payload.correct_answers,
            total_questions: payload.total_questions,
            answers: payload.answers,
            time_spent_seconds: payload.time_spent_seconds,
        },
    )
    .await?;

    Ok(Json(QuizAttemptResponse::from_db(attempt)))
}

async fn mark_passed(
    _admin: AdminKey,
    Path(attempt_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<QuizAttemptResponse>, ApiError> {
    let attempt = quiz_governor::mark_passed(state.db(), &attempt_id).await?;
    Ok(Json(QuizAttemptResponse::from_db(attempt)))
}

async fn list_attempts(
    Path((user_id, course_id)): Path<(String, String)>,
    Query(query): Query<AttemptsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<QuizAttemptResponse>>, ApiError> {
    let attempts = quiz_governor::list_attempts(
        state.db(),
        &user_id,
        &course_id,
        query.quiz_id.as_deref(),
        query.limit,
    )
    .await?;
    Ok(Json(attempts.into_iter().map(QuizAttemptResponse::from_db).collect()))
}

async fn can_retake(
    Path((user_id, course_id)): Path<(String, String)>,
    Query(query): Query<RetakeQuery>,
    State(state): State<AppState>,
) -> Result<Json<RetakeResponse>, ApiError> {
    let quiz_id = query.quiz_id.unwrap_or_default();
    let eligibility = quiz_governor::can_retake(
        state.db(),
        state.settings().quiz(),
        &user_id,
        &course_id,
        &quiz_id,
        query.final_exam,
    )
    .await?;
    Ok(Json(RetakeResponse::from(eligibility)))
}

async fn final_exam_status(
    Path((user_id, course_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<FinalExamStatusResponse>, ApiError> {
    let status =
        quiz_governor::final_exam_status(state.db(), state.settings().quiz(), &user_id, &course_id)
            .await?;
    Ok(Json(FinalExamStatusResponse::from(status)))
}

async fn quiz_score(
    Path((user_id, course_id)): Path<(String, String)>,
    Query(query): Query<ScoreQuery>,
    State(state): State<AppState>,
) -> Result<Json<QuizScoreResponse>, ApiError> {
    quiz_governor::quiz_score(state.db(), &user_id, &course_id, query.quiz_id.as_deref())
        .await?
        .map(|score| Json(QuizScoreResponse::from(score)))
        .ok_or_else(|| ApiError::NotFound("No quiz attempts found".to_string()))
}

#[cfg(test)]
mod tests;

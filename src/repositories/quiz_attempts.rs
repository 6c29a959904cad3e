use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::QuizAttempt;
use crate::db::types::AttemptStatus;

pub(crate) const COLUMNS: &str = "\
    id, user_id, course_id, quiz_id, quiz_title, is_final_exam, status, started_at, \
    completed_at, score, passed, correct_answers, total_questions, answers, time_spent_seconds, \
    session_id, ip_address, device_info, manually_passed_at, created_at, updated_at";

/// Which attempts count together for retake limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AttemptScope<'a> {
    FinalExam,
    Quiz(&'a str),
}

impl AttemptScope<'_> {
    pub(crate) fn lock_key(&self, user_id: &str, course_id: &str) -> String {
        match self {
            Self::FinalExam => format!("quiz:{user_id}:{course_id}:final"),
            Self::Quiz(quiz_id) => format!("quiz:{user_id}:{course_id}:{quiz_id}"),
        }
    }

    pub(crate) fn label(&self) -> String {
        match self {
            Self::FinalExam => "final exam".to_string(),
            Self::Quiz(quiz_id) => format!("quiz {quiz_id}"),
        }
    }
}

fn push_scope(
    builder: &mut QueryBuilder<'_, Postgres>,
    user_id: &str,
    course_id: &str,
    scope: AttemptScope<'_>,
) {
    builder.push(" WHERE user_id = ");
    builder.push_bind(user_id.to_string());
    builder.push(" AND course_id = ");
    builder.push_bind(course_id.to_string());
    match scope {
        AttemptScope::FinalExam => {
            builder.push(" AND is_final_exam");
        }
        AttemptScope::Quiz(quiz_id) => {
            builder.push(" AND quiz_id = ");
            builder.push_bind(quiz_id.to_string());
        }
    }
}

pub(crate) struct CreateAttempt<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) quiz_id: &'a str,
    pub(crate) quiz_title: Option<&'a str>,
    pub(crate) is_final_exam: bool,
    pub(crate) session_id: Option<&'a str>,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) device_info: Option<&'a str>,
    pub(crate) started_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateAttempt<'_>,
) -> Result<QuizAttempt, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "INSERT INTO quiz_attempts (
            id, user_id, course_id, quiz_id, quiz_title, is_final_exam, status, started_at,
            session_id, ip_address, device_info, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$8,$8)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.course_id)
    .bind(params.quiz_id)
    .bind(params.quiz_title)
    .bind(params.is_final_exam)
    .bind(AttemptStatus::InProgress)
    .bind(params.started_at)
    .bind(params.session_id)
    .bind(params.ip_address)
    .bind(params.device_info)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!("SELECT {COLUMNS} FROM quiz_attempts WHERE id = $1"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

pub(crate) struct CompleteAttempt {
    pub(crate) score: f64,
    pub(crate) passed: bool,
    pub(crate) correct_answers: i32,
    pub(crate) total_questions: i32,
    pub(crate) answers: serde_json::Value,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) completed_at: PrimitiveDateTime,
}

/// Finalizes an attempt that is still in progress. `None` means nothing was updated.
pub(crate) async fn complete(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: CompleteAttempt,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "UPDATE quiz_attempts
         SET status = $2,
             score = $3,
             passed = $4,
             correct_answers = $5,
             total_questions = $6,
             answers = $7,
             time_spent_seconds = $8,
             completed_at = $9,
             updated_at = $9
         WHERE id = $1 AND status = $10
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(AttemptStatus::Completed)
    .bind(params.score)
    .bind(params.passed)
    .bind(params.correct_answers)
    .bind(params.total_questions)
    .bind(sqlx::types::Json(params.answers))
    .bind(params.time_spent_seconds)
    .bind(params.completed_at)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn mark_passed(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "UPDATE quiz_attempts
         SET passed = TRUE,
             manually_passed_at = $2,
             updated_at = $2
         WHERE id = $1 AND status = $3
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(now)
    .bind(AttemptStatus::Completed)
    .fetch_optional(executor)
    .await
}

/// Attempts in scope, newest first.
pub(crate) async fn list_in_scope(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    course_id: &str,
    scope: AttemptScope<'_>,
    limit: i64,
) -> Result<Vec<QuizAttempt>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM quiz_attempts"));
    push_scope(&mut builder, user_id, course_id, scope);
    builder.push(" ORDER BY started_at DESC, created_at DESC, id DESC LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));
    builder.build_query_as::<QuizAttempt>().fetch_all(executor).await
}

pub(crate) async fn list_for_course(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
    limit: i64,
) -> Result<Vec<QuizAttempt>, sqlx::Error> {
    sqlx::query_as::<_, QuizAttempt>(&format!(
        "SELECT {COLUMNS} FROM quiz_attempts
         WHERE user_id = $1 AND course_id = $2
         ORDER BY started_at DESC, created_at DESC, id DESC
         LIMIT $3"
    ))
    .bind(user_id)
    .bind(course_id)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct ScopeStats {
    pub(crate) attempts: i64,
    pub(crate) passed: bool,
}

pub(crate) async fn scope_stats(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    course_id: &str,
    scope: AttemptScope<'_>,
) -> Result<ScopeStats, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT COUNT(*) AS attempts, COALESCE(BOOL_OR(passed), FALSE) AS passed FROM quiz_attempts",
    );
    push_scope(&mut builder, user_id, course_id, scope);
    builder.build_query_as::<ScopeStats>().fetch_one(executor).await
}

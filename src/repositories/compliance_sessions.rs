use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{BreakRecord, ComplianceSession, CompletionEventRecord};
use crate::db::types::ComplianceSessionStatus;

pub(crate) const COLUMNS: &str = "\
    id, user_id, course_id, status, start_time, end_time, duration_seconds, breaks, \
    completion_events, lessons_accessed, video_progress, ip_address, device_info, \
    created_at, updated_at";

pub(crate) struct CreateSession<'a> {
    pub(crate) id: &'a str,
    pub(crate) user_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) device_info: Option<&'a str>,
    pub(crate) start_time: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateSession<'_>,
) -> Result<ComplianceSession, sqlx::Error> {
    sqlx::query_as::<_, ComplianceSession>(&format!(
        "INSERT INTO compliance_sessions (
            id, user_id, course_id, status, start_time, ip_address, device_info,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$5,$5)
        RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.user_id)
    .bind(params.course_id)
    .bind(ComplianceSessionStatus::Open)
    .bind(params.start_time)
    .bind(params.ip_address)
    .bind(params.device_info)
    .fetch_one(executor)
    .await
}

pub(crate) async fn find_by_id(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ComplianceSession>, sqlx::Error> {
    sqlx::query_as::<_, ComplianceSession>(&format!(
        "SELECT {COLUMNS} FROM compliance_sessions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn lock(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
) -> Result<Option<ComplianceSession>, sqlx::Error> {
    sqlx::query_as::<_, ComplianceSession>(&format!(
        "SELECT {COLUMNS} FROM compliance_sessions WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn replace_breaks(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    breaks: &[BreakRecord],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE compliance_sessions SET breaks = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(Json(breaks))
        .bind(now)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn append_completion_event(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    event: &CompletionEventRecord,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE compliance_sessions
         SET completion_events = completion_events || jsonb_build_array($2::jsonb),
             updated_at = $3
         WHERE id = $1",
    )
    .bind(id)
    .bind(Json(event))
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) struct CloseSession<'a> {
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) duration_seconds: i64,
    pub(crate) breaks: &'a [BreakRecord],
    pub(crate) lessons_accessed: &'a [String],
    pub(crate) video_progress: Option<serde_json::Value>,
}

/// Closes an open session. `None` means it was not open anymore.
pub(crate) async fn close(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    params: CloseSession<'_>,
) -> Result<Option<ComplianceSession>, sqlx::Error> {
    sqlx::query_as::<_, ComplianceSession>(&format!(
        "UPDATE compliance_sessions
         SET status = $2,
             end_time = $3,
             duration_seconds = $4,
             breaks = $5,
             lessons_accessed = $6,
             video_progress = $7,
             updated_at = $3
         WHERE id = $1 AND status = $8
         RETURNING {COLUMNS}"
    ))
    .bind(id)
    .bind(ComplianceSessionStatus::Completed)
    .bind(params.end_time)
    .bind(params.duration_seconds)
    .bind(Json(params.breaks))
    .bind(Json(params.lessons_accessed))
    .bind(params.video_progress.map(Json))
    .bind(ComplianceSessionStatus::Open)
    .fetch_optional(executor)
    .await
}

/// Sum of durations of completed sessions started within `[from, to)`.
pub(crate) async fn completed_seconds_between(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    course_id: &str,
    from: PrimitiveDateTime,
    to: PrimitiveDateTime,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(duration_seconds), 0)::BIGINT
         FROM compliance_sessions
         WHERE user_id = $1
           AND course_id = $2
           AND status = $3
           AND start_time >= $4
           AND start_time < $5",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(ComplianceSessionStatus::Completed)
    .bind(from)
    .bind(to)
    .fetch_one(executor)
    .await
}

#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub(crate) struct StudyTotals {
    pub(crate) total_seconds: i64,
    pub(crate) session_count: i64,
}

pub(crate) async fn completed_totals(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
) -> Result<StudyTotals, sqlx::Error> {
    sqlx::query_as::<_, StudyTotals>(
        "SELECT COALESCE(SUM(duration_seconds), 0)::BIGINT AS total_seconds,
                COUNT(*) AS session_count
         FROM compliance_sessions
         WHERE user_id = $1 AND course_id = $2 AND status = $3",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(ComplianceSessionStatus::Completed)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list_recent(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
    limit: i64,
) -> Result<Vec<ComplianceSession>, sqlx::Error> {
    sqlx::query_as::<_, ComplianceSession>(&format!(
        "SELECT {COLUMNS} FROM compliance_sessions
         WHERE user_id = $1 AND course_id = $2
         ORDER BY start_time DESC, id DESC
         LIMIT $3"
    ))
    .bind(user_id)
    .bind(course_id)
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

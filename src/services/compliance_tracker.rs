use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::ComplianceSettings;
use crate::core::metrics;
use crate::core::time::{elapsed_seconds, local_day_bounds, primitive_now_utc};
use crate::db::models::{
    BreakRecord, BreakState, ComplianceFlag, ComplianceSession, CompletionEventRecord,
    CompletionKind, CourseProgress,
};
use crate::db::types::ComplianceSessionStatus;
use crate::repositories::compliance_sessions::{self, CloseSession, CreateSession};
use crate::repositories::{enrollments, progress};
use crate::services::errors::{require_id, LedgerError, LedgerResult};

const MAX_KEY_LEN: usize = 128;

fn validate_key_segment(field: &str, value: &str) -> LedgerResult<String> {
    let value = value.trim();
    if value.is_empty() || value.len() > MAX_KEY_LEN {
        return Err(LedgerError::Validation(format!(
            "{field} must be 1..={MAX_KEY_LEN} characters"
        )));
    }
    if !value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.')) {
        return Err(LedgerError::Validation(format!(
            "{field} may only contain letters, digits, '-', '_' and '.'"
        )));
    }
    Ok(value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ModuleKey {
    module_id: String,
}

impl ModuleKey {
    pub(crate) fn parse(module_id: &str) -> LedgerResult<Self> {
        Ok(Self { module_id: validate_key_segment("module_id", module_id)? })
    }

    pub(crate) fn module_id(&self) -> &str {
        &self.module_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LessonKey {
    module: ModuleKey,
    lesson_id: String,
}

impl LessonKey {
    pub(crate) fn parse(module_id: &str, lesson_id: &str) -> LedgerResult<Self> {
        Ok(Self {
            module: ModuleKey::parse(module_id)?,
            lesson_id: validate_key_segment("lesson_id", lesson_id)?,
        })
    }

    pub(crate) fn module_id(&self) -> &str {
        self.module.module_id()
    }

    pub(crate) fn lesson_id(&self) -> &str {
        &self.lesson_id
    }
}

pub(crate) fn break_flag(actual_seconds: i64, min_break_seconds: i64) -> Option<ComplianceFlag> {
    (actual_seconds < min_break_seconds).then_some(ComplianceFlag::BreakTooShort)
}

/// Completes `record`, flagging it when shorter than the minimum break.
pub(crate) fn complete_break(
    record: &mut BreakRecord,
    actual_seconds: i64,
    end_time: PrimitiveDateTime,
    min_break_seconds: i64,
) {
    record.end_time = Some(end_time);
    record.actual_duration_seconds = Some(actual_seconds);
    record.state = BreakState::Completed;
    record.compliance_flag = break_flag(actual_seconds, min_break_seconds);
}

fn open_break(breaks: &mut [BreakRecord]) -> Option<&mut BreakRecord> {
    breaks.iter_mut().rev().find(|record| record.state == BreakState::Initiated)
}

/// Reported session or break length, bounded by the wall clock since it started.
pub(crate) fn clamp_duration(
    reported_seconds: i64,
    start_time: PrimitiveDateTime,
    end_time: PrimitiveDateTime,
) -> i64 {
    reported_seconds.clamp(0, elapsed_seconds(start_time, end_time))
}

pub(crate) fn is_locked_out(daily_seconds: i64, max_daily_seconds: i64) -> bool {
    daily_seconds >= max_daily_seconds
}

fn ensure_open(session: &ComplianceSession) -> LedgerResult<()> {
    if session.status != ComplianceSessionStatus::Open {
        return Err(LedgerError::Conflict(format!(
            "compliance session '{}' is already closed",
            session.id
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) struct SessionOpen<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) device_info: Option<&'a str>,
}

pub(crate) async fn open_session(
    pool: &PgPool,
    open: SessionOpen<'_>,
) -> LedgerResult<ComplianceSession> {
    require_id("user_id", open.user_id)?;
    require_id("course_id", open.course_id)?;

    let session_id = Uuid::new_v4().to_string();
    let session = compliance_sessions::create(
        pool,
        CreateSession {
            id: &session_id,
            user_id: open.user_id,
            course_id: open.course_id,
            ip_address: open.ip_address,
            device_info: open.device_info,
            start_time: primitive_now_utc(),
        },
    )
    .await?;

    metrics::record_compliance_session("opened");
    tracing::info!(
        session_id = %session.id,
        user_id = open.user_id,
        course_id = open.course_id,
        action = "compliance_session_opened",
        "Compliance session opened"
    );
    Ok(session)
}

pub(crate) async fn get_session(pool: &PgPool, session_id: &str) -> LedgerResult<ComplianceSession> {
    require_id("session_id", session_id)?;
    compliance_sessions::find_by_id(pool, session_id)
        .await?
        .ok_or_else(|| LedgerError::session_not_found(session_id))
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SessionSummary {
    pub(crate) duration_seconds: i64,
    pub(crate) lessons_accessed: Vec<String>,
    pub(crate) video_progress: Option<serde_json::Value>,
}

pub(crate) async fn close_session(
    pool: &PgPool,
    compliance: &ComplianceSettings,
    session_id: &str,
    summary: SessionSummary,
) -> LedgerResult<ComplianceSession> {
    require_id("session_id", session_id)?;
    if summary.duration_seconds < 0 {
        return Err(LedgerError::Validation("duration_seconds must not be negative".into()));
    }

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;
    let session = compliance_sessions::lock(&mut *tx, session_id)
        .await?
        .ok_or_else(|| LedgerError::session_not_found(session_id))?;
    ensure_open(&session)?;

    let mut breaks = session.breaks.0.clone();
    if let Some(record) = open_break(&mut breaks) {
        let actual = elapsed_seconds(record.start_time, now);
        complete_break(record, actual, now, compliance.min_break_seconds);
    }
    let duration_seconds = clamp_duration(summary.duration_seconds, session.start_time, now);
    if duration_seconds < summary.duration_seconds {
        tracing::warn!(
            session_id,
            reported = summary.duration_seconds,
            clamped = duration_seconds,
            "Reported session duration exceeds wall clock"
        );
    }

    let closed = compliance_sessions::close(
        &mut *tx,
        session_id,
        CloseSession {
            end_time: now,
            duration_seconds,
            breaks: &breaks,
            lessons_accessed: &summary.lessons_accessed,
            video_progress: summary.video_progress,
        },
    )
    .await?
    .ok_or_else(|| {
        LedgerError::Conflict(format!("compliance session '{session_id}' is already closed"))
    })?;
    tx.commit().await?;

    metrics::record_compliance_session("closed");
    tracing::info!(
        session_id,
        user_id = %closed.user_id,
        course_id = %closed.course_id,
        duration_seconds,
        action = "compliance_session_closed",
        "Compliance session closed"
    );

    let daily = daily_study_time(pool, compliance, &closed.user_id, &closed.course_id).await?;
    if daily.locked_out {
        metrics::record_daily_lockout();
        tracing::warn!(
            user_id = %closed.user_id,
            course_id = %closed.course_id,
            daily_seconds = daily.seconds,
            action = "daily_lockout",
            "Daily study limit reached"
        );
    }
    Ok(closed)
}

pub(crate) async fn record_break(
    pool: &PgPool,
    session_id: &str,
    break_type: &str,
    scheduled_duration_seconds: i64,
) -> LedgerResult<BreakRecord> {
    require_id("session_id", session_id)?;
    require_id("break_type", break_type)?;
    if scheduled_duration_seconds <= 0 {
        return Err(LedgerError::Validation(
            "scheduled break duration must be positive".into(),
        ));
    }

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;
    let session = compliance_sessions::lock(&mut *tx, session_id)
        .await?
        .ok_or_else(|| LedgerError::session_not_found(session_id))?;
    ensure_open(&session)?;

    let mut breaks = session.breaks.0;
    if open_break(&mut breaks).is_some() {
        return Err(LedgerError::Conflict(format!(
            "compliance session '{session_id}' already has a break in progress"
        )));
    }
    let record = BreakRecord {
        break_type: break_type.trim().to_string(),
        scheduled_duration_seconds,
        start_time: now,
        end_time: None,
        actual_duration_seconds: None,
        state: BreakState::Initiated,
        compliance_flag: None,
    };
    breaks.push(record.clone());
    compliance_sessions::replace_breaks(&mut *tx, session_id, &breaks, now).await?;
    tx.commit().await?;

    tracing::info!(
        session_id,
        scheduled_duration_seconds,
        action = "break_started",
        "Break started"
    );
    Ok(record)
}

pub(crate) async fn end_break(
    pool: &PgPool,
    compliance: &ComplianceSettings,
    session_id: &str,
    actual_duration_seconds: i64,
) -> LedgerResult<BreakRecord> {
    require_id("session_id", session_id)?;
    if actual_duration_seconds < 0 {
        return Err(LedgerError::Validation("actual break duration must not be negative".into()));
    }

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;
    let session = compliance_sessions::lock(&mut *tx, session_id)
        .await?
        .ok_or_else(|| LedgerError::session_not_found(session_id))?;

    let mut breaks = session.breaks.0;
    let record = open_break(&mut breaks).ok_or_else(|| {
        LedgerError::Conflict(format!("compliance session '{session_id}' has no break in progress"))
    })?;
    let actual = clamp_duration(actual_duration_seconds, record.start_time, now);
    if actual < actual_duration_seconds {
        tracing::warn!(
            session_id,
            reported = actual_duration_seconds,
            clamped = actual,
            action = "break_duration_clamped",
            "Reported break duration exceeds wall clock"
        );
    }
    complete_break(record, actual, now, compliance.min_break_seconds);
    let completed = record.clone();

    compliance_sessions::replace_breaks(&mut *tx, session_id, &breaks, now).await?;
    tx.commit().await?;

    if completed.compliance_flag.is_some() {
        tracing::warn!(
            session_id,
            actual_duration_seconds = actual,
            min_break_seconds = compliance.min_break_seconds,
            action = "break_too_short",
            "Break shorter than required minimum"
        );
    } else {
        tracing::info!(
            session_id,
            actual_duration_seconds = actual,
            action = "break_ended",
            "Break ended"
        );
    }
    Ok(completed)
}

#[derive(Debug, Clone)]
pub(crate) enum CompletionEvent {
    Lesson {
        key: LessonKey,
        lesson_title: Option<String>,
        module_title: Option<String>,
        total_lessons: u32,
        video_progress: Option<serde_json::Value>,
    },
    Module {
        key: ModuleKey,
        module_title: Option<String>,
        lessons_completed: u32,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct CompletionOutcome {
    pub(crate) event: CompletionEventRecord,
    pub(crate) progress: Option<CourseProgress>,
    pub(crate) newly_completed: bool,
}

fn to_i32(field: &str, value: u32) -> LedgerResult<i32> {
    i32::try_from(value).map_err(|_| LedgerError::Validation(format!("{field} is too large")))
}

/// Appends a completion marker and updates progress counters in one transaction.
pub(crate) async fn record_completion_event(
    pool: &PgPool,
    session_id: &str,
    event: CompletionEvent,
) -> LedgerResult<CompletionOutcome> {
    require_id("session_id", session_id)?;
    if let CompletionEvent::Lesson { total_lessons: 0, .. } = event {
        return Err(LedgerError::Validation("total_lessons must be positive".into()));
    }

    let now = primitive_now_utc();
    let mut tx = pool.begin().await?;
    let session = compliance_sessions::lock(&mut *tx, session_id)
        .await?
        .ok_or_else(|| LedgerError::session_not_found(session_id))?;
    ensure_open(&session)?;
    let session_time_seconds = elapsed_seconds(session.start_time, now);
    let (user_id, course_id) = (session.user_id.as_str(), session.course_id.as_str());

    let outcome = match event {
        CompletionEvent::Lesson {
            key,
            lesson_title,
            module_title,
            total_lessons,
            video_progress,
        } => {
            let total_lessons = to_i32("total_lessons", total_lessons)?;
            let course =
                progress::ensure_and_lock_course(&mut *tx, user_id, course_id, total_lessons, now)
                    .await?;
            let lesson =
                progress::lock_lesson(&mut *tx, user_id, course_id, key.lesson_id()).await?;
            let newly_completed = !lesson.is_some_and(|lesson| lesson.completed);
            if course.completed_lessons + i32::from(newly_completed) > total_lessons {
                return Err(LedgerError::Validation(format!(
                    "completing lesson '{}' would exceed the course's {total_lessons} lessons",
                    key.lesson_id()
                )));
            }

            let course = progress::apply_lesson_completion(
                &mut *tx,
                user_id,
                course_id,
                total_lessons,
                newly_completed,
                now,
            )
            .await?;
            progress::upsert_lesson_completion(
                &mut *tx,
                progress::LessonCompletion {
                    user_id,
                    course_id,
                    lesson_id: key.lesson_id(),
                    module_id: key.module_id(),
                    session_id,
                    completed_at: now,
                },
            )
            .await?;

            let record = CompletionEventRecord {
                kind: CompletionKind::LessonCompletion,
                module_id: key.module_id().to_string(),
                module_title,
                lesson_id: Some(key.lesson_id().to_string()),
                lesson_title,
                lessons_completed: None,
                session_time_seconds,
                video_progress,
                completed_at: now,
            };
            compliance_sessions::append_completion_event(&mut *tx, session_id, &record, now)
                .await?;
            enrollments::mirror_progress(
                &mut *tx,
                user_id,
                course_id,
                course.overall_progress,
                now,
            )
            .await?;

            CompletionOutcome { event: record, progress: Some(course), newly_completed }
        }
        CompletionEvent::Module { key, module_title, lessons_completed } => {
            let lessons_completed = to_i32("lessons_completed", lessons_completed)?;
            progress::upsert_module_completion(
                &mut *tx,
                user_id,
                course_id,
                key.module_id(),
                lessons_completed,
                now,
            )
            .await?;

            let record = CompletionEventRecord {
                kind: CompletionKind::ModuleCompletion,
                module_id: key.module_id().to_string(),
                module_title,
                lesson_id: None,
                lesson_title: None,
                lessons_completed: Some(lessons_completed),
                session_time_seconds,
                video_progress: None,
                completed_at: now,
            };
            compliance_sessions::append_completion_event(&mut *tx, session_id, &record, now)
                .await?;

            CompletionOutcome { event: record, progress: None, newly_completed: true }
        }
    };
    tx.commit().await?;

    tracing::info!(
        session_id,
        user_id = %session.user_id,
        course_id = %session.course_id,
        kind = ?outcome.event.kind,
        module_id = %outcome.event.module_id,
        lesson_id = ?outcome.event.lesson_id,
        newly_completed = outcome.newly_completed,
        action = "completion_recorded",
        "Completion event recorded"
    );
    Ok(outcome)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DailyStudyTime {
    pub(crate) seconds: i64,
    pub(crate) max_daily_seconds: i64,
    pub(crate) locked_out: bool,
    pub(crate) day_start: PrimitiveDateTime,
    pub(crate) day_end: PrimitiveDateTime,
}

impl DailyStudyTime {
    pub(crate) fn remaining_seconds(&self) -> i64 {
        (self.max_daily_seconds - self.seconds).max(0)
    }
}

pub(crate) fn daily_status(
    seconds: i64,
    now: PrimitiveDateTime,
    compliance: &ComplianceSettings,
) -> DailyStudyTime {
    let (day_start, day_end) = local_day_bounds(now, compliance.utc_offset);
    DailyStudyTime {
        seconds,
        max_daily_seconds: compliance.max_daily_seconds,
        locked_out: is_locked_out(seconds, compliance.max_daily_seconds),
        day_start,
        day_end,
    }
}

pub(crate) async fn daily_study_time(
    pool: &PgPool,
    compliance: &ComplianceSettings,
    user_id: &str,
    course_id: &str,
) -> LedgerResult<DailyStudyTime> {
    require_id("user_id", user_id)?;
    require_id("course_id", course_id)?;

    let now = primitive_now_utc();
    let (day_start, day_end) = local_day_bounds(now, compliance.utc_offset);
    let seconds = compliance_sessions::completed_seconds_between(
        pool, user_id, course_id, day_start, day_end,
    )
    .await?;
    Ok(daily_status(seconds, now, compliance))
}

pub(crate) async fn is_daily_locked_out(
    pool: &PgPool,
    compliance: &ComplianceSettings,
    user_id: &str,
    course_id: &str,
) -> LedgerResult<bool> {
    Ok(daily_study_time(pool, compliance, user_id, course_id).await?.locked_out)
}

pub(crate) async fn session_history(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
    limit: i64,
) -> LedgerResult<Vec<ComplianceSession>> {
    require_id("user_id", user_id)?;
    require_id("course_id", course_id)?;
    Ok(compliance_sessions::list_recent(pool, user_id, course_id, limit).await?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StudyTime {
    pub(crate) total_seconds: i64,
    pub(crate) total_minutes: i64,
    pub(crate) session_count: i64,
}

pub(crate) async fn total_study_time(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
) -> LedgerResult<StudyTime> {
    require_id("user_id", user_id)?;
    require_id("course_id", course_id)?;

    let totals = compliance_sessions::completed_totals(pool, user_id, course_id).await?;
    Ok(StudyTime {
        total_seconds: totals.total_seconds,
        total_minutes: totals.total_seconds / 60,
        session_count: totals.session_count,
    })
}

pub(crate) async fn course_progress(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
) -> LedgerResult<Option<CourseProgress>> {
    require_id("user_id", user_id)?;
    require_id("course_id", course_id)?;
    Ok(progress::find_course(pool, user_id, course_id).await?)
}

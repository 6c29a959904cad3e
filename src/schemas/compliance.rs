use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::{
    BreakRecord, BreakState, ComplianceFlag, ComplianceSession, CompletionEventRecord,
    CompletionKind, CourseProgress,
};
use crate::db::types::ComplianceSessionStatus;
use crate::services::compliance_tracker::{
    CompletionEvent, CompletionOutcome, DailyStudyTime, LessonKey, ModuleKey, SessionSummary,
    StudyTime,
};
use crate::services::errors::LedgerResult;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SessionOpenRequest {
    #[serde(alias = "userId")]
    #[validate(length(min = 1, max = 128, message = "user_id must be 1-128 characters"))]
    pub(crate) user_id: String,
    #[serde(alias = "courseId")]
    #[validate(length(min = 1, max = 128, message = "course_id must be 1-128 characters"))]
    pub(crate) course_id: String,
    #[serde(default)]
    #[serde(alias = "ipAddress")]
    pub(crate) ip_address: Option<String>,
    #[serde(default)]
    #[serde(alias = "deviceInfo")]
    pub(crate) device_info: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct SessionCloseRequest {
    #[serde(alias = "duration", alias = "durationSeconds")]
    #[validate(range(min = 0, message = "duration_seconds must be non-negative"))]
    pub(crate) duration_seconds: i64,
    #[serde(default)]
    #[serde(alias = "lessonsAccessed")]
    pub(crate) lessons_accessed: Vec<String>,
    #[serde(default)]
    #[serde(alias = "videoProgress")]
    pub(crate) video_progress: Option<serde_json::Value>,
}

impl SessionCloseRequest {
    pub(crate) fn into_summary(self) -> SessionSummary {
        SessionSummary {
            duration_seconds: self.duration_seconds,
            lessons_accessed: self.lessons_accessed,
            video_progress: self.video_progress,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BreakStartRequest {
    #[serde(default = "default_break_type")]
    #[serde(alias = "breakType", alias = "type")]
    #[validate(length(min = 1, max = 64, message = "break_type must be 1-64 characters"))]
    pub(crate) break_type: String,
    #[serde(alias = "duration", alias = "scheduledDuration")]
    #[validate(range(min = 1, message = "scheduled_duration_seconds must be positive"))]
    pub(crate) scheduled_duration_seconds: i64,
}

fn default_break_type() -> String {
    "scheduled".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BreakEndRequest {
    #[serde(alias = "actualDuration", alias = "actualDurationSeconds")]
    #[validate(range(min = 0, message = "actual_duration_seconds must be non-negative"))]
    pub(crate) actual_duration_seconds: i64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum CompletionEventRequest {
    LessonCompletion {
        #[serde(alias = "moduleId")]
        module_id: String,
        #[serde(alias = "lessonId")]
        lesson_id: String,
        #[serde(default, alias = "lessonTitle")]
        lesson_title: Option<String>,
        #[serde(default, alias = "moduleTitle")]
        module_title: Option<String>,
        #[serde(alias = "totalLessons")]
        total_lessons: u32,
        #[serde(default, alias = "videoProgress")]
        video_progress: Option<serde_json::Value>,
    },
    ModuleCompletion {
        #[serde(alias = "moduleId")]
        module_id: String,
        #[serde(default, alias = "moduleTitle")]
        module_title: Option<String>,
        #[serde(alias = "lessonsCompleted")]
        lessons_completed: u32,
    },
}

impl CompletionEventRequest {
    pub(crate) fn into_event(self) -> LedgerResult<CompletionEvent> {
        match self {
            Self::LessonCompletion {
                module_id,
                lesson_id,
                lesson_title,
                module_title,
                total_lessons,
                video_progress,
            } => Ok(CompletionEvent::Lesson {
                key: LessonKey::parse(&module_id, &lesson_id)?,
                lesson_title,
                module_title,
                total_lessons,
                video_progress,
            }),
            Self::ModuleCompletion { module_id, module_title, lessons_completed } => {
                Ok(CompletionEvent::Module {
                    key: ModuleKey::parse(&module_id)?,
                    module_title,
                    lessons_completed,
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub(crate) limit: i64,
}

fn default_history_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub(crate) struct BreakResponse {
    pub(crate) break_type: String,
    pub(crate) scheduled_duration_seconds: i64,
    pub(crate) actual_duration_seconds: Option<i64>,
    pub(crate) start_time: String,
    pub(crate) end_time: Option<String>,
    pub(crate) status: BreakState,
    pub(crate) compliance_flag: Option<ComplianceFlag>,
}

impl BreakResponse {
    pub(crate) fn from_record(record: BreakRecord) -> Self {
        Self {
            break_type: record.break_type,
            scheduled_duration_seconds: record.scheduled_duration_seconds,
            actual_duration_seconds: record.actual_duration_seconds,
            start_time: format_primitive(record.start_time),
            end_time: format_optional(record.end_time),
            status: record.state,
            compliance_flag: record.compliance_flag,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CompletionEventResponse {
    #[serde(rename = "type")]
    pub(crate) kind: CompletionKind,
    pub(crate) module_id: String,
    pub(crate) module_title: Option<String>,
    pub(crate) lesson_id: Option<String>,
    pub(crate) lesson_title: Option<String>,
    pub(crate) lessons_completed: Option<i32>,
    pub(crate) session_time_seconds: i64,
    pub(crate) completed_at: String,
}

impl CompletionEventResponse {
    pub(crate) fn from_record(record: CompletionEventRecord) -> Self {
        Self {
            kind: record.kind,
            module_id: record.module_id,
            module_title: record.module_title,
            lesson_id: record.lesson_id,
            lesson_title: record.lesson_title,
            lessons_completed: record.lessons_completed,
            session_time_seconds: record.session_time_seconds,
            completed_at: format_primitive(record.completed_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ComplianceSessionResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) course_id: String,
    pub(crate) status: ComplianceSessionStatus,
    pub(crate) start_time: String,
    pub(crate) end_time: Option<String>,
    pub(crate) duration_seconds: i64,
    pub(crate) breaks: Vec<BreakResponse>,
    pub(crate) completion_events: Vec<CompletionEventResponse>,
    pub(crate) lessons_accessed: Vec<String>,
}

impl ComplianceSessionResponse {
    pub(crate) fn from_db(session: ComplianceSession) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id,
            course_id: session.course_id,
            status: session.status,
            start_time: format_primitive(session.start_time),
            end_time: format_optional(session.end_time),
            duration_seconds: session.duration_seconds,
            breaks: session.breaks.0.into_iter().map(BreakResponse::from_record).collect(),
            completion_events: session
                .completion_events
                .0
                .into_iter()
                .map(CompletionEventResponse::from_record)
                .collect(),
            lessons_accessed: session.lessons_accessed.0,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CourseProgressResponse {
    pub(crate) total_lessons: i32,
    pub(crate) completed_lessons: i32,
    pub(crate) overall_progress: i32,
}

impl CourseProgressResponse {
    pub(crate) fn from_db(progress: CourseProgress) -> Self {
        Self {
            total_lessons: progress.total_lessons,
            completed_lessons: progress.completed_lessons,
            overall_progress: progress.overall_progress,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CompletionResponse {
    pub(crate) event: CompletionEventResponse,
    pub(crate) progress: Option<CourseProgressResponse>,
    pub(crate) newly_completed: bool,
}

impl From<CompletionOutcome> for CompletionResponse {
    fn from(outcome: CompletionOutcome) -> Self {
        Self {
            event: CompletionEventResponse::from_record(outcome.event),
            progress: outcome.progress.map(CourseProgressResponse::from_db),
            newly_completed: outcome.newly_completed,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DailyStudyTimeResponse {
    pub(crate) seconds: i64,
    pub(crate) max_daily_seconds: i64,
    pub(crate) remaining_seconds: i64,
    pub(crate) locked_out: bool,
    pub(crate) day_start: String,
    pub(crate) day_end: String,
}

impl From<DailyStudyTime> for DailyStudyTimeResponse {
    fn from(daily: DailyStudyTime) -> Self {
        Self {
            seconds: daily.seconds,
            max_daily_seconds: daily.max_daily_seconds,
            remaining_seconds: daily.remaining_seconds(),
            locked_out: daily.locked_out,
            day_start: format_primitive(daily.day_start),
            day_end: format_primitive(daily.day_end),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LockoutResponse {
    pub(crate) locked_out: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct StudyTimeResponse {
    pub(crate) total_seconds: i64,
    pub(crate) total_minutes: i64,
    pub(crate) session_count: i64,
}

impl From<StudyTime> for StudyTimeResponse {
    fn from(total: StudyTime) -> Self {
        Self {
            total_seconds: total.total_seconds,
            total_minutes: total.total_minutes,
            session_count: total.session_count,
        }
    }
}

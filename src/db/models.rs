use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    AccessStatus, AttemptStatus, ComplianceSessionStatus, EnrollmentStatus, PaymentStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Enrollment {
    pub(crate) id: String,
    pub(crate) learner_id: String,
    pub(crate) course_id: String,
    pub(crate) learner_email: Option<String>,
    pub(crate) status: EnrollmentStatus,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    pub(crate) total_amount: Decimal,
    pub(crate) amount_paid: Decimal,
    pub(crate) amount_due: Decimal,
    pub(crate) upfront_amount: Decimal,
    pub(crate) remaining_amount: Decimal,
    pub(crate) parent_enrollment_id: Option<String>,
    pub(crate) is_component_of_bundle: bool,
    pub(crate) is_split_payment: bool,
    pub(crate) is_admin_enrollment: bool,
    pub(crate) progress: i32,
    pub(crate) certificate_generated: bool,
    pub(crate) certificate_generated_at: Option<PrimitiveDateTime>,
    pub(crate) enrolled_at: PrimitiveDateTime,
    pub(crate) last_accessed_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) version: i64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct PaymentApplication {
    pub(crate) id: String,
    pub(crate) enrollment_id: String,
    pub(crate) learner_id: String,
    pub(crate) course_id: String,
    pub(crate) requested_amount: Decimal,
    pub(crate) applied_amount: Decimal,
    pub(crate) surplus: Decimal,
    pub(crate) amount_paid_after: Decimal,
    pub(crate) amount_due_after: Decimal,
    pub(crate) payment_status: PaymentStatus,
    pub(crate) access_status: AccessStatus,
    pub(crate) enrollment_status: EnrollmentStatus,
    pub(crate) idempotency_key: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuizAttempt {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) course_id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: Option<String>,
    pub(crate) is_final_exam: bool,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) score: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) correct_answers: Option<i32>,
    pub(crate) total_questions: Option<i32>,
    pub(crate) answers: Option<Json<serde_json::Value>>,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) session_id: Option<String>,
    pub(crate) ip_address: Option<String>,
    pub(crate) device_info: Option<String>,
    pub(crate) manually_passed_at: Option<PrimitiveDateTime>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum BreakState {
    Initiated,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum ComplianceFlag {
    BreakTooShort,
}

/// One entry of a session's `breaks` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct BreakRecord {
    pub(crate) break_type: String,
    pub(crate) scheduled_duration_seconds: i64,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) actual_duration_seconds: Option<i64>,
    pub(crate) state: BreakState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) compliance_flag: Option<ComplianceFlag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum CompletionKind {
    LessonCompletion,
    ModuleCompletion,
}

/// One entry of a session's `completion_events` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CompletionEventRecord {
    pub(crate) kind: CompletionKind,
    pub(crate) module_id: String,
    #[serde(default)]
    pub(crate) module_title: Option<String>,
    #[serde(default)]
    pub(crate) lesson_id: Option<String>,
    #[serde(default)]
    pub(crate) lesson_title: Option<String>,
    #[serde(default)]
    pub(crate) lessons_completed: Option<i32>,
    /// Seconds since the session started when the learner completed the item.
    pub(crate) session_time_seconds: i64,
    #[serde(default)]
    pub(crate) video_progress: Option<serde_json::Value>,
    pub(crate) completed_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ComplianceSession {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) course_id: String,
    pub(crate) status: ComplianceSessionStatus,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) duration_seconds: i64,
    pub(crate) breaks: Json<Vec<BreakRecord>>,
    pub(crate) completion_events: Json<Vec<CompletionEventRecord>>,
    pub(crate) lessons_accessed: Json<Vec<String>>,
    pub(crate) video_progress: Option<Json<serde_json::Value>>,
    pub(crate) ip_address: Option<String>,
    pub(crate) device_info: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct CourseProgress {
    pub(crate) user_id: String,
    pub(crate) course_id: String,
    pub(crate) total_lessons: i32,
    pub(crate) completed_lessons: i32,
    pub(crate) overall_progress: i32,
    pub(crate) last_accessed_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct LessonProgress {
    pub(crate) user_id: String,
    pub(crate) course_id: String,
    pub(crate) lesson_id: String,
    pub(crate) module_id: Option<String>,
    pub(crate) completed: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) attempts: i32,
    pub(crate) last_session_id: Option<String>,
}

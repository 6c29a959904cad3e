use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::{format_optional, format_primitive};
use crate::db::models::QuizAttempt;
use crate::db::types::AttemptStatus;
use crate::services::quiz_governor::{FinalExamStatus, QuizScore, RetakeEligibility};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuizAttemptStart {
    #[serde(alias = "userId")]
    #[validate(length(min = 1, max = 128, message = "user_id must be 1-128 characters"))]
    pub(crate) user_id: String,
    #[serde(alias = "courseId")]
    #[validate(length(min = 1, max = 128, message = "course_id must be 1-128 characters"))]
    pub(crate) course_id: String,
    #[serde(alias = "quizId")]
    #[validate(length(min = 1, max = 128, message = "quiz_id must be 1-128 characters"))]
    pub(crate) quiz_id: String,
    #[serde(default)]
    #[serde(alias = "quizTitle")]
    pub(crate) quiz_title: Option<String>,
    #[serde(default)]
    #[serde(alias = "isFinalExam")]
    pub(crate) is_final_exam: bool,
    #[serde(default)]
    #[serde(alias = "sessionId")]
    pub(crate) session_id: Option<String>,
    #[serde(default)]
    #[serde(alias = "ipAddress")]
    pub(crate) ip_address: Option<String>,
    #[serde(default)]
    #[serde(alias = "deviceInfo")]
    pub(crate) device_info: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuizAttemptSubmit {
    #[serde(alias = "correctAnswers")]
    pub(crate) correct_answers: u32,
    #[serde(alias = "totalQuestions")]
    #[validate(range(max = 10_000, message = "total_questions must be at most 10000"))]
    pub(crate) total_questions: u32,
    #[serde(default)]
    pub(crate) answers: serde_json::Value,
    #[serde(default)]
    #[serde(alias = "timeSpent", alias = "timeSpentSeconds")]
    pub(crate) time_spent_seconds: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttemptsQuery {
    #[serde(default)]
    pub(crate) quiz_id: Option<String>,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RetakeQuery {
    #[serde(default)]
    pub(crate) quiz_id: Option<String>,
    #[serde(default)]
    pub(crate) final_exam: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoreQuery {
    #[serde(default)]
    pub(crate) quiz_id: Option<String>,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizAttemptResponse {
    pub(crate) id: String,
    pub(crate) user_id: String,
    pub(crate) course_id: String,
    pub(crate) quiz_id: String,
    pub(crate) quiz_title: Option<String>,
    pub(crate) is_final_exam: bool,
    pub(crate) status: AttemptStatus,
    pub(crate) score: Option<f64>,
    pub(crate) passed: Option<bool>,
    pub(crate) correct_answers: Option<i32>,
    pub(crate) total_questions: Option<i32>,
    pub(crate) time_spent_seconds: Option<i32>,
    pub(crate) started_at: String,
    pub(crate) completed_at: Option<String>,
    pub(crate) manually_passed_at: Option<String>,
}

impl QuizAttemptResponse {
    pub(crate) fn from_db(attempt: QuizAttempt) -> Self {
        Self {
            id: attempt.id,
            user_id: attempt.user_id,
            course_id: attempt.course_id,
            quiz_id: attempt.quiz_id,
            quiz_title: attempt.quiz_title,
            is_final_exam: attempt.is_final_exam,
            status: attempt.status,
            score: attempt.score,
            passed: attempt.passed,
            correct_answers: attempt.correct_answers,
            total_questions: attempt.total_questions,
            time_spent_seconds: attempt.time_spent_seconds,
            started_at: format_primitive(attempt.started_at),
            completed_at: format_optional(attempt.completed_at),
            manually_passed_at: format_optional(attempt.manually_passed_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RetakeResponse {
    pub(crate) can_retake: bool,
    pub(crate) attempts: i64,
    pub(crate) max_attempts: u32,
    pub(crate) remaining_attempts: i64,
    pub(crate) passed: bool,
}

impl From<RetakeEligibility> for RetakeResponse {
    fn from(eligibility: RetakeEligibility) -> Self {
        Self {
            can_retake: eligibility.can_retake,
            attempts: eligibility.attempts,
            max_attempts: eligibility.max_attempts,
            remaining_attempts: eligibility.remaining(),
            passed: eligibility.passed,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NumberedAttemptResponse {
    pub(crate) attempt_number: usize,
    #[serde(flatten)]
    pub(crate) attempt: QuizAttemptResponse,
}

#[derive(Debug, Serialize)]
pub(crate) struct FinalExamStatusResponse {
    pub(crate) total_attempts: usize,
    pub(crate) passed: bool,
    pub(crate) last_score: Option<f64>,
    pub(crate) can_retake: bool,
    pub(crate) attempts: Vec<NumberedAttemptResponse>,
}

impl From<FinalExamStatus> for FinalExamStatusResponse {
    fn from(status: FinalExamStatus) -> Self {
        Self {
            total_attempts: status.total_attempts,
            passed: status.passed,
            last_score: status.last_score,
            can_retake: status.can_retake,
            attempts: status
                .attempts
                .into_iter()
                .map(|numbered| NumberedAttemptResponse {
                    attempt_number: numbered.attempt_number,
                    attempt: QuizAttemptResponse::from_db(numbered.attempt),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct QuizScoreResponse {
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) score: Option<f64>,
    pub(crate) passed: bool,
    pub(crate) completed_at: Option<String>,
}

impl From<QuizScore> for QuizScoreResponse {
    fn from(score: QuizScore) -> Self {
        Self {
            attempt_id: score.attempt_id,
            quiz_id: score.quiz_id,
            score: score.score,
            passed: score.passed,
            completed_at: format_optional(score.completed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn submission_accepts_camel_case_fields() {
        let payload: QuizAttemptSubmit = serde_json::from_value(json!({
            "correctAnswers": 8,
            "totalQuestions": 10,
            "answers": { "q1": "b" },
            "timeSpent": 420
        }))
        .expect("payload");
        assert_eq!(payload.correct_answers, 8);
        assert_eq!(payload.total_questions, 10);
        assert_eq!(payload.time_spent_seconds, Some(420));
    }

    #[test]
    fn negative_counts_are_rejected_by_deserialization() {
        let result = serde_json::from_value::<QuizAttemptSubmit>(json!({
            "correct_answers": -1,
            "total_questions": 10
        }));
        assert!(result.is_err());
    }
}

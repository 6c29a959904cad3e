use sqlx::PgPool;
use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::config::QuizSettings;
use crate::core::metrics;
use crate::core::time::primitive_now_utc;
use crate::db::models::QuizAttempt;
use crate::repositories::locks;
use crate::repositories::quiz_attempts::{self, AttemptScope, CompleteAttempt, CreateAttempt};
use crate::services::errors::{require_id, LedgerError, LedgerResult};

/// `correct / total * 100`, or 0 for an empty quiz.
pub(crate) fn score(correct_answers: u32, total_questions: u32) -> f64 {
    if total_questions == 0 {
        return 0.0;
    }
    f64::from(correct_answers) * 100.0 / f64::from(total_questions)
}

pub(crate) fn is_passing(score: f64, passing_score: f64) -> bool {
    score >= passing_score
}

pub(crate) fn retake_allowed(attempts: i64, any_passed: bool, max_attempts: u32) -> bool {
    !any_passed && attempts < i64::from(max_attempts)
}

fn scope_for<'a>(quiz_id: &'a str, is_final_exam: bool) -> AttemptScope<'a> {
    if is_final_exam {
        AttemptScope::FinalExam
    } else {
        AttemptScope::Quiz(quiz_id)
    }
}

fn to_i32(field: &str, value: u32) -> LedgerResult<i32> {
    i32::try_from(value).map_err(|_| LedgerError::Validation(format!("{field} is too large")))
}

#[derive(Debug, Clone)]
pub(crate) struct QuizStart<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) quiz_id: &'a str,
    pub(crate) quiz_title: Option<&'a str>,
    pub(crate) is_final_exam: bool,
    pub(crate) session_id: Option<&'a str>,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) device_info: Option<&'a str>,
}

pub(crate) async fn start_attempt(
    pool: &PgPool,
    quiz: &QuizSettings,
    start: QuizStart<'_>,
) -> LedgerResult<QuizAttempt> {
    require_id("user_id", start.user_id)?;
    require_id("course_id", start.course_id)?;
    require_id("quiz_id", start.quiz_id)?;

    let scope = scope_for(start.quiz_id, start.is_final_exam);
    let mut tx = pool.begin().await?;
    locks::advisory_xact_lock(&mut *tx, &scope.lock_key(start.user_id, start.course_id)).await?;

    let stats =
        quiz_attempts::scope_stats(&mut *tx, start.user_id, start.course_id, scope).await?;
    if !retake_allowed(stats.attempts, stats.passed, quiz.max_attempts) {
        tracing::info!(
            user_id = start.user_id,
            course_id = start.course_id,
            quiz_id = start.quiz_id,
            attempts = stats.attempts,
            passed = stats.passed,
            action = "quiz_start_rejected",
            "Retake limit reached"
        );
        metrics::record_quiz_attempt("rejected");
        return Err(LedgerError::RetakeLimitReached {
            user_id: start.user_id.to_string(),
            course_id: start.course_id.to_string(),
            scope: scope.label(),
        });
    }

    let attempt_id = Uuid::new_v4().to_string();
    let attempt = quiz_attempts::create(
        &mut *tx,
        CreateAttempt {
            id: &attempt_id,
            user_id: start.user_id,
            course_id: start.course_id,
            quiz_id: start.quiz_id,
            quiz_title: start.quiz_title,
            is_final_exam: start.is_final_exam,
            session_id: start.session_id,
            ip_address: start.ip_address,
            device_info: start.device_info,
            started_at: primitive_now_utc(),
        },
    )
    .await?;
    tx.commit().await?;

    metrics::record_quiz_attempt("started");
    tracing::info!(
        attempt_id = %attempt.id,
        user_id = start.user_id,
        course_id = start.course_id,
        quiz_id = start.quiz_id,
        is_final_exam = start.is_final_exam,
        attempt_number = stats.attempts + 1,
        action = "quiz_started",
        "Quiz attempt started"
    );
    Ok(attempt)
}

pub(crate) async fn get_attempt(pool: &PgPool, attempt_id: &str) -> LedgerResult<QuizAttempt> {
    require_id("attempt_id", attempt_id)?;
    quiz_attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or_else(|| LedgerError::attempt_not_found(attempt_id))
}

#[derive(Debug, Clone)]
pub(crate) struct AttemptSubmission {
    pub(crate) correct_answers: u32,
    pub(crate) total_questions: u32,
    pub(crate) answers: serde_json::Value,
    pub(crate) time_spent_seconds: Option<u32>,
}

pub(crate) async fn submit_attempt(
    pool: &PgPool,
    quiz: &QuizSettings,
    attempt_id: &str,
    submission: AttemptSubmission,
) -> LedgerResult<QuizAttempt> {
    require_id("attempt_id", attempt_id)?;
    if submission.correct_answers > submission.total_questions {
        return Err(LedgerError::Validation(format!(
            "correct answers ({}) exceed total questions ({})",
            submission.correct_answers, submission.total_questions
        )));
    }
    let correct_answers = to_i32("correct_answers", submission.correct_answers)?;
    let total_questions = to_i32("total_questions", submission.total_questions)?;
    let time_spent_seconds = submission
        .time_spent_seconds
        .map(|seconds| to_i32("time_spent_seconds", seconds))
        .transpose()?;

    let existing = quiz_attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or_else(|| LedgerError::attempt_not_found(attempt_id))?;

    let score = score(submission.correct_answers, submission.total_questions);
    let passed = is_passing(score, quiz.passing_score);

    let completed = quiz_attempts::complete(
        pool,
        attempt_id,
        CompleteAttempt {
            score,
            passed,
            correct_answers,
            total_questions,
            answers: submission.answers,
            time_spent_seconds,
            completed_at: primitive_now_utc(),
        },
    )
    .await?
    .ok_or_else(|| {
        LedgerError::Conflict(format!("quiz attempt '{attempt_id}' was already submitted"))
    })?;

    metrics::record_quiz_attempt(if passed { "passed" } else { "failed" });
    tracing::info!(
        attempt_id,
        user_id = %existing.user_id,
        course_id = %existing.course_id,
        quiz_id = %existing.quiz_id,
        score,
        passed,
        action = "quiz_submitted",
        "Quiz attempt submitted"
    );
    Ok(completed)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RetakeEligibility {
    pub(crate) attempts: i64,
    pub(crate) passed: bool,
    pub(crate) max_attempts: u32,
    pub(crate) can_retake: bool,
}

impl RetakeEligibility {
    pub(crate) fn remaining(&self) -> i64 {
        if self.passed {
            return 0;
        }
        (i64::from(self.max_attempts) - self.attempts).max(0)
    }
}

pub(crate) async fn can_retake(
    pool: &PgPool,
    quiz: &QuizSettings,
    user_id: &str,
    course_id: &str,
    quiz_id: &str,
    is_final_exam: bool,
) -> LedgerResult<RetakeEligibility> {
    require_id("user_id", user_id)?;
    require_id("course_id", course_id)?;
    if !is_final_exam {
        require_id("quiz_id", quiz_id)?;
    }

    let stats =
        quiz_attempts::scope_stats(pool, user_id, course_id, scope_for(quiz_id, is_final_exam))
            .await?;
    Ok(RetakeEligibility {
        attempts: stats.attempts,
        passed: stats.passed,
        max_attempts: quiz.max_attempts,
        can_retake: retake_allowed(stats.attempts, stats.passed, quiz.max_attempts),
    })
}

#[derive(Debug, Clone)]
pub(crate) struct NumberedAttempt {
    pub(crate) attempt_number: usize,
    pub(crate) attempt: QuizAttempt,
}

#[derive(Debug, Clone)]
pub(crate) struct FinalExamStatus {
    pub(crate) total_attempts: usize,
    pub(crate) passed: bool,
    pub(crate) last_score: Option<f64>,
    pub(crate) can_retake: bool,
    pub(crate) attempts: Vec<NumberedAttempt>,
}

/// Numbers newest-first attempts chronologically, the oldest being attempt 1.
pub(crate) fn number_attempts(newest_first: Vec<QuizAttempt>) -> Vec<NumberedAttempt> {
    let total = newest_first.len();
    newest_first
        .into_iter()
        .enumerate()
        .map(|(index, attempt)| NumberedAttempt { attempt_number: total - index, attempt })
        .collect()
}

pub(crate) fn summarize_final_exam(
    newest_first: Vec<QuizAttempt>,
    max_attempts: u32,
) -> FinalExamStatus {
    let total_attempts = newest_first.len();
    let passed = newest_first.iter().any(|attempt| attempt.passed == Some(true));
    let last_score = newest_first.first().and_then(|attempt| attempt.score);
    let attempt_count = i64::try_from(total_attempts).unwrap_or(i64::MAX);

    FinalExamStatus {
        total_attempts,
        passed,
        last_score,
        can_retake: retake_allowed(attempt_count, passed, max_attempts),
        attempts: number_attempts(newest_first),
    }
}

pub(crate) async fn final_exam_status(
    pool: &PgPool,
    quiz: &QuizSettings,
    user_id: &str,
    course_id: &str,
) -> LedgerResult<FinalExamStatus> {
    require_id("user_id", user_id)?;
    require_id("course_id", course_id)?;

    let attempts =
        quiz_attempts::list_in_scope(pool, user_id, course_id, AttemptScope::FinalExam, 1000)
            .await?;
    Ok(summarize_final_exam(attempts, quiz.max_attempts))
}

pub(crate) async fn mark_passed(pool: &PgPool, attempt_id: &str) -> LedgerResult<QuizAttempt> {
    require_id("attempt_id", attempt_id)?;

    quiz_attempts::find_by_id(pool, attempt_id)
        .await?
        .ok_or_else(|| LedgerError::attempt_not_found(attempt_id))?;

    let attempt = quiz_attempts::mark_passed(pool, attempt_id, primitive_now_utc())
        .await?
        .ok_or_else(|| {
            LedgerError::Conflict(format!(
                "quiz attempt '{attempt_id}' is still in progress and cannot be marked passed"
            ))
        })?;

    tracing::warn!(
        attempt_id,
        user_id = %attempt.user_id,
        course_id = %attempt.course_id,
        action = "quiz_marked_passed",
        "Quiz attempt manually marked as passed"
    );
    Ok(attempt)
}

pub(crate) async fn list_attempts(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
    quiz_id: Option<&str>,
    limit: i64,
) -> LedgerResult<Vec<QuizAttempt>> {
    require_id("user_id", user_id)?;
    require_id("course_id", course_id)?;

    let attempts = match quiz_id {
        Some(quiz_id) => {
            quiz_attempts::list_in_scope(pool, user_id, course_id, AttemptScope::Quiz(quiz_id), limit)
                .await?
        }
        None => quiz_attempts::list_for_course(pool, user_id, course_id, limit).await?,
    };
    Ok(attempts)
}

#[derive(Debug, Clone)]
pub(crate) struct QuizScore {
    pub(crate) attempt_id: String,
    pub(crate) quiz_id: String,
    pub(crate) score: Option<f64>,
    pub(crate) passed: bool,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
}

/// Summary of the most recent attempt, if any.
pub(crate) async fn quiz_score(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
    quiz_id: Option<&str>,
) -> LedgerResult<Option<QuizScore>> {
    let latest = list_attempts(pool, user_id, course_id, quiz_id, 1).await?;
    Ok(latest.into_iter().next().map(|attempt| QuizScore {
        attempt_id: attempt.id,
        quiz_id: attempt.quiz_id,
        score: attempt.score,
        passed: attempt.passed.unwrap_or(false),
        completed_at: attempt.completed_at,
    }))
}

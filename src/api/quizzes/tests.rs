use crate::test_support;
use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

const USER: &str = "learner-001";
const COURSE: &str = "online-course";

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(test_support::json_request(method, uri, None, body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

async fn start(app: &Router, quiz_id: &str, is_final_exam: bool) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        "/api/v1/quiz-attempts",
        Some(json!({
            "userId": USER,
            "courseId": COURSE,
            "quizId": quiz_id,
            "isFinalExam": is_final_exam
        })),
    )
    .await
}

async fn submit(app: &Router, attempt_id: &str, correct: u32, total: u32) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/v1/quiz-attempts/{attempt_id}/submit"),
        Some(json!({
            "correctAnswers": correct,
            "totalQuestions": total,
            "answers": { "q1": "b" },
            "timeSpent": 420
        })),
    )
    .await
}

#[tokio::test]
async fn passing_submission_scores_eighty() {
    let ctx = test_support::setup_test_context().await;

    let (status, started) = start(&ctx.app, "module-1-quiz", false).await;
    assert_eq!(status, StatusCode::CREATED, "response: {started}");
    assert_eq!(started["status"], "in_progress");
    let attempt_id = started["id"].as_str().expect("attempt id").to_string();

    let (status, submitted) = submit(&ctx.app, &attempt_id, 8, 10).await;
    assert_eq!(status, StatusCode::OK, "response: {submitted}");
    assert_eq!(submitted["status"], "completed");
    assert_eq!(submitted["score"].as_f64(), Some(80.0));
    assert_eq!(submitted["passed"], true);
    assert_eq!(submitted["time_spent_seconds"], 420);

    let (status, again) = submit(&ctx.app, &attempt_id, 10, 10).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {again}");

    let (status, score) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/quizzes/learners/{USER}/courses/{COURSE}/score?quiz_id=module-1-quiz"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {score}");
    assert_eq!(score["attempt_id"], attempt_id.as_str());
    assert_eq!(score["passed"], true);

    let (_, retake) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/quizzes/learners/{USER}/courses/{COURSE}/retake?quiz_id=module-1-quiz"),
        None,
    )
    .await;
    assert_eq!(retake["can_retake"], false);
    assert_eq!(retake["passed"], true);
}

#[tokio::test]
async fn three_failed_final_exams_exhaust_retakes() {
    let ctx = test_support::setup_test_context().await;

    for _ in 0..3 {
        let (status, started) = start(&ctx.app, "final-exam", true).await;
        assert_eq!(status, StatusCode::CREATED, "response: {started}");
        let attempt_id = started["id"].as_str().expect("attempt id").to_string();
        let (status, submitted) = submit(&ctx.app, &attempt_id, 5, 10).await;
        assert_eq!(status, StatusCode::OK, "response: {submitted}");
        assert_eq!(submitted["passed"], false);
    }

    let (status, retake) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/quizzes/learners/{USER}/courses/{COURSE}/retake?final_exam=true"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {retake}");
    assert_eq!(retake["can_retake"], false);
    assert_eq!(retake["attempts"], 3);
    assert_eq!(retake["remaining_attempts"], 0);

    let (status, body) = start(&ctx.app, "final-exam", true).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");

    let (status, summary) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/quizzes/learners/{USER}/courses/{COURSE}/final-exam"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {summary}");
    assert_eq!(summary["total_attempts"], 3);
    assert_eq!(summary["passed"], false);
    assert_eq!(summary["last_score"].as_f64(), Some(50.0));
    let numbers: Vec<u64> = summary["attempts"]
        .as_array()
        .expect("attempts")
        .iter()
        .filter_map(|attempt| attempt["attempt_number"].as_u64())
        .collect();
    assert_eq!(numbers, vec![3, 2, 1]);
}

#[tokio::test]
async fn final_exam_limit_does_not_block_module_quizzes() {
    let ctx = test_support::setup_test_context().await;

    for _ in 0..3 {
        let (_, started) = start(&ctx.app, "final-exam", true).await;
        let attempt_id = started["id"].as_str().expect("attempt id").to_string();
        submit(&ctx.app, &attempt_id, 1, 10).await;
    }

    let (status, started) = start(&ctx.app, "module-2-quiz", false).await;
    assert_eq!(status, StatusCode::CREATED, "response: {started}");
}

#[tokio::test]
async fn admin_override_marks_attempt_passed() {
    let ctx = test_support::setup_test_context().await;

    let (_, started) = start(&ctx.app, "final-exam", true).await;
    let attempt_id = started["id"].as_str().expect("attempt id").to_string();
    submit(&ctx.app, &attempt_id, 4, 10).await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            &format!("/api/v1/quiz-attempts/{attempt_id}/mark-passed"),
            Some(test_support::TEST_ADMIN_KEY),
            None,
        ))
        .await
        .expect("mark passed");
    let status = response.status();
    let marked = test_support::read_json(response).await;
    assert_eq!(status, StatusCode::OK, "response: {marked}");
    assert_eq!(marked["passed"], true);
    assert!(marked["manually_passed_at"].is_string());

    let (_, summary) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/quizzes/learners/{USER}/courses/{COURSE}/final-exam"),
        None,
    )
    .await;
    assert_eq!(summary["passed"], true);
    assert_eq!(summary["can_retake"], false);
}

#[tokio::test]
async fn submission_rejects_more_correct_than_total() {
    let ctx = test_support::setup_test_context().await;

    let (_, started) = start(&ctx.app, "module-1-quiz", false).await;
    let attempt_id = started["id"].as_str().expect("attempt id").to_string();

    let (status, body) = submit(&ctx.app, &attempt_id, 11, 10).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (status, body) = send(&ctx.app, Method::GET, "/api/v1/quiz-attempts/missing-id", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "response: {body}");
}

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

async fn open_session(app: &Router) -> String {
    let (status, opened) = send(
        app,
        Method::POST,
        "/api/v1/compliance/sessions",
        Some(json!({ "userId": USER, "courseId": COURSE, "ipAddress": "203.0.113.7" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {opened}");
    assert_eq!(opened["status"], "open");
    opened["id"].as_str().expect("session id").to_string()
}

async fn close_session(app: &Router, session_id: &str, duration: i64) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/v1/compliance/sessions/{session_id}/close"),
        Some(json!({ "duration": duration, "lessonsAccessed": ["m1/l1"] })),
    )
    .await
}

#[tokio::test]
async fn short_break_is_flagged() {
    let ctx = test_support::setup_test_context().await;
    let session_id = open_session(&ctx.app).await;

    let (status, started) = send(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/compliance/sessions/{session_id}/breaks"),
        Some(json!({ "duration": 600 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {started}");
    assert_eq!(started["status"], "initiated");

    let (status, body) = send(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/compliance/sessions/{session_id}/breaks"),
        Some(json!({ "duration": 600 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");

    let (status, ended) = send(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/compliance/sessions/{session_id}/breaks/end"),
        Some(json!({ "actualDuration": 300 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {ended}");
    assert_eq!(ended["status"], "completed");
    assert_eq!(ended["compliance_flag"], "BREAK_TOO_SHORT");

    let (status, body) = send(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/compliance/sessions/{session_id}/breaks/end"),
        Some(json!({ "actualDuration": 700 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");

    let (_, session) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/compliance/sessions/{session_id}"),
        None,
    )
    .await;
    assert_eq!(session["breaks"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn break_reported_longer_than_elapsed_is_still_flagged() {
    let ctx = test_support::setup_test_context().await;
    let session_id = open_session(&ctx.app).await;
    let breaks_uri = format!("/api/v1/compliance/sessions/{session_id}/breaks");

    let (status, started) =
        send(&ctx.app, Method::POST, &breaks_uri, Some(json!({ "duration": 600 }))).await;
    assert_eq!(status, StatusCode::CREATED, "response: {started}");

    let (status, ended) = send(
        &ctx.app,
        Method::POST,
        &format!("{breaks_uri}/end"),
        Some(json!({ "actualDuration": 900 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {ended}");
    assert_eq!(ended["compliance_flag"], "BREAK_TOO_SHORT");
    let actual = ended["actual_duration_seconds"].as_i64().expect("actual duration");
    assert!((0..60).contains(&actual), "actual {actual}");
}

#[tokio::test]
async fn closed_session_cannot_close_again() {
    let ctx = test_support::setup_test_context().await;
    let session_id = open_session(&ctx.app).await;
    test_support::backdate_session(ctx.state.db(), &session_id, 120).await;

    let (status, closed) = close_session(&ctx.app, &session_id, 60).await;
    assert_eq!(status, StatusCode::OK, "response: {closed}");
    assert_eq!(closed["status"], "completed");
    assert_eq!(closed["duration_seconds"], 60);
    assert_eq!(closed["lessons_accessed"], json!(["m1/l1"]));

    let (status, body) = close_session(&ctx.app, &session_id, 60).await;
    assert_eq!(status, StatusCode::CONFLICT, "response: {body}");
}

#[tokio::test]
async fn reported_duration_is_clamped_to_wall_clock() {
    let ctx = test_support::setup_test_context().await;
    let session_id = open_session(&ctx.app).await;
    test_support::backdate_session(ctx.state.db(), &session_id, 300).await;

    let (status, closed) = close_session(&ctx.app, &session_id, 36_000).await;
    assert_eq!(status, StatusCode::OK, "response: {closed}");
    let duration = closed["duration_seconds"].as_i64().expect("duration");
    assert!((300..=360).contains(&duration), "duration {duration}");
}

#[tokio::test]
async fn lesson_completions_advance_course_progress() {
    let ctx = test_support::setup_test_context().await;
    let session_id = open_session(&ctx.app).await;
    let uri = format!("/api/v1/compliance/sessions/{session_id}/completions");

    let lesson = |lesson_id: &str| {
        json!({
            "type": "lesson_completion",
            "moduleId": "module-1",
            "lessonId": lesson_id,
            "lessonTitle": "Right of way",
            "totalLessons": 4
        })
    };

    let (status, first) = send(&ctx.app, Method::POST, &uri, Some(lesson("lesson-1"))).await;
    assert_eq!(status, StatusCode::CREATED, "response: {first}");
    assert_eq!(first["newly_completed"], true);
    assert_eq!(first["progress"]["completed_lessons"], 1);
    assert_eq!(first["progress"]["overall_progress"], 25);

    let (_, repeat) = send(&ctx.app, Method::POST, &uri, Some(lesson("lesson-1"))).await;
    assert_eq!(repeat["newly_completed"], false);
    assert_eq!(repeat["progress"]["completed_lessons"], 1);

    let (_, second) = send(&ctx.app, Method::POST, &uri, Some(lesson("lesson-2"))).await;
    assert_eq!(second["progress"]["completed_lessons"], 2);
    assert_eq!(second["progress"]["overall_progress"], 50);

    let (status, module) = send(
        &ctx.app,
        Method::POST,
        &uri,
        Some(json!({ "type": "module_completion", "moduleId": "module-1", "lessonsCompleted": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {module}");
    assert_eq!(module["event"]["type"], "module_completion");

    let (status, body) = send(
        &ctx.app,
        Method::POST,
        &uri,
        Some(json!({
            "type": "lesson_completion",
            "moduleId": "../module-1",
            "lessonId": "lesson-3",
            "totalLessons": 4
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "response: {body}");

    let (_, session) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/compliance/sessions/{session_id}"),
        None,
    )
    .await;
    assert_eq!(session["completion_events"].as_array().map(Vec::len), Some(4));

    let (status, progress) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/compliance/learners/{USER}/courses/{COURSE}/progress"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {progress}");
    assert_eq!(progress["total_lessons"], 4);
    assert_eq!(progress["completed_lessons"], 2);
}

#[tokio::test]
async fn two_long_sessions_lock_out_the_day() {
    let offset = test_support::midday_utc_offset();
    let ctx =
        test_support::setup_test_context_with_env(&[("COMPLIANCE_UTC_OFFSET", offset)]).await;

    let morning = open_session(&ctx.app).await;
    test_support::backdate_session(ctx.state.db(), &morning, 16_300).await;
    let (status, closed) = close_session(&ctx.app, &morning, 9_000).await;
    assert_eq!(status, StatusCode::OK, "response: {closed}");

    let daily_uri = format!("/api/v1/compliance/learners/{USER}/courses/{COURSE}/daily");
    let (_, daily) = send(&ctx.app, Method::GET, &daily_uri, None).await;
    assert_eq!(daily["seconds"], 9_000);
    assert_eq!(daily["locked_out"], false);
    assert_eq!(daily["remaining_seconds"], 5_400);

    let evening = open_session(&ctx.app).await;
    test_support::backdate_session(ctx.state.db(), &evening, 7_300).await;
    let (status, closed) = close_session(&ctx.app, &evening, 7_200).await;
    assert_eq!(status, StatusCode::OK, "response: {closed}");

    let (status, daily) = send(&ctx.app, Method::GET, &daily_uri, None).await;
    assert_eq!(status, StatusCode::OK, "response: {daily}");
    assert_eq!(daily["seconds"], 16_200);
    assert_eq!(daily["max_daily_seconds"], 14_400);
    assert_eq!(daily["locked_out"], true);
    assert_eq!(daily["remaining_seconds"], 0);

    let (_, lockout) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/compliance/learners/{USER}/courses/{COURSE}/lockout"),
        None,
    )
    .await;
    assert_eq!(lockout["locked_out"], true);

    let (_, total) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/compliance/learners/{USER}/courses/{COURSE}/total"),
        None,
    )
    .await;
    assert_eq!(total["total_seconds"], 16_200);
    assert_eq!(total["total_minutes"], 270);
    assert_eq!(total["session_count"], 2);

    let (_, history) = send(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/compliance/learners/{USER}/courses/{COURSE}/sessions?limit=1"),
        None,
    )
    .await;
    assert_eq!(history.as_array().map(Vec::len), Some(1));
}

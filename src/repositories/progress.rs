use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{CourseProgress, LessonProgress};

const COURSE_COLUMNS: &str = "\
    user_id, course_id, total_lessons, completed_lessons, overall_progress, \
    last_accessed_at, updated_at";

const LESSON_COLUMNS: &str = "\
    user_id, course_id, lesson_id, module_id, completed, completed_at, attempts, last_session_id";

pub(crate) async fn find_course(
    pool: &PgPool,
    user_id: &str,
    course_id: &str,
) -> Result<Option<CourseProgress>, sqlx::Error> {
    sqlx::query_as::<_, CourseProgress>(&format!(
        "SELECT {COURSE_COLUMNS} FROM course_progress WHERE user_id = $1 AND course_id = $2"
    ))
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await
}

/// Creates the course row if missing and row-locks it.
pub(crate) async fn ensure_and_lock_course(
    conn: &mut sqlx::PgConnection,
    user_id: &str,
    course_id: &str,
    total_lessons: i32,
    now: PrimitiveDateTime,
) -> Result<CourseProgress, sqlx::Error> {
    sqlx::query(
        "INSERT INTO course_progress (
            user_id, course_id, total_lessons, completed_lessons, overall_progress,
            last_accessed_at, updated_at
        ) VALUES ($1,$2,$3,0,0,$4,$4)
        ON CONFLICT (user_id, course_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(total_lessons)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query_as::<_, CourseProgress>(&format!(
        "SELECT {COURSE_COLUMNS} FROM course_progress
         WHERE user_id = $1 AND course_id = $2
         FOR UPDATE"
    ))
    .bind(user_id)
    .bind(course_id)
    .fetch_one(&mut *conn)
    .await
}

/// Sets the lesson total and optionally counts one more completed lesson, recomputing the
/// rounded percentage.
pub(crate) async fn apply_lesson_completion(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    course_id: &str,
    total_lessons: i32,
    newly_completed: bool,
    now: PrimitiveDateTime,
) -> Result<CourseProgress, sqlx::Error> {
    sqlx::query_as::<_, CourseProgress>(&format!(
        "UPDATE course_progress
         SET total_lessons = $3,
             completed_lessons = completed_lessons + $4,
             overall_progress = CASE
                 WHEN $3 > 0 THEN LEAST(100, ROUND((completed_lessons + $4) * 100.0 / $3))::INTEGER
                 ELSE 0
             END,
             last_accessed_at = $5,
             updated_at = $5
         WHERE user_id = $1 AND course_id = $2
         RETURNING {COURSE_COLUMNS}"
    ))
    .bind(user_id)
    .bind(course_id)
    .bind(total_lessons)
    .bind(i32::from(newly_completed))
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn lock_lesson(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    course_id: &str,
    lesson_id: &str,
) -> Result<Option<LessonProgress>, sqlx::Error> {
    sqlx::query_as::<_, LessonProgress>(&format!(
        "SELECT {LESSON_COLUMNS} FROM lesson_progress
         WHERE user_id = $1 AND course_id = $2 AND lesson_id = $3
         FOR UPDATE"
    ))
    .bind(user_id)
    .bind(course_id)
    .bind(lesson_id)
    .fetch_optional(executor)
    .await
}

pub(crate) struct LessonCompletion<'a> {
    pub(crate) user_id: &'a str,
    pub(crate) course_id: &'a str,
    pub(crate) lesson_id: &'a str,
    pub(crate) module_id: &'a str,
    pub(crate) session_id: &'a str,
    pub(crate) completed_at: PrimitiveDateTime,
}

pub(crate) async fn upsert_lesson_completion(
    executor: impl sqlx::PgExecutor<'_>,
    params: LessonCompletion<'_>,
) -> Result<LessonProgress, sqlx::Error> {
    sqlx::query_as::<_, LessonProgress>(&format!(
        "INSERT INTO lesson_progress (
            user_id, course_id, lesson_id, module_id, completed, completed_at, attempts,
            last_session_id
        ) VALUES ($1,$2,$3,$4,TRUE,$5,1,$6)
        ON CONFLICT (user_id, course_id, lesson_id) DO UPDATE
        SET completed = TRUE,
            completed_at = COALESCE(lesson_progress.completed_at, EXCLUDED.completed_at),
            attempts = lesson_progress.attempts + 1,
            module_id = COALESCE(EXCLUDED.module_id, lesson_progress.module_id),
            last_session_id = EXCLUDED.last_session_id
        RETURNING {LESSON_COLUMNS}"
    ))
    .bind(params.user_id)
    .bind(params.course_id)
    .bind(params.lesson_id)
    .bind(params.module_id)
    .bind(params.completed_at)
    .bind(params.session_id)
    .fetch_one(executor)
    .await
}

pub(crate) async fn upsert_module_completion(
    executor: impl sqlx::PgExecutor<'_>,
    user_id: &str,
    course_id: &str,
    module_id: &str,
    lessons_completed: i32,
    completed_at: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO module_progress (
            user_id, course_id, module_id, completed, completed_at, lessons_completed
        ) VALUES ($1,$2,$3,TRUE,$4,$5)
        ON CONFLICT (user_id, course_id, module_id) DO UPDATE
        SET completed = TRUE,
            completed_at = COALESCE(module_progress.completed_at, EXCLUDED.completed_at),
            lessons_completed = GREATEST(module_progress.lessons_completed, EXCLUDED.lessons_completed)",
    )
    .bind(user_id)
    .bind(course_id)
    .bind(module_id)
    .bind(completed_at)
    .bind(lessons_completed)
    .execute(executor)
    .await?;
    Ok(())
}

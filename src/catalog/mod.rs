pub mod fallback;

use tracing::warn;

use crate::api::ApiClient;
use crate::error::AppError;
use crate::models::{Course, Lesson};

/// Catalog reads never hard-fail: any fetch error is absorbed by the
/// bundled dataset so navigation keeps working offline. Availability over
/// freshness, for a read-mostly catalog.
pub async fn get_all_courses(api: &dyn ApiClient) -> Vec<Course> {
    match api.fetch_courses().await {
        Ok(courses) => courses,
        Err(e) => {
            warn!("course fetch failed, serving bundled catalog: {}", e);
            fallback::courses()
        }
    }
}

/// A course missing even from the fallback set is a real `NotFound`,
/// surfaced to the caller rather than retried.
pub async fn get_course_by_id(api: &dyn ApiClient, id: i64) -> Result<Course, AppError> {
    get_all_courses(api)
        .await
        .into_iter()
        .find(|course| course.id == id)
        .ok_or(AppError::NotFound)
}

pub async fn get_lessons_by_course(api: &dyn ApiClient, course_id: i64) -> Vec<Lesson> {
    match api.fetch_lessons(course_id).await {
        Ok(lessons) => lessons,
        Err(e) => {
            warn!(
                "lesson fetch failed for course {}, serving bundled catalog: {}",
                course_id, e
            );
            fallback::lessons_for_course(course_id)
        }
    }
}

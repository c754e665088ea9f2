use serde::{Deserialize, Serialize};

use crate::models::{Difficulty, Lesson};

/// Lesson as the REST API returns it (snake_case field names). Ids are
/// typed `i64` so a string-typed id in the payload fails deserialization
/// loudly instead of silently becoming zero.
#[derive(Debug, Deserialize)]
pub struct LessonWire {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub course_id: Option<i64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub lesson_order: Option<i64>,
}

impl LessonWire {
    /// Field-by-field translation into the internal model. `course_id` may
    /// be omitted on the wire; the course the lessons were requested for is
    /// authoritative in that case.
    pub fn into_lesson(self, requested_course_id: i64) -> Lesson {
        Lesson {
            id: self.id,
            course_id: self.course_id.unwrap_or(requested_course_id),
            title: self.title,
            description: self.description,
            content: self.content,
            difficulty: self.difficulty,
            image_url: self.image_url,
            order: self.lesson_order.unwrap_or(0),
        }
    }
}

/// Body of POST /progress/sync.
#[derive(Debug, Serialize)]
pub struct ProgressUploadRequest<'a> {
    pub lessons: &'a [super::LessonCompletion],
}

/// Response of POST /progress/sync. A backend that returns no body is
/// treated as having confirmed everything that was sent.
#[derive(Debug, Default, Deserialize)]
pub struct ProgressUploadResponse {
    #[serde(default)]
    pub synced: Vec<i64>,
}

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Per-lesson completion state plus the queue of lessons whose completion
/// has not yet been confirmed by the backend.
///
/// Serialized camelCase so the durable record stays byte-compatible with the
/// `learnify_progress` record the web client kept in localStorage. A lesson
/// absent from `completed_lessons` counts as incomplete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    #[serde(default)]
    pub completed_lessons: HashMap<i64, bool>,
    /// Unix epoch milliseconds of the last local mutation.
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub pending_sync: Vec<i64>,
}

impl ProgressRecord {
    pub fn is_completed(&self, lesson_id: i64) -> bool {
        self.completed_lessons
            .get(&lesson_id)
            .copied()
            .unwrap_or(false)
    }

    /// Flips the completion flag and queues the lesson for upload.
    /// Returns the new flag value.
    pub fn toggle(&mut self, lesson_id: i64) -> bool {
        let next = !self.is_completed(lesson_id);
        self.completed_lessons.insert(lesson_id, next);
        self.touch();
        self.enqueue(lesson_id);
        next
    }

    pub fn set_completed(&mut self, lesson_id: i64, completed: bool) {
        self.completed_lessons.insert(lesson_id, completed);
        self.touch();
        self.enqueue(lesson_id);
    }

    /// Removes exactly the confirmed ids from the pending queue. Ids
    /// enqueued while an upload was in flight are not touched.
    pub fn confirm_synced(&mut self, confirmed: &[i64]) {
        self.pending_sync.retain(|id| !confirmed.contains(id));
    }

    /// Empty record with a fresh `last_updated` stamp, used by the
    /// clear-progress action.
    pub fn cleared() -> Self {
        let mut record = Self::default();
        record.touch();
        record
    }

    fn enqueue(&mut self, lesson_id: i64) {
        if !self.pending_sync.contains(&lesson_id) {
            self.pending_sync.push(lesson_id);
        }
    }

    fn touch(&mut self) {
        self.last_updated = Some(Utc::now().timestamp_millis());
    }
}

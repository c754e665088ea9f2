use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::api::{ApiClient, LessonCompletion};
use crate::cache::{DEFAULT_TTL, TtlCache};
use crate::catalog;
use crate::db::progress;
use crate::error::AppError;
use crate::models::{Course, Lesson, ProgressRecord};

const COURSES_KEY: &str = "courses";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Syncing,
}

#[derive(Debug)]
struct StoreState {
    courses: TtlCache<&'static str, Vec<Course>>,
    selected_course: Option<Course>,
    courses_error: Option<String>,
    lessons: TtlCache<i64, Vec<Lesson>>,
    lessons_error: Option<String>,
    progress: ProgressRecord,
    sync_status: SyncStatus,
    sync_error: Option<String>,
}

/// Central state container: catalog slices with time-windowed freshness,
/// the completion map, and the pending-sync queue. Constructed explicitly
/// (no globals) and shared behind an `Arc`.
///
/// The inner mutex is never held across an await, so every mutation is a
/// single atomic state transition.
pub struct Store {
    api: Arc<dyn ApiClient>,
    db: SqlitePool,
    state: Mutex<StoreState>,
    // Serializes durable writes; see `persist`.
    persist_lock: tokio::sync::Mutex<()>,
}

impl Store {
    pub fn new(api: Arc<dyn ApiClient>, db: SqlitePool) -> Self {
        Self::with_cache_timeout(api, db, DEFAULT_TTL)
    }

    pub fn with_cache_timeout(
        api: Arc<dyn ApiClient>,
        db: SqlitePool,
        cache_timeout: Duration,
    ) -> Self {
        Store {
            api,
            db,
            state: Mutex::new(StoreState {
                courses: TtlCache::with_default_ttl(cache_timeout),
                selected_course: None,
                courses_error: None,
                lessons: TtlCache::with_default_ttl(cache_timeout),
                lessons_error: None,
                progress: ProgressRecord::default(),
                sync_status: SyncStatus::Idle,
                sync_error: None,
            }),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Builds the store and hydrates progress from the durable record.
    /// A failed load starts empty; it is never fatal.
    pub async fn load(api: Arc<dyn ApiClient>, db: SqlitePool) -> Self {
        let store = Self::new(api, db);
        match progress::load(&store.db).await {
            Ok(Some(record)) => {
                debug!(pending = record.pending_sync.len(), "restored progress record");
                store.lock().progress = record;
            }
            Ok(None) => {}
            Err(e) => warn!("failed to load progress record, starting empty: {}", e),
        }
        store
    }

    // Mutations never unwind mid-update, so a poisoned lock still holds
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolves from cache while the courses entry is fresh and non-empty;
    /// otherwise refetches and replaces the collection wholesale.
    pub async fn fetch_courses(&self) -> Result<Vec<Course>, AppError> {
        {
            let state = self.lock();
            if let Some(cached) = state.courses.read(&COURSES_KEY) {
                if !cached.is_empty() {
                    debug!("serving courses from cache");
                    return Ok(cached.clone());
                }
            }
        }

        let started = Instant::now();
        let courses = catalog::get_all_courses(self.api.as_ref()).await;

        let mut state = self.lock();
        state.courses_error = None;

        // A slower fetch must not clobber a fresher entry written while it
        // was in flight; last-write-wins goes to the newer request.
        if let Some(fetched_at) = state.courses.fetched_at(&COURSES_KEY) {
            if fetched_at > started {
                if let Some(fresher) = state.courses.get_stale(&COURSES_KEY) {
                    return Ok(fresher.clone());
                }
            }
        }

        state.courses.write(COURSES_KEY, courses.clone());
        Ok(courses)
    }

    pub async fn fetch_course_by_id(&self, id: i64) -> Result<Course, AppError> {
        let cached = self
            .lock()
            .courses
            .read(&COURSES_KEY)
            .and_then(|courses| courses.iter().find(|c| c.id == id).cloned());
        if let Some(course) = cached {
            self.lock().selected_course = Some(course.clone());
            return Ok(course);
        }

        match catalog::get_course_by_id(self.api.as_ref(), id).await {
            Ok(course) => {
                let mut state = self.lock();
                state.courses_error = None;
                state.selected_course = Some(course.clone());
                Ok(course)
            }
            Err(e) => {
                self.lock().courses_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Same policy as `fetch_courses`, but freshness is tracked per course:
    /// one course's lessons expiring never forces another's to refetch.
    /// An empty cached lesson list still counts as a hit.
    pub async fn fetch_lessons_by_course(&self, course_id: i64) -> Result<Vec<Lesson>, AppError> {
        {
            let state = self.lock();
            if let Some(cached) = state.lessons.read(&course_id) {
                debug!("serving lessons for course {} from cache", course_id);
                return Ok(cached.clone());
            }
        }

        let started = Instant::now();
        let lessons = catalog::get_lessons_by_course(self.api.as_ref(), course_id).await;

        let mut state = self.lock();
        state.lessons_error = None;

        if let Some(fetched_at) = state.lessons.fetched_at(&course_id) {
            if fetched_at > started {
                if let Some(fresher) = state.lessons.get_stale(&course_id) {
                    return Ok(fresher.clone());
                }
            }
        }

        state.lessons.write(course_id, lessons.clone());
        Ok(lessons)
    }

    /// Optimistic update: the flag flips locally first, the lesson joins the
    /// pending-sync queue (at most once), and the whole record is persisted
    /// before this returns. Returns the new flag value.
    pub async fn toggle_lesson_completion(&self, lesson_id: i64) -> bool {
        let completed = self.lock().progress.toggle(lesson_id);
        self.persist().await;
        completed
    }

    pub async fn mark_lesson_complete(&self, lesson_id: i64) {
        self.set_completion(lesson_id, true).await;
    }

    pub async fn mark_lesson_incomplete(&self, lesson_id: i64) {
        self.set_completion(lesson_id, false).await;
    }

    async fn set_completion(&self, lesson_id: i64, completed: bool) {
        self.lock().progress.set_completed(lesson_id, completed);
        self.persist().await;
    }

    // Durable write of the current progress record. Writes are serialized
    // and each one snapshots the state after taking its turn, so two racing
    // mutations cannot land on disk in inverted order. A failed write is
    // logged, never fatal: the in-memory state already advanced.
    async fn persist(&self) {
        let _turn = self.persist_lock.lock().await;
        let snapshot = self.lock().progress.clone();
        if let Err(e) = progress::save(&self.db, &snapshot).await {
            warn!("failed to persist progress record: {}", e);
        }
    }

    /// Drains the current pending queue. Returns how many lessons the
    /// backend confirmed.
    pub async fn sync_pending(&self) -> Result<usize, AppError> {
        let pending = self.lock().progress.pending_sync.clone();
        if pending.is_empty() {
            return Ok(0);
        }
        self.sync_lessons(&pending).await
    }

    /// Best-effort upload of the given lessons' completion state. On
    /// success, exactly the confirmed ids leave the queue; lessons enqueued
    /// while the upload was in flight stay queued. On failure the queue is
    /// untouched and a non-blocking sync-error flag is set; retry scheduling
    /// is the caller's concern.
    pub async fn sync_lessons(&self, lesson_ids: &[i64]) -> Result<usize, AppError> {
        let updates: Vec<LessonCompletion> = {
            let mut state = self.lock();
            state.sync_status = SyncStatus::Syncing;
            state.sync_error = None;
            lesson_ids
                .iter()
                .map(|&id| LessonCompletion {
                    lesson_id: id,
                    completed: state.progress.is_completed(id),
                })
                .collect()
        };

        match self.api.push_progress(&updates).await {
            Ok(confirmed) => {
                {
                    let mut state = self.lock();
                    state.sync_status = SyncStatus::Idle;
                    state.progress.confirm_synced(&confirmed);
                }
                self.persist().await;
                Ok(confirmed.len())
            }
            Err(e) => {
                let mut state = self.lock();
                state.sync_status = SyncStatus::Idle;
                state.sync_error = Some(e.to_string());
                Err(AppError::Sync(e.to_string()))
            }
        }
    }

    /// Wipes the completion map and pending queue and removes the durable
    /// record entirely. Irreversible; confirmation is a UI concern.
    pub async fn clear_progress(&self) {
        self.lock().progress = ProgressRecord::cleared();
        if let Err(e) = progress::clear(&self.db).await {
            warn!("failed to remove durable progress record: {}", e);
        }
    }

    pub fn clear_sync_error(&self) {
        self.lock().sync_error = None;
    }

    /// Housekeeping for both catalog caches; safe to call any time.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.lock();
        state.courses.sweep_expired() + state.lessons.sweep_expired()
    }

    // ----- selectors -----

    /// Last fetched collection regardless of freshness: the UI keeps
    /// showing stale data while a refetch is in flight.
    pub fn all_courses(&self) -> Vec<Course> {
        self.lock()
            .courses
            .get_stale(&COURSES_KEY)
            .cloned()
            .unwrap_or_default()
    }

    pub fn selected_course(&self) -> Option<Course> {
        self.lock().selected_course.clone()
    }

    pub fn lessons_for_course(&self, course_id: i64) -> Vec<Lesson> {
        self.lock()
            .lessons
            .get_stale(&course_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Previous and next lesson around `lesson_id`, by `order`.
    pub fn adjacent_lessons(
        &self,
        course_id: i64,
        lesson_id: i64,
    ) -> (Option<Lesson>, Option<Lesson>) {
        let mut lessons = self.lessons_for_course(course_id);
        lessons.sort_by_key(|lesson| lesson.order);

        let Some(index) = lessons.iter().position(|l| l.id == lesson_id) else {
            return (None, None);
        };

        let previous = index.checked_sub(1).map(|i| lessons[i].clone());
        let next = lessons.get(index + 1).cloned();
        (previous, next)
    }

    pub fn is_lesson_completed(&self, lesson_id: i64) -> bool {
        self.lock().progress.is_completed(lesson_id)
    }

    pub fn completed_lessons(&self) -> HashMap<i64, bool> {
        self.lock().progress.completed_lessons.clone()
    }

    pub fn pending_sync(&self) -> Vec<i64> {
        self.lock().progress.pending_sync.clone()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.lock().sync_status
    }

    pub fn sync_error(&self) -> Option<String> {
        self.lock().sync_error.clone()
    }

    pub fn courses_error(&self) -> Option<String> {
        self.lock().courses_error.clone()
    }

    pub fn lessons_error(&self) -> Option<String> {
        self.lock().lessons_error.clone()
    }

    /// Rounded completion percentage for one course; 0 when no lessons are
    /// loaded (no division by zero).
    pub fn course_progress(&self, course_id: i64) -> u8 {
        let state = self.lock();
        let Some(lessons) = state.lessons.get_stale(&course_id) else {
            return 0;
        };
        let completed = lessons
            .iter()
            .filter(|lesson| state.progress.is_completed(lesson.id))
            .count();
        percent(completed, lessons.len())
    }

    /// Completion percentage across every loaded lesson group.
    pub fn total_progress(&self) -> u8 {
        let state = self.lock();
        let mut total = 0;
        let mut completed = 0;
        for course in state.lessons.keys() {
            if let Some(lessons) = state.lessons.get_stale(course) {
                total += lessons.len();
                completed += lessons
                    .iter()
                    .filter(|lesson| state.progress.is_completed(lesson.id))
                    .count();
            }
        }
        percent(completed, total)
    }
}

fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

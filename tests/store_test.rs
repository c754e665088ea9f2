use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::Notify;

use learnify::api::{ApiClient, LessonCompletion};
use learnify::catalog::fallback;
use learnify::db::progress;
use learnify::error::AppError;
use learnify::models::{Course, Lesson, ProgressRecord};
use learnify::store::{Store, SyncStatus};

async fn test_pool() -> SqlitePool {
    // One connection: every in-memory sqlite connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create database");

    sqlx::query(
        r#"
        CREATE TABLE progress_records (
            name TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create progress_records table");

    pool
}

/// Serves the bundled catalog while counting upstream calls.
#[derive(Default)]
struct CountingApi {
    course_calls: AtomicUsize,
    lesson_calls: AtomicUsize,
}

#[async_trait]
impl ApiClient for CountingApi {
    async fn fetch_courses(&self) -> Result<Vec<Course>, AppError> {
        self.course_calls.fetch_add(1, Ordering::SeqCst);
        Ok(fallback::courses())
    }

    async fn fetch_lessons(&self, course_id: i64) -> Result<Vec<Lesson>, AppError> {
        self.lesson_calls.fetch_add(1, Ordering::SeqCst);
        Ok(fallback::lessons_for_course(course_id))
    }

    async fn push_progress(&self, updates: &[LessonCompletion]) -> Result<Vec<i64>, AppError> {
        Ok(updates.iter().map(|u| u.lesson_id).collect())
    }
}

/// Every call fails with a transient error.
struct FailingApi;

#[async_trait]
impl ApiClient for FailingApi {
    async fn fetch_courses(&self) -> Result<Vec<Course>, AppError> {
        Err(AppError::malformed(500, "boom"))
    }

    async fn fetch_lessons(&self, _course_id: i64) -> Result<Vec<Lesson>, AppError> {
        Err(AppError::malformed(500, "boom"))
    }

    async fn push_progress(&self, _updates: &[LessonCompletion]) -> Result<Vec<i64>, AppError> {
        Err(AppError::malformed(503, "backend down"))
    }
}

/// Holds uploads in flight until released, so tests can mutate the queue
/// mid-sync.
struct GatedApi {
    gate: Notify,
    started: Notify,
}

impl GatedApi {
    fn new() -> Self {
        Self {
            gate: Notify::new(),
            started: Notify::new(),
        }
    }
}

#[async_trait]
impl ApiClient for GatedApi {
    async fn fetch_courses(&self) -> Result<Vec<Course>, AppError> {
        Ok(Vec::new())
    }

    async fn fetch_lessons(&self, _course_id: i64) -> Result<Vec<Lesson>, AppError> {
        Ok(Vec::new())
    }

    async fn push_progress(&self, updates: &[LessonCompletion]) -> Result<Vec<i64>, AppError> {
        self.started.notify_one();
        self.gate.notified().await;
        Ok(updates.iter().map(|u| u.lesson_id).collect())
    }
}

/// The first course fetch blocks on a gate; every later fetch returns a
/// newer collection immediately.
struct RacingApi {
    gate: Notify,
    started: Notify,
    calls: AtomicUsize,
}

impl RacingApi {
    fn new() -> Self {
        Self {
            gate: Notify::new(),
            started: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ApiClient for RacingApi {
    async fn fetch_courses(&self) -> Result<Vec<Course>, AppError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.started.notify_one();
            self.gate.notified().await;
            return Ok(vec![named_course(1, "stale snapshot")]);
        }
        Ok(vec![named_course(1, "fresh snapshot")])
    }

    async fn fetch_lessons(&self, _course_id: i64) -> Result<Vec<Lesson>, AppError> {
        Ok(Vec::new())
    }

    async fn push_progress(&self, updates: &[LessonCompletion]) -> Result<Vec<i64>, AppError> {
        Ok(updates.iter().map(|u| u.lesson_id).collect())
    }
}

fn named_course(id: i64, title: &str) -> Course {
    Course {
        id,
        title: title.to_string(),
        description: String::new(),
        category: None,
        image_url: None,
    }
}

#[tokio::test]
async fn courses_within_ttl_are_served_from_cache() {
    let api = Arc::new(CountingApi::default());
    let store = Store::new(api.clone(), test_pool().await);

    let first = store.fetch_courses().await.expect("first fetch");
    let second = store.fetch_courses().await.expect("second fetch");

    assert_eq!(first, second);
    assert_eq!(api.course_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn courses_refetch_after_ttl_expires() {
    let api = Arc::new(CountingApi::default());
    let store = Store::with_cache_timeout(api.clone(), test_pool().await, Duration::from_millis(20));

    store.fetch_courses().await.expect("first fetch");
    tokio::time::sleep(Duration::from_millis(50)).await;
    store.fetch_courses().await.expect("second fetch");

    assert_eq!(api.course_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn lesson_freshness_is_tracked_per_course() {
    let api = Arc::new(CountingApi::default());
    let store = Store::new(api.clone(), test_pool().await);

    store.fetch_lessons_by_course(1).await.expect("course 1");
    store.fetch_lessons_by_course(2).await.expect("course 2");
    store.fetch_lessons_by_course(1).await.expect("course 1 again");

    // Two distinct courses, one network call each; the repeat was a cache hit.
    assert_eq!(api.lesson_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn slow_fetch_never_overwrites_a_fresher_cache_entry() {
    let api = Arc::new(RacingApi::new());
    let store = Arc::new(Store::new(api.clone(), test_pool().await));

    let slow = {
        let store = store.clone();
        tokio::spawn(async move { store.fetch_courses().await })
    };

    // A second fetch completes and refreshes the cache while the first is
    // still in flight.
    api.started.notified().await;
    let fresh = store.fetch_courses().await.expect("second fetch");
    assert_eq!(fresh[0].title, "fresh snapshot");

    api.gate.notify_one();
    let late = slow.await.expect("join").expect("first fetch");

    // Last write goes to the newer request: the slow result is discarded
    // and its caller gets the fresher collection too.
    assert_eq!(late[0].title, "fresh snapshot");
    assert_eq!(store.all_courses()[0].title, "fresh snapshot");
}

#[tokio::test]
async fn fetch_courses_falls_back_to_the_bundled_catalog() {
    let store = Store::new(Arc::new(FailingApi), test_pool().await);

    let courses = store.fetch_courses().await.expect("must not reject");

    assert!(!courses.is_empty());
    assert_eq!(courses, fallback::courses());
}

#[tokio::test]
async fn fetch_course_by_id_surfaces_not_found() {
    let store = Store::new(Arc::new(CountingApi::default()), test_pool().await);

    let missing = store.fetch_course_by_id(9999).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    let found = store.fetch_course_by_id(1).await.expect("course 1");
    assert_eq!(found.id, 1);
    assert_eq!(store.selected_course().map(|c| c.id), Some(1));
}

#[tokio::test]
async fn double_toggle_enqueues_once_and_restores_the_flag() {
    let store = Store::new(Arc::new(CountingApi::default()), test_pool().await);

    assert!(store.toggle_lesson_completion(101).await);
    assert!(!store.toggle_lesson_completion(101).await);

    assert!(!store.is_lesson_completed(101));
    assert_eq!(store.pending_sync(), vec![101]);
}

#[tokio::test]
async fn progress_survives_a_restart() {
    let pool = test_pool().await;

    {
        let store = Store::new(Arc::new(CountingApi::default()), pool.clone());
        store.mark_lesson_complete(102).await;
    }

    // A second store over the same database sees the persisted mutation.
    let reopened = Store::load(Arc::new(CountingApi::default()), pool).await;
    assert!(reopened.is_lesson_completed(102));
    assert_eq!(reopened.pending_sync(), vec![102]);
}

#[tokio::test]
async fn progress_record_round_trips_through_the_database() {
    let pool = test_pool().await;

    let mut record = ProgressRecord::default();
    record.set_completed(1, true);
    record.set_completed(2, false);

    progress::save(&pool, &record).await.expect("save");
    let loaded = progress::load(&pool).await.expect("load").expect("present");

    assert_eq!(loaded, record);
}

#[tokio::test]
async fn concurrent_toggles_leave_the_durable_record_current() {
    let pool = test_pool().await;
    let store = Arc::new(Store::new(Arc::new(CountingApi::default()), pool.clone()));

    let toggles: Vec<_> = (1..=8)
        .map(|lesson_id| {
            let store = store.clone();
            tokio::spawn(async move { store.toggle_lesson_completion(lesson_id).await })
        })
        .collect();
    for handle in toggles {
        assert!(handle.await.expect("join"));
    }

    // Persists are serialized, so the record on disk matches the in-memory
    // state once every toggle has returned.
    let saved = progress::load(&pool).await.expect("load").expect("present");
    assert_eq!(saved.completed_lessons, store.completed_lessons());

    let mut pending = saved.pending_sync.clone();
    pending.sort_unstable();
    assert_eq!(pending, (1..=8).collect::<Vec<i64>>());
}

#[tokio::test]
async fn sync_removes_only_the_confirmed_ids() {
    let api = Arc::new(GatedApi::new());
    let store = Arc::new(Store::new(api.clone(), test_pool().await));

    store.toggle_lesson_completion(1).await;
    store.toggle_lesson_completion(2).await;
    assert_eq!(store.pending_sync(), vec![1, 2]);

    let syncing = {
        let store = store.clone();
        tokio::spawn(async move { store.sync_lessons(&[1, 2]).await })
    };

    // Enqueue a third lesson while the upload is in flight.
    api.started.notified().await;
    assert_eq!(store.sync_status(), SyncStatus::Syncing);
    store.toggle_lesson_completion(3).await;
    api.gate.notify_one();

    let confirmed = syncing.await.expect("join").expect("sync");
    assert_eq!(confirmed, 2);
    assert_eq!(store.pending_sync(), vec![3]);
    assert_eq!(store.sync_status(), SyncStatus::Idle);
}

#[tokio::test]
async fn failed_sync_preserves_the_queue() {
    let store = Store::new(Arc::new(FailingApi), test_pool().await);

    store.toggle_lesson_completion(5).await;
    let result = store.sync_pending().await;

    assert!(matches!(result, Err(AppError::Sync(_))));
    assert_eq!(store.pending_sync(), vec![5]);
    assert_eq!(store.sync_status(), SyncStatus::Idle);
    assert!(store.sync_error().is_some());

    // The error flag does not block further toggles.
    store.toggle_lesson_completion(6).await;
    assert_eq!(store.pending_sync(), vec![5, 6]);

    store.clear_sync_error();
    assert!(store.sync_error().is_none());
}

#[tokio::test]
async fn clear_progress_removes_the_durable_record() {
    let pool = test_pool().await;
    let store = Store::new(Arc::new(CountingApi::default()), pool.clone());

    store.mark_lesson_complete(101).await;
    assert!(progress::load(&pool).await.expect("load").is_some());

    store.clear_progress().await;

    assert!(store.completed_lessons().is_empty());
    assert!(store.pending_sync().is_empty());
    assert!(progress::load(&pool).await.expect("load").is_none());
}

#[tokio::test]
async fn course_progress_is_a_rounded_percentage() {
    let store = Store::new(Arc::new(CountingApi::default()), test_pool().await);

    // Course 1 has four bundled lessons.
    let lessons = store.fetch_lessons_by_course(1).await.expect("lessons");
    assert_eq!(lessons.len(), 4);

    store.mark_lesson_complete(lessons[0].id).await;
    assert_eq!(store.course_progress(1), 25);

    // A course with no loaded lessons reports zero, not a division error.
    assert_eq!(store.course_progress(9999), 0);

    store.fetch_lessons_by_course(9999).await.expect("empty");
    assert_eq!(store.course_progress(9999), 0);

    assert_eq!(store.total_progress(), 25);
}

#[tokio::test]
async fn adjacent_lessons_follow_the_course_ordering() {
    let store = Store::new(Arc::new(CountingApi::default()), test_pool().await);
    store.fetch_lessons_by_course(1).await.expect("lessons");

    let (previous, next) = store.adjacent_lessons(1, 102);
    assert_eq!(previous.map(|l| l.id), Some(101));
    assert_eq!(next.map(|l| l.id), Some(103));

    let (first_prev, _) = store.adjacent_lessons(1, 101);
    assert!(first_prev.is_none());

    let (_, last_next) = store.adjacent_lessons(1, 104);
    assert!(last_next.is_none());
}

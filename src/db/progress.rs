use chrono::Utc;
use sqlx::SqlitePool;
use tracing::warn;

use crate::error::AppError;
use crate::models::ProgressRecord;

/// Name of the single durable record, kept identical to the localStorage
/// key the web client used.
pub const PROGRESS_RECORD: &str = "learnify_progress";

/// Loads the durable progress record. A corrupt record is discarded (with a
/// warning) rather than surfaced: progress then restarts empty.
pub async fn load(db: &SqlitePool) -> Result<Option<ProgressRecord>, AppError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT data FROM progress_records WHERE name = ?1")
            .bind(PROGRESS_RECORD)
            .fetch_optional(db)
            .await?;

    let Some((data,)) = row else {
        return Ok(None);
    };

    match serde_json::from_str::<ProgressRecord>(&data) {
        Ok(record) => Ok(Some(record)),
        Err(e) => {
            warn!("discarding corrupt progress record: {}", e);
            Ok(None)
        }
    }
}

/// Upserts the whole record as one JSON document.
pub async fn save(db: &SqlitePool, record: &ProgressRecord) -> Result<(), AppError> {
    let data =
        serde_json::to_string(record).map_err(|e| AppError::Persistence(e.to_string()))?;
    let now = Utc::now().to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO progress_records (name, data, updated_at)
        VALUES (?1, ?2, ?3)
        ON CONFLICT(name) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
        "#,
    )
    .bind(PROGRESS_RECORD)
    .bind(data)
    .bind(now)
    .execute(db)
    .await?;

    Ok(())
}

/// Removes the record entirely (not just emptied). Irreversible.
pub async fn clear(db: &SqlitePool) -> Result<(), AppError> {
    sqlx::query("DELETE FROM progress_records WHERE name = ?1")
        .bind(PROGRESS_RECORD)
        .execute(db)
        .await?;

    Ok(())
}

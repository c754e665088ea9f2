pub mod dto;

use std::env;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::catalog::fallback;
use crate::error::AppError;
use crate::models::{Course, Lesson};

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    /// Static bearer credential. Known limitation: there is no real auth
    /// flow, the token is passed through as-is.
    pub api_token: String,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let base_url = env::var("LEARNIFY_API_URL")
            .unwrap_or_else(|_| "http://localhost:5000/api".to_string());
        let api_token = env::var("LEARNIFY_API_TOKEN")
            .map_err(|_| AppError::Config("LEARNIFY_API_TOKEN is not set".to_string()))?;

        Ok(Self {
            base_url,
            api_token,
        })
    }
}

/// One completion flag headed for the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCompletion {
    pub lesson_id: i64,
    pub completed: bool,
}

/// Remote catalog and progress API. Fetchers translate wire shapes into the
/// internal model and return typed failures; they never retry and never
/// touch any cache (that is the store's job).
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn fetch_courses(&self) -> Result<Vec<Course>, AppError>;
    async fn fetch_lessons(&self, course_id: i64) -> Result<Vec<Lesson>, AppError>;
    /// Uploads completion state; returns the lesson ids the backend confirmed.
    async fn push_progress(&self, updates: &[LessonCompletion]) -> Result<Vec<i64>, AppError>;
}

pub struct HttpApiClient {
    client: Client,
    config: ApiConfig,
}

impl HttpApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, AppError> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self
            .client
            .get(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_token),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::malformed(status.as_u16(), body));
        }

        let body = response.text().await?;
        serde_json::from_str::<T>(&body).map_err(|e| {
            error!("failed to parse response from {}: {}", path, e);
            AppError::malformed(status.as_u16(), e.to_string())
        })
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn fetch_courses(&self) -> Result<Vec<Course>, AppError> {
        self.get_json::<Vec<Course>>("/courses").await
    }

    async fn fetch_lessons(&self, course_id: i64) -> Result<Vec<Lesson>, AppError> {
        let wires = self
            .get_json::<Vec<dto::LessonWire>>(&format!("/courses/{}/lessons", course_id))
            .await?;

        Ok(wires
            .into_iter()
            .map(|wire| wire.into_lesson(course_id))
            .collect())
    }

    async fn push_progress(&self, updates: &[LessonCompletion]) -> Result<Vec<i64>, AppError> {
        let url = format!("{}/progress/sync", self.config.base_url);
        let request_body = dto::ProgressUploadRequest { lessons: updates };

        let response = self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.api_token),
            )
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::malformed(status.as_u16(), body));
        }

        let body = response.text().await.unwrap_or_default();
        let parsed = serde_json::from_str::<dto::ProgressUploadResponse>(&body).unwrap_or_default();

        if parsed.synced.is_empty() {
            // No explicit confirmation list: a 2xx confirms the whole batch.
            Ok(updates.iter().map(|u| u.lesson_id).collect())
        } else {
            Ok(parsed.synced)
        }
    }
}

/// Serves the bundled catalog and confirms every upload. Stands in for the
/// real backend in tests and offline demo runs.
pub struct StaticApiClient;

#[async_trait]
impl ApiClient for StaticApiClient {
    async fn fetch_courses(&self) -> Result<Vec<Course>, AppError> {
        Ok(fallback::courses())
    }

    async fn fetch_lessons(&self, course_id: i64) -> Result<Vec<Lesson>, AppError> {
        Ok(fallback::lessons_for_course(course_id))
    }

    async fn push_progress(&self, updates: &[LessonCompletion]) -> Result<Vec<i64>, AppError> {
        Ok(updates.iter().map(|u| u.lesson_id).collect())
    }
}

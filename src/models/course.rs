use serde::{Deserialize, Serialize};

/// A course as the client sees it: immutable, replaced wholesale whenever
/// the catalog is refetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::classifier::{Signal, Source};
use crate::uploads::repo::Upload;

/// Response for a completed classification.
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: Signal,
    pub confidence: f64,
    pub source: Source,
    pub saved_path: String,
    pub annotated_path: Option<String>,
}

/// One entry of the caller's upload history.
#[derive(Debug, Serialize)]
pub struct HistoryItem {
    pub id: Uuid,
    pub original_path: String,
    pub annotated_path: Option<String>,
    pub prediction: String,
    pub confidence: f64,
    pub source: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Upload> for HistoryItem {
    fn from(u: Upload) -> Self {
        Self {
            id: u.id,
            original_path: u.original_path,
            annotated_path: u.annotated_path,
            prediction: u.prediction,
            confidence: u.confidence,
            source: u.source,
            created_at: u.created_at,
        }
    }
}

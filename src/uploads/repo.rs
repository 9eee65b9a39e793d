use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

/// One record per completed classification. Immutable after insert; there is
/// no update or delete path.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Upload {
    pub id: Uuid,
    pub user_email: String,
    pub original_path: String,
    pub annotated_path: Option<String>,
    pub prediction: String,
    pub confidence: f64,
    pub source: String,
    pub created_at: OffsetDateTime,
}

impl Upload {
    pub async fn insert(db: &SqlitePool, upload: &Upload) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads
                (id, user_email, original_path, annotated_path, prediction,
                 confidence, source, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(upload.id)
        .bind(&upload.user_email)
        .bind(&upload.original_path)
        .bind(&upload.annotated_path)
        .bind(&upload.prediction)
        .bind(upload.confidence)
        .bind(&upload.source)
        .bind(upload.created_at)
        .execute(db)
        .await?;
        Ok(())
    }

    /// The owner's records, newest first, capped at `limit`.
    pub async fn list_by_owner(
        db: &SqlitePool,
        email: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<Upload>> {
        let rows = sqlx::query_as::<_, Upload>(
            r#"
            SELECT id, user_email, original_path, annotated_path, prediction,
                   confidence, source, created_at
            FROM uploads
            WHERE user_email = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(email)
        .bind(limit)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Ownership check for serving a stored original.
    pub async fn find_original(
        db: &SqlitePool,
        email: &str,
        original_path: &str,
    ) -> anyhow::Result<Option<Upload>> {
        let row = sqlx::query_as::<_, Upload>(
            r#"
            SELECT id, user_email, original_path, annotated_path, prediction,
                   confidence, source, created_at
            FROM uploads
            WHERE user_email = ? AND original_path = ?
            "#,
        )
        .bind(email)
        .bind(original_path)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Ownership check for serving an annotated derivative.
    pub async fn find_annotated(
        db: &SqlitePool,
        email: &str,
        annotated_path: &str,
    ) -> anyhow::Result<Option<Upload>> {
        let row = sqlx::query_as::<_, Upload>(
            r#"
            SELECT id, user_email, original_path, annotated_path, prediction,
                   confidence, source, created_at
            FROM uploads
            WHERE user_email = ? AND annotated_path = ?
            "#,
        )
        .bind(email)
        .bind(annotated_path)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }
}

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    annotate,
    auth::CurrentUser,
    state::AppState,
    storage,
    uploads::{
        dto::{HistoryItem, PredictResponse},
        repo::Upload,
    },
};

const HISTORY_LIMIT: i64 = 50;

/// The upload pipeline: auth gate (extractor), content-type gate, store the
/// original, classify the in-memory bytes, annotate best-effort, persist one
/// record, respond.
#[instrument(skip(state, mp), fields(user = %user.email))]
pub async fn predict(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut mp: Multipart,
) -> Result<Json<PredictResponse>, (StatusCode, String)> {
    let mut file: Option<(Bytes, String)> = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_default();
            // Gate before reading or storing anything.
            if !content_type.starts_with("image/") {
                return Err((StatusCode::BAD_REQUEST, "Only images".into()));
            }
            let body = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            file = Some((body, content_type));
            break;
        }
    }
    let Some((body, content_type)) = file else {
        return Err((StatusCode::BAD_REQUEST, "file field is required".into()));
    };

    // One generated id names the record and both artifacts.
    let id = Uuid::new_v4();
    let ext = storage::ext_from_mime(&content_type).unwrap_or("bin");
    let original_name = format!("{id}.{ext}");
    state
        .store
        .save_original(&original_name, body.clone())
        .await
        .map_err(internal)?;

    let classifier = state.classifier.clone();
    let image_bytes = body.clone();
    let classification = tokio::task::spawn_blocking(move || classifier.classify(&image_bytes))
        .await
        .map_err(internal)?
        .map_err(|e| {
            warn!(error = %e, "classification rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Classification unavailable".to_string(),
            )
        })?;

    let annotated_name = format!("{id}.png");
    let original_file = state.store.original_file(&original_name);
    let annotated_file = state.store.annotated_file(&annotated_name);
    let label = classification.label;
    let annotated = tokio::task::spawn_blocking(move || {
        annotate::annotate(&original_file, &annotated_file, label.as_str())
    })
    .await
    .ok()
    .flatten();

    let saved_path = format!("/api/uploads/{original_name}");
    let annotated_path = annotated.map(|_| format!("/api/annotated/{annotated_name}"));

    let record = Upload {
        id,
        user_email: user.email.clone(),
        original_path: saved_path.clone(),
        annotated_path: annotated_path.clone(),
        prediction: classification.label.as_str().to_string(),
        confidence: classification.confidence,
        source: classification.source.as_str().to_string(),
        created_at: OffsetDateTime::now_utc(),
    };
    Upload::insert(&state.db, &record).await.map_err(internal)?;

    info!(
        upload_id = %id,
        label = %classification.label,
        source = classification.source.as_str(),
        "upload classified"
    );
    Ok(Json(PredictResponse {
        prediction: classification.label,
        confidence: classification.confidence,
        source: classification.source,
        saved_path,
        annotated_path,
    }))
}

#[instrument(skip(state), fields(user = %user.email))]
pub async fn history(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<HistoryItem>>, (StatusCode, String)> {
    let rows = Upload::list_by_owner(&state.db, &user.email, HISTORY_LIMIT)
        .await
        .map_err(internal)?;
    Ok(Json(rows.into_iter().map(HistoryItem::from).collect()))
}

#[instrument(skip(state), fields(user = %user.email))]
pub async fn serve_original(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(filename): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    serve_artifact(&state, &user.email, &filename, ArtifactKind::Original).await
}

#[instrument(skip(state), fields(user = %user.email))]
pub async fn serve_annotated(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(filename): Path<String>,
) -> Result<Response, (StatusCode, String)> {
    serve_artifact(&state, &user.email, &filename, ArtifactKind::Annotated).await
}

#[derive(Clone, Copy)]
enum ArtifactKind {
    Original,
    Annotated,
}

/// Serve stored bytes only when a record owned by the caller references the
/// requested name.
async fn serve_artifact(
    state: &AppState,
    email: &str,
    filename: &str,
    kind: ArtifactKind,
) -> Result<Response, (StatusCode, String)> {
    if !storage::is_safe_name(filename) {
        return Err(not_found());
    }

    let (served_path, file) = match kind {
        ArtifactKind::Original => (
            format!("/api/uploads/{filename}"),
            state.store.original_file(filename),
        ),
        ArtifactKind::Annotated => (
            format!("/api/annotated/{filename}"),
            state.store.annotated_file(filename),
        ),
    };

    let owned = match kind {
        ArtifactKind::Original => Upload::find_original(&state.db, email, &served_path).await,
        ArtifactKind::Annotated => Upload::find_annotated(&state.db, email, &served_path).await,
    }
    .map_err(internal)?;
    if owned.is_none() {
        return Err(not_found());
    }

    let bytes = tokio::fs::read(&file).await.map_err(|_| not_found())?;
    let content_type = storage::mime_from_name(filename);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Not found".to_string())
}

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

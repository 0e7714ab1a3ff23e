//! Review session endpoints
//!
//! Each handler resolves the annotator, holds its gate, runs one
//! coordinator call and renders the view together with the outcome of the
//! remote push, if one was attempted.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use mcqr_common::session::{Action, SessionView, SyncReport};
use mcqr_common::{Error, ErrorKind, Field, FieldEdits};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AnnotatorsResponse {
    pub annotators: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub view: SessionView,
    pub sync: SyncReport,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub annotator: String,
    pub sync: SyncReport,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub annotator: String,
    pub categories: BTreeMap<String, usize>,
}

/// Body of a save: field name (CSV header or column spelling) → value
///
/// `id`, when present, must name the record the server considers current.
#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl SaveRequest {
    fn into_edits(self) -> Result<FieldEdits, Error> {
        if self.fields.is_empty() {
            return Err(Error::InvalidInput("no fields to save".to_string()));
        }
        self.fields
            .into_iter()
            .map(|(name, value)| name.parse::<Field>().map(|field| (field, value)))
            .collect()
    }
}

/// GET /api/annotators
pub async fn list_annotators(State(state): State<AppState>) -> Json<AnnotatorsResponse> {
    Json(AnnotatorsResponse {
        annotators: state.annotators().to_vec(),
    })
}

/// GET /api/review/:annotator
pub async fn current_view(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
) -> Result<Json<SessionView>, ReviewError> {
    let (coordinator, _gate) = state.acquire(&annotator).await?;
    Ok(Json(coordinator.open().await?))
}

/// POST /api/review/:annotator/previous
pub async fn previous(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
) -> Result<Json<ActionResponse>, ReviewError> {
    perform(&state, &annotator, Action::Previous).await
}

/// POST /api/review/:annotator/next
pub async fn next(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
) -> Result<Json<ActionResponse>, ReviewError> {
    perform(&state, &annotator, Action::Next).await
}

/// POST /api/review/:annotator/save
///
/// Overwrites only the named fields of the current record.
pub async fn save(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
    Json(request): Json<SaveRequest>,
) -> Result<Json<ActionResponse>, ReviewError> {
    let expected = request.id.clone();
    let edits = request.into_edits()?;

    let (coordinator, _gate) = state.acquire(&annotator).await?;
    if let Some(expected) = expected {
        let view = coordinator.open().await?;
        let current = view.current().map(|c| c.record.id.to_string());
        if current.as_deref() != Some(expected.trim()) {
            return Err(ReviewError::StaleView { expected, current });
        }
    }
    let report = coordinator.handle(Action::Save(edits)).await?;
    Ok(Json(ActionResponse {
        sync: SyncReport::from(&report.sync),
        view: report.view,
    }))
}

/// POST /api/review/:annotator/delete
pub async fn delete(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
) -> Result<Json<ActionResponse>, ReviewError> {
    perform(&state, &annotator, Action::Delete).await
}

/// POST /api/review/:annotator/sync
///
/// Retries the remote half of an earlier mutation.
pub async fn resync(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
) -> Result<Json<SyncResponse>, ReviewError> {
    let (coordinator, _gate) = state.acquire(&annotator).await?;
    let status = coordinator.resync().await?;
    Ok(Json(SyncResponse {
        annotator,
        sync: SyncReport::from(&status),
    }))
}

/// GET /api/review/:annotator/categories
pub async fn categories(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
) -> Result<Json<CategoriesResponse>, ReviewError> {
    let (coordinator, _gate) = state.acquire(&annotator).await?;
    let categories = coordinator.category_distribution().await?;
    Ok(Json(CategoriesResponse {
        annotator,
        categories,
    }))
}

/// GET /api/review/:annotator/image
///
/// Image bytes of the current record.
pub async fn image(
    State(state): State<AppState>,
    Path(annotator): Path<String>,
) -> Result<Response, ReviewError> {
    let (coordinator, _gate) = state.acquire(&annotator).await?;
    let view = coordinator.open().await?;
    let Some(current) = view.current() else {
        return Err(ReviewError::NothingToReview(annotator));
    };
    if !current.image.is_found() {
        return Err(ReviewError::ImageMissing(current.image.path().to_path_buf()));
    }

    let path = current.image.path();
    let bytes = tokio::fs::read(path).await.map_err(Error::from)?;
    Ok(([(header::CONTENT_TYPE, content_type(path))], bytes).into_response())
}

async fn perform(
    state: &AppState,
    annotator: &str,
    action: Action,
) -> Result<Json<ActionResponse>, ReviewError> {
    let (coordinator, _gate) = state.acquire(annotator).await?;
    let report = coordinator.handle(action).await?;
    Ok(Json(ActionResponse {
        sync: SyncReport::from(&report.sync),
        view: report.view,
    }))
}

fn content_type(path: &std::path::Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Error response of the review endpoints
#[derive(Debug)]
pub enum ReviewError {
    UnknownAnnotator(String),
    NothingToReview(String),
    ImageMissing(PathBuf),
    /// The client edited a record that is no longer current
    StaleView {
        expected: String,
        current: Option<String>,
    },
    Session(Error),
}

impl From<Error> for ReviewError {
    fn from(e: Error) -> Self {
        ReviewError::Session(e)
    }
}

/// HTTP status for a session failure
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::RecordNotFound => StatusCode::NOT_FOUND,
        ErrorKind::VersionConflict => StatusCode::CONFLICT,
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::RemoteTimeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::RemoteUnreachable
        | ErrorKind::RemoteAuthFailure
        | ErrorKind::RemoteResourceMissing
        | ErrorKind::RemoteRejected
        | ErrorKind::PushUnconfirmed => StatusCode::BAD_GATEWAY,
        ErrorKind::StoreUnavailable
        | ErrorKind::StoreCorrupt
        | ErrorKind::Configuration
        | ErrorKind::Database
        | ErrorKind::Io
        | ErrorKind::Csv => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ReviewError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ReviewError::UnknownAnnotator(name) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Unknown annotator: {}", name), "kind": "unknown_annotator" }),
            ),
            ReviewError::NothingToReview(name) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("No questions remaining for {}", name), "kind": "empty" }),
            ),
            ReviewError::ImageMissing(path) => {
                info!("Image not found: {}", path.display());
                (
                    StatusCode::NOT_FOUND,
                    json!({
                        "error": "Image not found",
                        "kind": "image_missing",
                        "path": path.display().to_string(),
                    }),
                )
            }
            ReviewError::StaleView { expected, current } => {
                warn!(
                    "Save for record {} rejected, current record is {:?}",
                    expected, current
                );
                (
                    StatusCode::CONFLICT,
                    json!({
                        "error": format!("Record {} is no longer current", expected),
                        "kind": "stale_view",
                        "current": current,
                    }),
                )
            }
            ReviewError::Session(e) => {
                let status = status_for(e.kind());
                if status.is_server_error() {
                    error!("Review request failed: {}", e);
                } else {
                    warn!("Review request rejected: {}", e);
                }
                (
                    status,
                    json!({
                        "error": e.to_string(),
                        "kind": e.kind(),
                        "recoverable": e.is_recoverable(),
                    }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_request_accepts_both_spellings() {
        let request: SaveRequest = serde_json::from_str(
            r#"{"fields": {"category": "history", "option a": "Nile", "option_b_comment": "close"}}"#,
        )
        .unwrap();
        let edits = request.into_edits().unwrap();

        assert_eq!(edits.get(&Field::Category).map(String::as_str), Some("history"));
        assert_eq!(edits.get(&Field::OptionA).map(String::as_str), Some("Nile"));
        assert_eq!(edits.get(&Field::CommentB).map(String::as_str), Some("close"));
    }

    #[test]
    fn test_save_request_rejects_unknown_or_empty() {
        let unknown: SaveRequest =
            serde_json::from_str(r#"{"fields": {"assigned_to": "Yash"}}"#).unwrap();
        assert!(matches!(unknown.into_edits(), Err(Error::InvalidInput(_))));

        let empty: SaveRequest = serde_json::from_str(r#"{"fields": {}}"#).unwrap();
        assert!(matches!(empty.into_edits(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_save_request_id_is_optional() {
        let without: SaveRequest =
            serde_json::from_str(r#"{"fields": {"category": "history"}}"#).unwrap();
        assert!(without.id.is_none());

        let with: SaveRequest =
            serde_json::from_str(r#"{"id": "11", "fields": {"category": "history"}}"#).unwrap();
        assert_eq!(with.id.as_deref(), Some("11"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::RecordNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::VersionConflict), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::RemoteTimeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(ErrorKind::RemoteAuthFailure), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::StoreCorrupt), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type(std::path::Path::new("/i/10.JPG")), "image/jpeg");
        assert_eq!(content_type(std::path::Path::new("/i/10.png")), "image/png");
        assert_eq!(content_type(std::path::Path::new("/i/10")), "application/octet-stream");
    }
}

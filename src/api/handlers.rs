//! Request handlers for every API route.
//!
//! Handlers stay thin: multipart intake, one pipeline or store call, and
//! the envelope. Store calls hop onto the blocking pool because rusqlite
//! is synchronous; the extraction pipeline is already async.

use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};
use uuid::Uuid;

use crate::api::types::{
    ErrorBody, ExtractData, ExtractResponse, Health, ListResponse, RecordPatch, RecordResponse,
    UploadJob, UploadStatus,
};
use crate::api::ApiState;
use crate::error::{ExtractError, StoreError};
use crate::extract::extract;
use crate::pipeline::micr;
use crate::record::ExtractedRecord;
use crate::run::PipelinePhase;
use crate::store::{ListQuery, RecordStore, StoredRecord};

type ApiError = (StatusCode, Json<ErrorBody>);

pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Synchronous extract: stage the upload, run the pipeline, persist, respond.
///
/// A persistence failure does not discard the extraction: the body still
/// carries the fields, transcript, and MICR numbers, with `success: false`
/// and the write error alongside, so the client keeps the data.
pub async fn extract_check(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let staged = save_upload(multipart, &state.uploads_dir).await?;
    info!(path = %staged.display(), "synchronous extract request");

    let output = extract(&staged, &state.config).await.map_err(|e| {
        error!(error = %e, "extraction failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody::new(e.to_string())),
        )
    })?;

    let run_id = output.stats.run_id.clone();
    let fields = output.record.fields();
    let micr = micr::parse(&output.record.raw_micr);
    let raw_text = output.record.raw_text.clone();

    match persist(&state.store, &output.record).await {
        Ok(stored) => {
            PipelinePhase::Persisted.log(&run_id);
            PipelinePhase::Done.log(&run_id);
            Ok(Json(ExtractResponse {
                success: true,
                data: ExtractData {
                    id: Some(stored.id),
                    fields,
                    micr,
                    raw_text,
                },
                error: None,
            })
            .into_response())
        }
        Err(reason) => {
            error!(error = %reason, "persist failed after successful extraction");
            Ok((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExtractResponse {
                    success: false,
                    data: ExtractData {
                        id: None,
                        fields,
                        micr,
                        raw_text,
                    },
                    error: Some(reason),
                }),
            )
                .into_response())
        }
    }
}

pub async fn list_checks(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let store = state.store.clone();
    let page = run_store(move || store.list(&query)).await?;
    Ok(Json(ListResponse {
        success: true,
        data: page.records,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
    }))
}

pub async fn get_check(
    State(state): State<ApiState>,
    UrlPath(id): UrlPath<i64>,
) -> Result<Json<RecordResponse>, ApiError> {
    let store = state.store.clone();
    let row = run_store(move || store.get(id)).await?;
    match row {
        Some(record) => Ok(Json(RecordResponse {
            success: true,
            data: record,
        })),
        None => Err(not_found()),
    }
}

/// Manual-edit path: overlay the patch on the stored row and write it back.
pub async fn update_check(
    State(state): State<ApiState>,
    UrlPath(id): UrlPath<i64>,
    Json(patch): Json<RecordPatch>,
) -> Result<Json<RecordResponse>, ApiError> {
    let store = state.store.clone();
    let updated = run_store(move || {
        let Some(current) = store.get(id)? else {
            return Ok(None);
        };
        store.update_fields(id, &patch.apply(&current))
    })
    .await?;
    match updated {
        Some(record) => {
            info!(id, "record updated");
            Ok(Json(RecordResponse {
                success: true,
                data: record,
            }))
        }
        None => Err(not_found()),
    }
}

/// Legacy history panel: every record as a bare array, newest first.
pub async fn history(State(state): State<ApiState>) -> Result<Json<Vec<StoredRecord>>, ApiError> {
    let store = state.store.clone();
    let rows = run_store(move || store.history()).await?;
    Ok(Json(rows))
}

/// Async intake: stage the upload, register a job, run the pipeline in the
/// background, and return the job handle immediately.
pub async fn create_upload(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadJob>), ApiError> {
    let staged = save_upload(multipart, &state.uploads_dir).await?;
    let id = Uuid::new_v4().to_string();
    info!(job_id = %id, path = %staged.display(), "upload job accepted");

    let job = UploadJob {
        id: id.clone(),
        status: UploadStatus::Processing,
        extracted: None,
        error: None,
    };
    state.jobs.write().await.insert(id.clone(), job.clone());

    let worker = state.clone();
    tokio::spawn(async move {
        run_upload_job(worker, id, staged).await;
    });

    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// Poll one upload job.
pub async fn upload_status(
    State(state): State<ApiState>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<UploadJob>, ApiError> {
    let jobs = state.jobs.read().await;
    match jobs.get(&id) {
        Some(job) => Ok(Json(job.clone())),
        None => Err(not_found()),
    }
}

/// Background worker for one upload job.
///
/// Terminal status comes from the record: `verified` when both core numbers
/// were found, `manual_review` otherwise, `failed` only on a fatal pipeline
/// error. A failed persist keeps the extracted record in the job so the
/// polling client still sees what was read.
async fn run_upload_job(state: ApiState, id: String, staged: PathBuf) {
    let (status, extracted, error) = match extract(&staged, &state.config).await {
        Ok(output) => {
            let mut record = output.record;
            match persist(&state.store, &record).await {
                Ok(stored) => {
                    PipelinePhase::Persisted.log(&output.stats.run_id);
                    PipelinePhase::Done.log(&output.stats.run_id);
                    record.created_at = stored.created_at;
                }
                Err(reason) => {
                    error!(job_id = %id, error = %reason, "persist failed for upload job");
                }
            }
            let status = if record.has_core_numbers() {
                UploadStatus::Verified
            } else {
                UploadStatus::ManualReview
            };
            (status, Some(record), None)
        }
        Err(e) => {
            error!(job_id = %id, error = %e, "upload job failed");
            (UploadStatus::Failed, None, Some(e.to_string()))
        }
    };

    let mut jobs = state.jobs.write().await;
    if let Some(job) = jobs.get_mut(&id) {
        job.status = status;
        job.extracted = extracted;
        job.error = error;
    }
}

/// Pull the `file` part out of the multipart body and stage it under a
/// timestamped name in the uploads directory.
async fn save_upload(mut multipart: Multipart, uploads_dir: &Path) -> Result<PathBuf, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, Json(ErrorBody::new(e.to_string()))))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let original = field.file_name().unwrap_or("upload.bin").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, Json(ErrorBody::new(e.to_string()))))?;

        tokio::fs::create_dir_all(uploads_dir)
            .await
            .map_err(|e| server_error(e.to_string()))?;
        let staged = uploads_dir.join(staged_name(&original));
        tokio::fs::write(&staged, &bytes)
            .await
            .map_err(|e| server_error(e.to_string()))?;
        return Ok(staged);
    }
    Err((
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(ExtractError::UploadMissing.to_string())),
    ))
}

/// `<epoch millis>-<original name>`, with anything path-hostile replaced.
fn staged_name(original: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let safe: String = original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{millis}-{safe}")
}

/// Insert on the blocking pool. The failure reason comes back as a string
/// so callers can surface it without dropping the extracted values.
async fn persist(
    store: &Arc<RecordStore>,
    record: &ExtractedRecord,
) -> Result<StoredRecord, String> {
    let store = store.clone();
    let record = record.clone();
    match tokio::task::spawn_blocking(move || store.insert(&record)).await {
        Ok(Ok(stored)) => Ok(stored),
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Run one store operation on the blocking pool, mapping failures to 500s.
async fn run_store<T, F>(op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    match tokio::task::spawn_blocking(op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!(error = %e, "store operation failed");
            Err(server_error(e.to_string()))
        }
        Err(e) => {
            error!(error = %e, "store task panicked");
            Err(server_error(e.to_string()))
        }
    }
}

fn server_error(message: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(message)),
    )
}

fn not_found() -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorBody::bare()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use tempfile::TempDir;

    fn test_state(uploads: &TempDir) -> ApiState {
        // Zero threshold: any PDF takes the direct-text path, so no external
        // converter or OCR engine is needed.
        let config = ExtractionConfig::builder()
            .min_embedded_chars(0)
            .build()
            .unwrap();
        ApiState::new(
            config,
            RecordStore::in_memory().unwrap(),
            uploads.path(),
        )
    }

    fn seeded(state: &ApiState, name: &str) -> StoredRecord {
        state
            .store
            .insert(&ExtractedRecord {
                account_name: name.into(),
                account_number: "123456789012".into(),
                routing_number: "021000021".into(),
                bank_name: "CALPRIVATE BANK".into(),
                raw_text: "transcript".into(),
                ..Default::default()
            })
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok_and_version() {
        let Json(body) = health().await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn staged_name_keeps_the_original_name_readable() {
        let name = staged_name("scan 1.pdf");
        let (millis, rest) = name.split_once('-').unwrap();
        assert!(millis.parse::<u128>().is_ok());
        assert_eq!(rest, "scan_1.pdf");
    }

    #[test]
    fn staged_name_defangs_path_separators() {
        let name = staged_name("../../etc/passwd");
        assert!(!name.contains('/'));
        assert!(name.ends_with("-.._.._etc_passwd"));
    }

    #[tokio::test]
    async fn get_check_missing_id_is_404_with_bare_body() {
        let uploads = TempDir::new().unwrap();
        let state = test_state(&uploads);

        let err = get_check(State(state), UrlPath(42)).await.err().unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        let body = serde_json::to_value(&err.1 .0).unwrap();
        assert_eq!(body, serde_json::json!({ "success": false }));
    }

    #[tokio::test]
    async fn list_checks_wraps_the_page_envelope() {
        let uploads = TempDir::new().unwrap();
        let state = test_state(&uploads);
        for n in 0..3 {
            seeded(&state, &format!("NAME {n}"));
        }

        let query = ListQuery {
            per_page: Some(2),
            ..Default::default()
        };
        let Json(body) = list_checks(State(state), Query(query)).await.unwrap();
        assert!(body.success);
        assert_eq!(body.total, 3);
        assert_eq!(body.data.len(), 2);
        assert_eq!(body.page, 1);
        assert_eq!(body.per_page, 2);
    }

    #[tokio::test]
    async fn update_check_applies_a_partial_patch() {
        let uploads = TempDir::new().unwrap();
        let state = test_state(&uploads);
        let stored = seeded(&state, "OLD NAME");

        let patch: RecordPatch =
            serde_json::from_str(r#"{"accountName":"NEW NAME"}"#).unwrap();
        let Json(body) = update_check(State(state.clone()), UrlPath(stored.id), Json(patch))
            .await
            .unwrap();
        assert_eq!(body.data.account_name, "NEW NAME");
        assert_eq!(body.data.account_number, stored.account_number);
        assert_eq!(body.data.raw_text, "transcript");

        let err = update_check(State(state), UrlPath(9999), Json(RecordPatch::default()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn history_is_a_bare_newest_first_array() {
        let uploads = TempDir::new().unwrap();
        let state = test_state(&uploads);
        let first = seeded(&state, "FIRST");
        let second = seeded(&state, "SECOND");

        let Json(rows) = history(State(state)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, second.id);
        assert_eq!(rows[1].id, first.id);

        // The panel consumes a bare array, not an envelope.
        let json = serde_json::to_value(&rows).unwrap();
        assert!(json.is_array());
    }

    #[tokio::test]
    async fn upload_status_unknown_job_is_404() {
        let uploads = TempDir::new().unwrap();
        let state = test_state(&uploads);
        let err = upload_status(State(state), UrlPath("nope".to_string()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn upload_job_reaches_manual_review_and_persists() {
        let uploads = TempDir::new().unwrap();
        let state = test_state(&uploads);
        let staged = uploads.path().join("100-scan.pdf");
        std::fs::write(&staged, b"%PDF-1.4\nno text layer here").unwrap();

        state.jobs.write().await.insert(
            "job-1".to_string(),
            UploadJob {
                id: "job-1".to_string(),
                status: UploadStatus::Processing,
                extracted: None,
                error: None,
            },
        );
        run_upload_job(state.clone(), "job-1".to_string(), staged).await;

        let jobs = state.jobs.read().await;
        let job = jobs.get("job-1").unwrap();
        // Nothing extractable in the garbage body, so review is required.
        assert_eq!(job.status, UploadStatus::ManualReview);
        let record = job.extracted.as_ref().unwrap();
        assert!(record.routing_number.is_empty());
        assert!(!record.created_at.is_empty(), "record was persisted");
        assert_eq!(state.store.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn upload_job_with_unsupported_input_fails() {
        let uploads = TempDir::new().unwrap();
        let state = test_state(&uploads);
        let staged = uploads.path().join("100-notes.txt");
        std::fs::write(&staged, b"plain text, not a document").unwrap();

        state.jobs.write().await.insert(
            "job-2".to_string(),
            UploadJob {
                id: "job-2".to_string(),
                status: UploadStatus::Processing,
                extracted: None,
                error: None,
            },
        );
        run_upload_job(state.clone(), "job-2".to_string(), staged).await;

        let jobs = state.jobs.read().await;
        let job = jobs.get("job-2").unwrap();
        assert_eq!(job.status, UploadStatus::Failed);
        assert!(job.extracted.is_none());
        assert!(job.error.as_ref().unwrap().contains("Unsupported"));
        assert_eq!(state.store.count().unwrap(), 0);
    }
}

//! Task submission and polling endpoints.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;
use visionq_common::{
    ImageItem, InvalidImage, StartTaskResponse, TaskEnvelope, TaskRecord, TaskResultResponse,
    TaskState, TaskStatusResponse,
};

use crate::error::{ApiError, Result};
use crate::validate;
use crate::AppState;

/// Build the task router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/start_task", post(start_task))
        .route("/task_status/:task_id", get(task_status))
        .route("/task_result/:task_id", get(task_result))
        .with_state(state)
}

/// POST /start_task - multipart upload of one or more images.
///
/// Valid files are queued as one task; invalid batch members are reported in
/// `invalid_images` and excluded from the envelope entirely.
async fn start_task(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StartTaskResponse>)> {
    let mut items: Vec<ImageItem> = Vec::new();
    let mut invalid: Vec<InvalidImage> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Multipart(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Multipart(e.to_string()))?;

        if items.iter().any(|item| item.name == filename) {
            invalid.push(InvalidImage {
                filename,
                error: validate::ValidationError::DuplicateName.to_string(),
            });
            continue;
        }

        match validate::validate_image(
            &filename,
            &bytes,
            &state.config.upload.allowed_extensions,
            state.config.upload.max_image_bytes,
        ) {
            Ok(()) => items.push(ImageItem {
                name: filename,
                bytes: bytes.to_vec(),
            }),
            Err(e) => {
                tracing::debug!("rejecting upload {:?}: {}", filename, e);
                invalid.push(InvalidImage {
                    filename,
                    error: e.to_string(),
                });
            }
        }
    }

    if items.is_empty() {
        return match invalid.into_iter().next() {
            Some(first) => Err(ApiError::NoValidImage {
                filename: first.filename,
            }),
            None => Err(ApiError::NoImageProvided),
        };
    }

    let envelope = TaskEnvelope::new(items);
    let task_id = envelope.id;
    let images = envelope.item_names();

    // Pending record first, so a poll that races the publish sees PENDING
    // rather than NotFound.
    state.results.create(TaskRecord::pending(&envelope)).await?;

    if let Err(e) = state.broker.publish(envelope).await {
        // No orphaned Pending record may survive a failed publish.
        let _ = state.results.remove(task_id).await;
        return Err(ApiError::Transport(e));
    }

    tracing::info!("accepted task {} with {} image(s)", task_id, images.len());

    Ok((
        StatusCode::ACCEPTED,
        Json(StartTaskResponse {
            task_id,
            images,
            status: TaskState::Pending,
            invalid_images: invalid,
        }),
    ))
}

/// GET /task_status/:task_id - lifecycle state only.
async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>> {
    let record = lookup(&state, &task_id).await?;
    Ok(Json(TaskStatusResponse {
        task_id: record.id,
        status: record.state,
    }))
}

/// GET /task_result/:task_id - state plus result or error once terminal.
async fn task_result(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResultResponse>> {
    let record = lookup(&state, &task_id).await?;
    Ok(Json(TaskResultResponse::from_record(&record)))
}

async fn lookup(state: &AppState, raw_id: &str) -> Result<TaskRecord> {
    let id = Uuid::parse_str(raw_id)
        .map_err(|_| ApiError::TaskNotFound(raw_id.to_string()))?;
    state
        .results
        .get(id)
        .await
        .map_err(|_| ApiError::TaskNotFound(raw_id.to_string()))
}

/// GET / - capability document.
async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "visionq",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "start_task": "POST /start_task - multipart upload, one or more images under field 'file'",
            "task_status": "GET /task_status/{task_id}",
            "task_result": "GET /task_result/{task_id}",
        },
        "polling": "poll task_result with exponential backoff, e.g. 250ms doubling up to 5s",
    }))
}

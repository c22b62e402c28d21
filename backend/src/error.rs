//! Error types for the HTTP gateway.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use visionq_common::ErrorResponse;

use crate::broker::TransportError;
use crate::store::StoreError;

/// Errors surfaced by the HTTP gateway.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image provided")]
    NoImageProvided,

    #[error("No valid image provided")]
    NoValidImage { filename: String },

    #[error("task id does not exist: {0}")]
    TaskNotFound(String),

    #[error("Malformed multipart request: {0}")]
    Multipart(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Result store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NoImageProvided
            | ApiError::NoValidImage { .. }
            | ApiError::Multipart(_) => StatusCode::BAD_REQUEST,
            ApiError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let filename = match &self {
            ApiError::NoValidImage { filename } => Some(filename.clone()),
            _ => None,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
            filename,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

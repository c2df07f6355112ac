use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::upload::UploadError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Error envelope returned by an ipc handler.
    #[error("{message}")]
    Handler { code: String, message: String },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> &str {
        match self {
            AppError::Handler { code, .. } => code,
            AppError::BadRequest(_) => "bad_params",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Upload(_) => "upload_failed",
            AppError::Internal(_) => "internal",
        }
    }
}

pub fn status_for_code(code: &str) -> StatusCode {
    match code {
        "bad_params" => StatusCode::BAD_REQUEST,
        "unauthorized" => StatusCode::UNAUTHORIZED,
        "not_found" => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = status_for_code(self.code());
        if status.is_server_error() {
            error!(code = self.code(), "request failed: {self}");
        }
        let body = json!({
            "success": false,
            "code": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

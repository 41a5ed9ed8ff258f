use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MoodboardError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Document not found: {0}")]
    DocumentMissing(String),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Writes are disabled in local-only mode")]
    ReadOnly,

    #[error("Content has not been loaded yet")]
    NotLoaded,

    #[error("View has been torn down")]
    TornDown,

    #[error("View not found: {0}")]
    ViewNotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl MoodboardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MoodboardError::ViewNotFound(_) | MoodboardError::DocumentMissing(_) => {
                StatusCode::NOT_FOUND
            }
            MoodboardError::ReadOnly | MoodboardError::NotLoaded | MoodboardError::TornDown => {
                StatusCode::CONFLICT
            }
            MoodboardError::InvalidPath(_) | MoodboardError::Config(_) => StatusCode::BAD_REQUEST,
            MoodboardError::Identity(_) | MoodboardError::Store(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl serde::Serialize for MoodboardError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl IntoResponse for MoodboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, MoodboardError>;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Failure of a live fetch from an upstream source.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid subreddit name {0:?}")]
    InvalidSubreddit(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("export error: {0}")]
    Export(String),
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Export(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Export(err.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn error_response(&self) -> HttpResponse {
        tracing::error!(error = %self, "request failed");
        let body = match self {
            AppError::Database(_) => "Failed to access favorites",
            AppError::Export(_) => "Failed to build export",
        };
        HttpResponse::build(self.status_code()).body(body)
    }
}

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use verdist_service::{ErrorKind, ServiceError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] verdist_store::StoreError),

    #[error("index error: {0}")]
    Index(#[from] verdist_index::IndexError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;

/// JSON body of every error response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Failure of a single HTTP request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("{0}")]
    BadRequest(String),

    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("update stream is not enabled on this service")]
    FeedDisabled,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(e) => status_for(e.kind()),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::FeedDisabled => StatusCode::NOT_FOUND,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Service(e) => e.kind().as_str(),
            Self::BadRequest(_) | Self::Multipart(_) => ErrorKind::Validation.as_str(),
            Self::FeedDisabled => ErrorKind::NotFound.as_str(),
        }
    }
}

/// Transport status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::IntegrityFault | ErrorKind::Unavailable => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.label().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

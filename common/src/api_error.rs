use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: file not found")]
    FileNotFound,
    #[error("not found: fragment not found")]
    FragmentNotFound,
    #[error("conflict: file already exists")]
    FileAlreadyExists,
    #[error("conflict: upload already in progress")]
    UploadInProgress,
    #[error("conflict: shard node already registered")]
    ShardAlreadyRegistered,
    #[error("conflict: no shard nodes registered")]
    EmptyRoster,
    #[error("conflict: file upload has not completed")]
    NotReady,
    #[error("batch timed out after {0:?}")]
    BatchTimeout(Duration),
    #[error("upstream request failed: {0}")]
    UpstreamReq(reqwest::Error),
    #[error("upstream status: {0}")]
    UpstreamStatus(reqwest::StatusCode),
    /// A failed operation whose cleanup failed as well. Both causes are kept.
    #[error("{primary}; rollback failed: {cleanup}")]
    RollbackFailed {
        primary: Box<ApiError>,
        cleanup: Box<ApiError>,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FileNotFound => StatusCode::NOT_FOUND,
            ApiError::FragmentNotFound => StatusCode::NOT_FOUND,
            ApiError::FileAlreadyExists => StatusCode::CONFLICT,
            ApiError::UploadInProgress => StatusCode::CONFLICT,
            ApiError::ShardAlreadyRegistered => StatusCode::CONFLICT,
            ApiError::EmptyRoster => StatusCode::CONFLICT,
            ApiError::NotReady => StatusCode::CONFLICT,
            ApiError::BatchTimeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UpstreamReq(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::UpstreamStatus(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::RollbackFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Any(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Merges the outcome of a cleanup step into this error.
    ///
    /// A cleanup that found nothing to clean (`FileNotFound`) counts as success.
    pub fn with_cleanup(self, cleanup: Result<(), ApiError>) -> ApiError {
        match cleanup {
            Ok(()) | Err(ApiError::FileNotFound) => self,
            Err(cleanup) => ApiError::RollbackFailed {
                primary: Box::new(self),
                cleanup: Box::new(cleanup),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

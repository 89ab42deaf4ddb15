use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A point lookup, update, delete or singular aggregate had nothing to act on.
    #[error("{0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    /// The external catalog could not be reached or answered with garbage.
    #[error("catalog upstream: {0}")]
    Upstream(String),

    #[error("storage: {0}")]
    Storage(#[from] sea_orm::DbErr),

    #[error("corrupt stored document: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) | AppError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<wreq::Error> for AppError {
    fn from(err: wreq::Error) -> Self {
        Self::Upstream(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody { error: self.to_string(), status: status.as_u16() };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::counter::CounterError;

pub type AppResult<T> = Result<T, AppError>;

/// Failure body sent to clients. The cause only goes to the logs.
pub const FAILURE_BODY: &str = "Something went wrong";

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl From<CounterError> for AppError {
    fn from(value: CounterError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: value.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error: {:#}", self.error);
        (self.status, FAILURE_BODY).into_response()
    }
}

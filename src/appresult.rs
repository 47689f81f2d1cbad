use axum::{http::StatusCode, response::{IntoResponse, Response}};
use tracing::error;

use crate::CarpoolError;

pub type AppResult<T> = Result<T, AppError>;

/// Handler failure. Gateway errors keep their own status; anything else is a 500.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<CarpoolError>() {
            Some(CarpoolError::DomainRestricted | CarpoolError::Auth(_)) => StatusCode::BAD_REQUEST,
            Some(CarpoolError::NotSignedIn) => StatusCode::UNAUTHORIZED,
            Some(CarpoolError::Store { .. } | CarpoolError::Http(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        error!(%status, "request failed: {:#}\n{}", self.0, self.0.backtrace());
        (status, self.0.to_string()).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

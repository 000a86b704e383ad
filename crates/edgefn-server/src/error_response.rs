//! The sole translator from a structured [`EdgeError`] kind to an HTTP
//! status code (spec §7: "only the outermost HTTP layer translates kinds
//! to status codes"). Every handler returns `Result<T, ApiError>` and lets
//! `?` do the rest, mirroring the teacher's `Result<_, ErrorMetadata>` ->
//! `IntoResponse` handler convention.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use edgefn_errors::{EdgeError, ErrorBody, ErrorKind};

pub struct ApiError(pub EdgeError);

impl From<EdgeError> for ApiError {
    fn from(err: EdgeError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match edgefn_errors::downcast(&err) {
            Some(edge) => Self(edge.clone()),
            None => Self(EdgeError::store_error(err.to_string())),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind {
            // §7: "endpoint yields the handler's own status if present,
            // else 500" -- the handler's own status is attached as the
            // outcome's `http_status`, which bypasses this path entirely
            // (see `routes::functions::invoke`); by the time an
            // `ExecutionError` reaches here there was no handler status.
            ErrorKind::ExecutionError => StatusCode::INTERNAL_SERVER_ERROR,
            other => other.http_status(),
        };
        let body = ErrorBody::from(&self.0);
        tracing::warn!(kind = ?self.0.kind, msg = %self.0.msg, "request failed");
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

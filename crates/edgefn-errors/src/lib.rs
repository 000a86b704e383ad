//! Structured errors shared across the edge-function core.
//!
//! Every fallible operation in the bundler, invoker, scheduler, and store
//! returns (or wraps) an [`EdgeError`] rather than a bare `anyhow::Error`, so
//! that the outermost HTTP layer is the only place that translates a failure
//! into a status code. See `ErrorKind` for the full stable tag set.

use std::borrow::Cow;

use http::StatusCode;
use serde::Serialize;

/// Stable, structured error kind. Used for status-code mapping, metrics
/// tagging, and string matching in tests (`err.kind() == ErrorKind::NotFound`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidName,
    InvalidCode,
    NotFound,
    AlreadyExists,
    BundleError,
    BundleSecurity,
    BundleSize,
    BundleTimeout,
    FunctionDisabled,
    AuthRequired,
    ExecutionTimeout,
    Cancelled,
    ExecutionError,
    StoreError,
}

impl ErrorKind {
    /// Default HTTP status for this kind. Handlers may override for kinds
    /// whose status depends on the handler's own response (`ExecutionError`).
    pub fn http_status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidName | ErrorKind::InvalidCode => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::AlreadyExists => StatusCode::CONFLICT,
            ErrorKind::BundleError
            | ErrorKind::BundleSecurity
            | ErrorKind::BundleSize
            | ErrorKind::BundleTimeout => StatusCode::BAD_REQUEST,
            ErrorKind::FunctionDisabled => StatusCode::FORBIDDEN,
            ErrorKind::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorKind::ExecutionTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Cancelled => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ExecutionError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::StoreError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error object attachable to an `anyhow` chain via `.context(e /*
/// EdgeError */)`, or returned directly. Mirrors the short_msg/msg split so
/// that `short_msg` stays stable across copy changes and is safe to assert
/// on in tests, while `msg` is the human-facing detail.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{msg}")]
pub struct EdgeError {
    pub kind: ErrorKind,
    /// ScreamingCamelCase short tag, e.g. `BundleSecurity`. Stable for tests.
    pub short_msg: Cow<'static, str>,
    pub msg: Cow<'static, str>,
}

impl EdgeError {
    pub fn new(
        kind: ErrorKind,
        short_msg: impl Into<Cow<'static, str>>,
        msg: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            kind,
            short_msg: short_msg.into(),
            msg: msg.into(),
        }
    }

    pub fn not_found(resource: impl std::fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, "NotFound", format!("{resource} not found"))
    }

    pub fn already_exists(resource: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::AlreadyExists,
            "AlreadyExists",
            format!("{resource} already exists"),
        )
    }

    pub fn invalid_name(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidName, "InvalidName", msg)
    }

    pub fn invalid_code(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::InvalidCode, "InvalidCode", msg)
    }

    pub fn bundle_security(specifier: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::BundleSecurity,
            "BundleSecurity",
            format!("import of blocked module \"{specifier}\" is not allowed"),
        )
    }

    pub fn bundle_size(bytes: usize, limit: usize) -> Self {
        Self::new(
            ErrorKind::BundleSize,
            "BundleSize",
            format!("bundled artifact is {bytes} bytes, exceeding the {limit} byte limit"),
        )
    }

    pub fn bundle_timeout() -> Self {
        Self::new(
            ErrorKind::BundleTimeout,
            "BundleTimeout",
            "bundling timed out; your function's dependency graph may be too large",
        )
    }

    pub fn bundle_error(details: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::BundleError, "BundleError", details)
    }

    pub fn function_disabled(name: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::FunctionDisabled,
            "FunctionDisabled",
            format!("function \"{name}\" is disabled"),
        )
    }

    pub fn auth_required() -> Self {
        Self::new(
            ErrorKind::AuthRequired,
            "AuthRequired",
            "this function requires authentication",
        )
    }

    pub fn execution_timeout(seconds: u64) -> Self {
        Self::new(
            ErrorKind::ExecutionTimeout,
            "ExecutionTimeout",
            format!("execution timed out after {seconds}s"),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Cancelled", "execution was cancelled")
    }

    pub fn execution_error(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::ExecutionError, "ExecutionError", msg)
    }

    pub fn store_error(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::StoreError, "StoreError", msg)
    }

    pub fn short_msg(&self) -> &str {
        &self.short_msg
    }
}

/// Payload shape for 400-with-details responses (bundle failures).
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub details: Option<String>,
}

impl From<&EdgeError> for ErrorBody {
    fn from(e: &EdgeError) -> Self {
        ErrorBody {
            error: e.short_msg.to_string(),
            details: Some(e.msg.to_string()),
        }
    }
}

/// Pull an [`EdgeError`] back out of an `anyhow` chain, the same pattern the
/// teacher uses for `ErrorMetadata` (`anyhow::Error::downcast_ref`).
pub fn downcast(err: &anyhow::Error) -> Option<&EdgeError> {
    err.chain().find_map(|cause| cause.downcast_ref::<EdgeError>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_finds_wrapped_error() {
        let inner = EdgeError::not_found("function \"foo\"");
        let wrapped: anyhow::Error = anyhow::Error::new(inner.clone()).context("while resolving");
        assert_eq!(downcast(&wrapped), Some(&inner));
    }

    #[test]
    fn cancelled_is_distinct_from_timeout() {
        assert_ne!(EdgeError::cancelled().kind, EdgeError::execution_timeout(30).kind);
    }

    #[test]
    fn status_codes_match_spec() {
        assert_eq!(ErrorKind::AuthRequired.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::FunctionDisabled.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::ExecutionTimeout.http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorKind::Cancelled.http_status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorKind::AlreadyExists.http_status(), StatusCode::CONFLICT);
    }
}

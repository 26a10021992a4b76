//! Uniform error taxonomy (spec §7), bubbled as `Result<T, AppError>` and
//! mapped to HTTP status codes at the boundary. Internal detail is logged
//! server-side only; clients get a sanitized message plus a stable code.
//!
//! `deposit_mismatch`, `deposit_orphan`, `distribution_partial`, and
//! `expired` from the spec's taxonomy are state transitions recorded on the
//! order/batch/unmatched-deposit records themselves (see `types.rs`,
//! `deposit_matcher.rs`, `lifecycle.rs`) rather than HTTP-facing errors —
//! they never reach a request handler as a failure to report.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

#[derive(Debug)]
pub enum AppError {
    /// Validation failure at submit time.
    BadInput(String),
    /// Unknown order/batch/deposit.
    NotFound(String),
    /// Action illegal in the entity's current state (e.g. execute when not ready).
    StateConflict(String),
    /// VenueExecutor returned an error or timed out.
    VenueFailure(String),
    /// ProofGenerator generation/verification failure.
    ProofFailure(String),
    /// Unexpected internal error; caller may retry.
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StateConflict(_) => StatusCode::CONFLICT,
            AppError::VenueFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ProofFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            AppError::BadInput(_) => "bad_input",
            AppError::NotFound(_) => "not_found",
            AppError::StateConflict(_) => "state_conflict",
            AppError::VenueFailure(_) => "venue_failure",
            AppError::ProofFailure(_) => "proof_failure",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Sanitized message shown to clients; internal detail is logged, not echoed.
    fn public_message(&self) -> &'static str {
        match self {
            AppError::BadInput(_) => "invalid request",
            AppError::NotFound(_) => "not found",
            AppError::StateConflict(_) => "action not valid in current state",
            AppError::VenueFailure(_) => "execution failed",
            AppError::ProofFailure(_) => "proof generation failed",
            AppError::Internal(_) => "internal error",
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadInput(msg) => write!(f, "bad input: {msg}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::StateConflict(msg) => write!(f, "state conflict: {msg}"),
            AppError::VenueFailure(msg) => write!(f, "venue failure: {msg}"),
            AppError::ProofFailure(msg) => write!(f, "proof failure: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::VenueFailure(_) | AppError::ProofFailure(_) | AppError::Internal(_) => {
                error!(error = %self, "request failed");
            }
            _ => {}
        }

        let status = self.status_code();
        let body = json!({
            "error": self.public_message(),
            "code": self.error_code(),
        });
        (status, axum::Json(body)).into_response()
    }
}

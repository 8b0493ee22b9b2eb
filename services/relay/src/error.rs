use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use geoproof_ledger::SubmitError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("geohash7 {claimed} does not match public inputs cell {derived}")]
    GeohashMismatch { claimed: String, derived: String },

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

impl RelayError {
    pub fn invalid(field: &'static str, reason: impl ToString) -> Self {
        RelayError::InvalidField {
            field,
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MalformedRequest(_) => "malformed_request",
            RelayError::InvalidField { .. } => "invalid_field",
            RelayError::GeohashMismatch { .. } => "geohash_mismatch",
            RelayError::Submit(e) => e.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Submit(e) if !e.is_client_error() => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Relay request failed");
        }
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

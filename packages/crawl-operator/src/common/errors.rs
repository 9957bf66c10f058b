use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Failures at the webhook boundary.
///
/// Reconciliation never reports these for a well-formed request; they only
/// surface when the controller hands us an object we cannot interpret.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Malformed parent object: {0}")]
    MalformedParent(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid id in {field}: {source}")]
    InvalidId {
        field: &'static str,
        #[source]
        source: uuid::Error,
    },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for OperatorError {
    fn into_response(self) -> Response {
        let status = match &self {
            OperatorError::MalformedParent(_)
            | OperatorError::MissingField(_)
            | OperatorError::InvalidId { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            OperatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        tracing::warn!(error = %self, status = %status, "rejecting webhook request");

        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}

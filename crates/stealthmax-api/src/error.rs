//! Error responses.
//!
//! Every failure leaves the API as
//! `{ "success": false, "error": ..., "message"?: ..., "timestamp": ... }`
//! with the status chosen from the error kind.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use stealthmax_types::StealthError;

/// A [`StealthError`] plus the fallback label of the endpoint that hit it.
#[derive(Debug)]
pub struct ApiError {
    /// Used as `error` for failures without a more specific status.
    pub context: &'static str,
    pub source: StealthError,
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    timestamp: DateTime<Utc>,
}

impl ApiError {
    /// Adapter for `map_err`.
    pub fn context(context: &'static str) -> impl FnOnce(StealthError) -> Self {
        move |source| Self { context, source }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            context: "Invalid request",
            source: StealthError::InvalidRequest(message.into()),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.source {
            StealthError::InvalidRequest(_) | StealthError::InvalidAddress(_) => {
                StatusCode::BAD_REQUEST
            }
            StealthError::NameTaken(_) => StatusCode::CONFLICT,
            StealthError::Authentication(_) => StatusCode::UNAUTHORIZED,
            StealthError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, message) = match &self.source {
            StealthError::InvalidRequest(msg) => (msg.clone(), None),
            StealthError::NameTaken(_)
            | StealthError::Authentication(_)
            | StealthError::Network(_) => {
                (self.source.label().to_string(), Some(self.source.to_string()))
            }
            other => (self.context.to_string(), Some(other.to_string())),
        };
        ErrorBody {
            success: false,
            error,
            message,
            timestamp: Utc::now(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, context = self.context, error = %self.source, "Request failed");
        } else {
            tracing::info!(status = %status, error = %self.source, "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

/// A settlement that ran but did not deposit.
pub(crate) fn failed_settlement(error: Option<String>) -> Response {
    let body = ErrorBody {
        success: false,
        error: error.unwrap_or_else(|| "Failed to deposit to INTMAX".into()),
        message: None,
        timestamp: Utc::now(),
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

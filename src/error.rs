//! ==============================================================================
//! error.rs - errors returned by hub operations
//! ==============================================================================
//!
//! every variant is recoverable at the call boundary. subscriber failures and
//! stream transport failures never reach a caller, so they are not here: the
//! dispatcher and the stream gateway log and contain them.
//!
//! ==============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::domain::Metric;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HubError {
    /// malformed input rejected before any state change
    #[error("invalid sensor data: {0}")]
    Validation(String),

    #[error("sensor {0} not found")]
    NotFound(String),

    /// relative adjustment of a metric the sensor does not report
    #[error("sensor {sensor_id} does not report {metric}")]
    UnsupportedMetric { sensor_id: String, metric: Metric },
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            HubError::Validation(_) => StatusCode::BAD_REQUEST,
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::UnsupportedMetric { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}

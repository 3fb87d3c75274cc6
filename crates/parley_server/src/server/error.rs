#![forbid(unsafe_code)]

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy for the HTTP surface and the WebSocket upgrade path.
///
/// Every variant maps to one status code and a JSON `{"detail": ...}` body.
/// Store and plumbing failures surface as `Internal` with the detail hidden
/// from the client.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("{0}")]
	Auth(String),

	#[error("{0}")]
	Permission(String),

	#[error("{0}")]
	NotFound(String),

	#[error("{0}")]
	Validation(String),

	#[error(transparent)]
	Internal(#[from] anyhow::Error),
}

impl ApiError {
	pub fn status(&self) -> StatusCode {
		match self {
			ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
			ApiError::Permission(_) => StatusCode::FORBIDDEN,
			ApiError::NotFound(_) => StatusCode::NOT_FOUND,
			ApiError::Validation(_) => StatusCode::BAD_REQUEST,
			ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		let detail = match &self {
			ApiError::Internal(e) => {
				error!(error = %e, "request failed");
				metrics::counter!("parley_server_internal_errors_total").increment(1);
				"internal server error".to_string()
			}
			other => other.to_string(),
		};

		(status, Json(json!({ "detail": detail }))).into_response()
	}
}

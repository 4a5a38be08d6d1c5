//! Maps `CatalogError` to the `{"error": {"code", "message", "details"}}`
//! envelope and HTTP status (§7).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalog_core::CatalogError;
use serde_json::{json, Value};

pub struct ApiError {
	inner: CatalogError,
	details: Value,
}

impl ApiError {
	pub fn with_details(inner: CatalogError, details: Value) -> Self {
		Self { inner, details }
	}

	fn status(&self) -> StatusCode {
		match &self.inner {
			CatalogError::InvalidHash(_)
			| CatalogError::InvalidQuery(_)
			| CatalogError::InvalidBody(_)
			| CatalogError::InvalidJson(_)
			| CatalogError::MissingFile
			| CatalogError::EmptyUpload
			| CatalogError::HashMismatch { .. } => StatusCode::BAD_REQUEST,
			CatalogError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
			CatalogError::AssetNotFound(_) | CatalogError::FileNotFound => StatusCode::NOT_FOUND,
			CatalogError::BackendUnsupported(_) => StatusCode::NOT_IMPLEMENTED,
			CatalogError::UploadIo(_) | CatalogError::Database(_) | CatalogError::Internal(_) => {
				StatusCode::INTERNAL_SERVER_ERROR
			}
		}
	}
}

impl From<CatalogError> for ApiError {
	fn from(inner: CatalogError) -> Self {
		Self { inner, details: json!({}) }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status == StatusCode::INTERNAL_SERVER_ERROR {
			tracing::error!(error = %self.inner, "request failed");
		} else {
			tracing::debug!(error = %self.inner, code = self.inner.code(), "request rejected");
		}
		let body = json!({
			"error": {
				"code": self.inner.code(),
				"message": self.inner.to_string(),
				"details": self.details,
			}
		});
		(status, Json(body)).into_response()
	}
}

pub type ApiResult<T> = Result<T, ApiError>;

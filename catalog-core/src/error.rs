//! Domain error type for the catalog, one variant per §7 error code.

use thiserror::Error;

pub type CatalogResult<T = ()> = Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
	#[error("invalid hash: {0}")]
	InvalidHash(String),

	#[error("invalid query: {0}")]
	InvalidQuery(String),

	#[error("invalid body: {0}")]
	InvalidBody(String),

	#[error("invalid json: {0}")]
	InvalidJson(String),

	#[error("missing file")]
	MissingFile,

	#[error("empty upload")]
	EmptyUpload,

	#[error("hash mismatch: expected {expected}, got {actual}")]
	HashMismatch { expected: String, actual: String },

	#[error("unsupported media type: {0}")]
	UnsupportedMediaType(String),

	#[error("asset not found: {0}")]
	AssetNotFound(String),

	#[error("file not found on disk")]
	FileNotFound,

	#[error("backend unsupported: {0}")]
	BackendUnsupported(String),

	#[error("upload i/o error: {0}")]
	UploadIo(String),

	#[error("database error: {0}")]
	Database(#[from] sea_orm::DbErr),

	#[error("internal error: {0}")]
	Internal(String),
}

impl CatalogError {
	/// The stable machine-readable error code used in the HTTP `{"error": {"code": ...}}` envelope.
	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidHash(_) => "INVALID_HASH",
			Self::InvalidQuery(_) => "INVALID_QUERY",
			Self::InvalidBody(_) => "INVALID_BODY",
			Self::InvalidJson(_) => "INVALID_JSON",
			Self::MissingFile => "MISSING_FILE",
			Self::EmptyUpload => "EMPTY_UPLOAD",
			Self::HashMismatch { .. } => "HASH_MISMATCH",
			Self::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
			Self::AssetNotFound(_) => "ASSET_NOT_FOUND",
			Self::FileNotFound => "FILE_NOT_FOUND",
			Self::BackendUnsupported(_) => "BACKEND_UNSUPPORTED",
			Self::UploadIo(_) => "UPLOAD_IO_ERROR",
			Self::Database(_) | Self::Internal(_) => "INTERNAL",
		}
	}

	pub fn internal<T: std::fmt::Display>(msg: T) -> Self {
		Self::Internal(msg.to_string())
	}
}

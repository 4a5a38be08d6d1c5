//! Multipart upload adapter (§4.4 upload orchestration, §6 `POST /api/assets`).
//!
//! axum's built-in `Multipart` extractor stands in for the "external
//! multipart parser" the spec scopes out of the core (§1); this module's
//! only job is turning it into the plain Rust values `catalog-core::ingest`
//! expects, nothing more.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use catalog_core::error::CatalogError;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::ApiError;

/// A `Multipart` extractor that rejects non-multipart bodies with the
/// spec's `415 UNSUPPORTED_MEDIA_TYPE` instead of axum's default rejection
/// body, and wraps other parse failures as `INVALID_BODY`.
pub struct ValidatedMultipart(pub Multipart);

#[axum::async_trait]
impl<S> FromRequest<S> for ValidatedMultipart
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		let content_type = req
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.unwrap_or("")
			.to_string();
		if !content_type.starts_with("multipart/form-data") {
			return Err(ApiError::from(CatalogError::UnsupportedMediaType(content_type)));
		}
		let multipart = Multipart::from_request(req, state)
			.await
			.map_err(|e| ApiError::from(CatalogError::InvalidBody(e.to_string())))?;
		Ok(ValidatedMultipart(multipart))
	}
}

/// Each upload gets a fresh uuid-named subdirectory under the system temp
/// directory (§5); a dropped guard best-effort-removes it so an aborted
/// upload never leaks a temp file.
pub struct TempUploadDir {
	dir: PathBuf,
	released: bool,
}

impl TempUploadDir {
	pub async fn create() -> Result<Self, ApiError> {
		let dir = std::env::temp_dir().join(format!("catalog-upload-{}", Uuid::new_v4()));
		tokio::fs::create_dir_all(&dir)
			.await
			.map_err(|e| ApiError::from(CatalogError::UploadIo(e.to_string())))?;
		Ok(Self { dir, released: false })
	}

	pub fn path(&self) -> &Path {
		&self.dir
	}

	/// Call once the staged file has been handed off (moved into place or
	/// deleted by the ingest layer) so `Drop` doesn't try to remove it again.
	pub fn release(mut self) {
		self.released = true;
	}
}

impl Drop for TempUploadDir {
	fn drop(&mut self) {
		if self.released {
			return;
		}
		let dir = self.dir.clone();
		tokio::spawn(async move {
			if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
				tracing::warn!(error = %e, dir = %dir.display(), "failed to clean up upload temp dir");
			}
		});
	}
}

/// The fields lifted out of a multipart body, before any cross-field
/// validation (tag contract, metadata shape) is applied.
#[derive(Debug, Default)]
pub struct RawUpload {
	pub temp_file_path: Option<PathBuf>,
	pub client_filename: Option<String>,
	pub tags: Vec<String>,
	pub name: Option<String>,
	pub expected_hash: Option<String>,
	pub user_metadata_raw: Option<String>,
}

async fn field_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
	field
		.text()
		.await
		.map_err(|e| ApiError::from(CatalogError::InvalidBody(e.to_string())))
}

/// Stream the `file` field's bytes to `dest`, returning the total size.
async fn stream_field_to_file(
	mut field: axum::extract::multipart::Field<'_>,
	dest: &Path,
) -> Result<i64, ApiError> {
	let mut out = tokio::fs::File::create(dest)
		.await
		.map_err(|e| ApiError::from(CatalogError::UploadIo(e.to_string())))?;
	let mut size: i64 = 0;
	loop {
		let chunk: Option<Bytes> = field
			.chunk()
			.await
			.map_err(|e| ApiError::from(CatalogError::UploadIo(e.to_string())))?;
		let Some(chunk) = chunk else { break };
		size += chunk.len() as i64;
		out.write_all(&chunk)
			.await
			.map_err(|e| ApiError::from(CatalogError::UploadIo(e.to_string())))?;
	}
	out.flush().await.map_err(|e| ApiError::from(CatalogError::UploadIo(e.to_string())))?;
	Ok(size)
}

/// Drain the fields of a `multipart/form-data` body into [`RawUpload`],
/// writing the `file` field (if present) under `temp_dir`.
pub async fn parse_multipart(mut multipart: Multipart, temp_dir: &Path) -> Result<RawUpload, ApiError> {
	let mut raw = RawUpload::default();

	while let Some(field) = multipart
		.next_field()
		.await
		.map_err(|e| ApiError::from(CatalogError::InvalidBody(e.to_string())))?
	{
		let name = field.name().unwrap_or("").to_string();
		match name.as_str() {
			"file" => {
				raw.client_filename = field.file_name().map(|s| s.to_string());
				let dest = temp_dir.join("payload");
				let size = stream_field_to_file(field, &dest).await?;
				if size == 0 {
					return Err(ApiError::from(CatalogError::EmptyUpload));
				}
				raw.temp_file_path = Some(dest);
			}
			"tags" => {
				let text = field_text(field).await?;
				raw.tags
					.extend(text.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()));
			}
			"name" => {
				let text = field_text(field).await?;
				if !text.is_empty() {
					raw.name = Some(text);
				}
			}
			"hash" => {
				let text = field_text(field).await?;
				if !text.is_empty() {
					raw.expected_hash = Some(text);
				}
			}
			"user_metadata" => {
				raw.user_metadata_raw = Some(field_text(field).await?);
			}
			_ => {
				// Unknown field: drain and discard.
				let _ = field.bytes().await;
			}
		}
	}

	Ok(raw)
}

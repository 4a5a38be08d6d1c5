//! Chunked file streaming for `GET /api/assets/{id}/content` (§4.8).
//!
//! Mirrors the teacher's `core/crates/custom-uri/src/serve_file.rs`:
//! `tokio_util::io::ReaderStream` at a 64 KiB capacity, with both
//! `Content-Disposition` forms set for non-ASCII names.

use axum::body::Body;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use catalog_core::download::ResolvedContent;
use tokio_util::io::ReaderStream;

use crate::error::ApiError;

const CHUNK_CAPACITY: usize = 64 * 1024;

fn content_disposition(kind: &str, download_name: &str) -> String {
	let ascii_fallback: String = download_name
		.chars()
		.map(|c| if c.is_ascii() && c != '"' { c } else { '_' })
		.collect();
	let encoded = percent_encode_filename(download_name);
	format!("{kind}; filename=\"{ascii_fallback}\"; filename*=UTF-8''{encoded}")
}

/// Minimal RFC 5987 `attr-char` percent-encoder — no external crate needed
/// for the narrow set of characters a filename can contain.
fn percent_encode_filename(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for byte in input.as_bytes() {
		match byte {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => out.push(*byte as char),
			_ => out.push_str(&format!("%{byte:02X}")),
		}
	}
	out
}

/// Build the streamed `200 OK` response for a resolved download.
pub async fn stream_response(resolved: ResolvedContent, disposition: &str) -> Result<Response, ApiError> {
	let file = tokio::fs::File::open(&resolved.path)
		.await
		.map_err(|_| ApiError::from(catalog_core::error::CatalogError::FileNotFound))?;
	let metadata = file
		.metadata()
		.await
		.map_err(|_| ApiError::from(catalog_core::error::CatalogError::FileNotFound))?;

	let stream = ReaderStream::with_capacity(file, CHUNK_CAPACITY);
	let body = Body::from_stream(stream);

	let mut response = Response::builder()
		.status(StatusCode::OK)
		.header(CONTENT_TYPE, resolved.content_type.clone())
		.header(CONTENT_LENGTH, metadata.len())
		.header(CONTENT_DISPOSITION, content_disposition(disposition, &resolved.download_name))
		.body(body)
		.expect("response parts are all valid header values");

	response.headers_mut().remove("transfer-encoding");
	Ok(response.into_response())
}

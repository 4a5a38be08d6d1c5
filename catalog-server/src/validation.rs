//! Schema validation at the HTTP boundary (§6 "Upload validation rules").
//!
//! The query/body shapes here are axum's job because the spec scopes the
//! HTTP framework itself out of the core (§1) — `catalog-core` never sees
//! a raw query string or JSON body, only already-validated Rust values.

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use catalog_core::error::CatalogError;
use catalog_core::query::{ListFilter, SortKey, SortOrder};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;

/// A path-parameter UUID, rejecting anything but the canonical hyphenated
/// form (§6 "UUID path parameters validated against the canonical
/// hyphenated form").
pub struct UuidPath(pub Uuid);

fn is_canonical_hyphenated(s: &str) -> bool {
	s.len() == 36
		&& s.as_bytes()[8] == b'-'
		&& s.as_bytes()[13] == b'-'
		&& s.as_bytes()[18] == b'-'
		&& s.as_bytes()[23] == b'-'
		&& s.chars().enumerate().all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) || c.is_ascii_hexdigit())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for UuidPath
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		let Path(raw) = Path::<String>::from_request_parts(parts, state)
			.await
			.map_err(|_| ApiError::from(CatalogError::InvalidBody("missing id path parameter".to_string())))?;
		if !is_canonical_hyphenated(&raw) {
			return Err(ApiError::from(CatalogError::InvalidBody(format!(
				"\"{raw}\" is not a canonical hyphenated uuid"
			))));
		}
		let id = Uuid::parse_str(&raw)
			.map_err(|_| ApiError::from(CatalogError::InvalidBody(format!("\"{raw}\" is not a valid uuid"))))?;
		Ok(UuidPath(id))
	}
}

/// The caller's opaque owner id (§1, §6). Authentication is out of scope;
/// the host is trusted to set this header after doing its own auth.
pub fn owner_id_from_headers(headers: &HeaderMap) -> String {
	headers
		.get("x-owner-id")
		.and_then(|v| v.to_str().ok())
		.unwrap_or("")
		.to_string()
}

/// All query pairs as `(key, value)`, preserving repeats — lets
/// `include_tags=a&include_tags=b` and `include_tags=a,b` both work.
pub type RawQueryPairs = Vec<(String, String)>;

fn values_for<'a>(pairs: &'a RawQueryPairs, key: &str) -> Vec<&'a str> {
	pairs.iter().filter(|(k, _)| k == key).map(|(_, v)| v.as_str()).collect()
}

/// CSV-or-repeated tag list for a given query key, normalized to lowercase
/// trimmed strings with empties dropped.
fn tag_list(pairs: &RawQueryPairs, key: &str) -> Vec<String> {
	values_for(pairs, key)
		.into_iter()
		.flat_map(|v| v.split(','))
		.map(|s| s.trim().to_lowercase())
		.filter(|s| !s.is_empty())
		.collect()
}

fn single(pairs: &RawQueryPairs, key: &str) -> Option<String> {
	values_for(pairs, key).first().map(|s| s.to_string())
}

fn parse_clamped_limit(pairs: &RawQueryPairs, default: u64, min: u64, max: u64) -> Result<u64, ApiError> {
	match single(pairs, "limit") {
		None => Ok(default),
		Some(raw) => {
			let n: u64 = raw
				.parse()
				.map_err(|_| ApiError::from(CatalogError::InvalidQuery(format!("limit \"{raw}\" is not a number"))))?;
			if n < min || n > max {
				return Err(ApiError::from(CatalogError::InvalidQuery(format!(
					"limit must be between {min} and {max}"
				))));
			}
			Ok(n)
		}
	}
}

fn parse_offset(pairs: &RawQueryPairs) -> Result<u64, ApiError> {
	match single(pairs, "offset") {
		None => Ok(0),
		Some(raw) => raw
			.parse()
			.map_err(|_| ApiError::from(CatalogError::InvalidQuery(format!("offset \"{raw}\" is not a number")))),
	}
}

/// `GET /api/assets` query parameters, validated and turned into a
/// [`ListFilter`] the query layer understands.
pub fn parse_list_filter(pairs: &RawQueryPairs) -> Result<ListFilter, ApiError> {
	let metadata_filter = match single(pairs, "metadata_filter") {
		None => None,
		Some(raw) if raw.is_empty() => None,
		Some(raw) => {
			let value: Value = serde_json::from_str(&raw)
				.map_err(|e| ApiError::from(CatalogError::InvalidQuery(format!("invalid metadata_filter json: {e}"))))?;
			match value {
				Value::Object(map) => Some(map),
				_ => {
					return Err(ApiError::from(CatalogError::InvalidQuery(
						"metadata_filter must be a json object".to_string(),
					)))
				}
			}
		}
	};

	Ok(ListFilter {
		include_tags: tag_list(pairs, "include_tags"),
		exclude_tags: tag_list(pairs, "exclude_tags"),
		name_contains: single(pairs, "name_contains").filter(|s| !s.is_empty()),
		metadata_filter,
		sort: SortKey::from_query(single(pairs, "sort").as_deref()),
		order: SortOrder::from_query(single(pairs, "order").as_deref()),
		limit: parse_clamped_limit(pairs, 100, 1, 500)?,
		offset: parse_offset(pairs)?,
	})
}

pub struct TagListQuery {
	pub prefix: Option<String>,
	pub order: catalog_core::management::TagListOrder,
	pub include_zero: bool,
	pub limit: u64,
	pub offset: u64,
}

/// `GET /api/tags` query parameters.
pub fn parse_tag_list_query(pairs: &RawQueryPairs) -> Result<TagListQuery, ApiError> {
	Ok(TagListQuery {
		prefix: single(pairs, "prefix").filter(|s| !s.is_empty()),
		order: catalog_core::management::TagListOrder::from_query(single(pairs, "order").as_deref()),
		include_zero: parse_bool_flag(single(pairs, "include_zero").as_deref(), false),
		limit: parse_clamped_limit(pairs, 100, 1, 1000)?,
		offset: parse_offset(pairs)?,
	})
}

/// `?disposition=inline|attachment` on the content route; anything else
/// falls back to `attachment`.
pub fn parse_disposition(pairs: &RawQueryPairs) -> &'static str {
	match single(pairs, "disposition").as_deref() {
		Some("inline") => "inline",
		_ => "attachment",
	}
}

/// `?delete_content=<bool>`, default `true`; `0`/`false`/`no` turn it off (§6).
pub fn parse_bool_flag(raw: Option<&str>, default: bool) -> bool {
	match raw.map(|s| s.to_lowercase()) {
		None => default,
		Some(s) => !matches!(s.as_str(), "0" | "false" | "no"),
	}
}

/// Normalize, trim, and dedupe a tag list from a JSON request body, preserving
/// first-seen order (§6 "Tags are normalized to lowercase, trimmed, deduplicated").
pub fn normalize_request_tags(tags: &[String]) -> Vec<String> {
	catalog_core::ingest::normalize_tags(tags)
}

/// `user_metadata`: a JSON object, a JSON-object-encoded string, or
/// empty/absent (§6).
pub fn parse_user_metadata(raw: Option<&str>) -> Result<Option<Value>, ApiError> {
	let Some(raw) = raw else { return Ok(None) };
	let trimmed = raw.trim();
	if trimmed.is_empty() {
		return Ok(None);
	}
	let value: Value = serde_json::from_str(trimmed)
		.map_err(|e| ApiError::from(CatalogError::InvalidBody(format!("invalid user_metadata json: {e}"))))?;
	match value {
		Value::Object(_) => Ok(Some(value)),
		_ => Err(ApiError::from(CatalogError::InvalidBody(
			"user_metadata must be a json object".to_string(),
		))),
	}
}

/// `preview_id`: a uuid, or null/empty-to-null (§6).
pub fn parse_preview_id(raw: Option<&str>) -> Result<Option<Uuid>, ApiError> {
	match raw.map(str::trim) {
		None | Some("") => Ok(None),
		Some(s) => Uuid::parse_str(s)
			.map(Some)
			.map_err(|_| ApiError::from(CatalogError::InvalidBody(format!("\"{s}\" is not a valid preview_id")))),
	}
}

/// `name`: at most 512 chars (§6).
pub const MAX_NAME_LEN: usize = 512;

pub fn validate_name(name: &str) -> Result<(), ApiError> {
	if name.chars().count() > MAX_NAME_LEN {
		return Err(ApiError::from(CatalogError::InvalidBody(format!(
			"name exceeds {MAX_NAME_LEN} characters"
		))));
	}
	Ok(())
}

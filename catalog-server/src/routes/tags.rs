//! `GET /api/tags` (§6).

use axum::extract::{RawQuery, State};
use axum::Json;
use catalog_core::db::entities::tag::TagType;
use catalog_core::management;
use serde::Serialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::state::AppState;
use crate::validation::{parse_tag_list_query, RawQueryPairs};

#[derive(Serialize)]
struct TagEntry {
	name: String,
	tag_type: &'static str,
	count: u64,
}

fn tag_type_str(t: TagType) -> &'static str {
	match t {
		TagType::User => "user",
		TagType::System => "system",
	}
}

pub async fn list_tags(State(state): State<AppState>, RawQuery(raw): RawQuery) -> ApiResult<Json<serde_json::Value>> {
	let pairs: RawQueryPairs = raw.as_deref().map(|q| serde_urlencoded::from_str(q).unwrap_or_default()).unwrap_or_default();
	let query = parse_tag_list_query(&pairs)?;

	let (tags, total) = management::list_tags(
		state.db(),
		query.prefix.as_deref(),
		query.order,
		query.include_zero,
		query.limit,
		query.offset,
	)
	.await?;

	let entries: Vec<TagEntry> = tags
		.into_iter()
		.map(|t| TagEntry {
			name: t.name,
			tag_type: tag_type_str(t.tag_type),
			count: t.count,
		})
		.collect();

	Ok(Json(json!({ "tags": entries, "total": total })))
}

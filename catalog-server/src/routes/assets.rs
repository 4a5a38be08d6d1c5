//! `/api/assets*` handlers (§6).

use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalog_core::config::Root;
use catalog_core::db::entities::asset;
use catalog_core::error::CatalogError;
use catalog_core::{download, ingest, management, scanner};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::stream;
use crate::upload::{parse_multipart, TempUploadDir, ValidatedMultipart};
use crate::validation::{
	normalize_request_tags, owner_id_from_headers, parse_bool_flag, parse_disposition, parse_list_filter,
	parse_preview_id, parse_user_metadata, validate_name, RawQueryPairs, UuidPath,
};

#[derive(Serialize)]
pub struct AssetResponse {
	id: Uuid,
	asset_id: Uuid,
	asset_hash: Option<String>,
	name: String,
	owner_id: String,
	size: i64,
	mime_type: Option<String>,
	tags: Vec<String>,
	user_metadata: Value,
	preview_id: Option<Uuid>,
	created_at: chrono::DateTime<chrono::Utc>,
	updated_at: chrono::DateTime<chrono::Utc>,
	last_access_time: chrono::DateTime<chrono::Utc>,
}

impl From<management::AssetDetail> for AssetResponse {
	fn from(detail: management::AssetDetail) -> Self {
		Self {
			id: detail.info.id,
			asset_id: detail.asset.id,
			asset_hash: detail.asset.hash,
			name: detail.info.name,
			owner_id: detail.info.owner_id,
			size: detail.asset.size_bytes,
			mime_type: detail.asset.mime_type,
			tags: detail.tags,
			user_metadata: detail.info.user_metadata,
			preview_id: detail.info.preview_id,
			created_at: detail.info.created_at,
			updated_at: detail.info.updated_at,
			last_access_time: detail.info.last_access_time,
		}
	}
}

fn query_pairs(raw: Option<String>) -> RawQueryPairs {
	raw.as_deref()
		.map(|q| serde_urlencoded::from_str(q).unwrap_or_default())
		.unwrap_or_default()
}

pub async fn list_assets(State(state): State<AppState>, headers: HeaderMap, RawQuery(raw): RawQuery) -> ApiResult<Json<Value>> {
	let pairs = query_pairs(raw);
	let filter = parse_list_filter(&pairs)?;
	let owner_id = owner_id_from_headers(&headers);

	let result = management::list_assets(state.db(), &owner_id, &filter).await?;
	let assets: Vec<AssetResponse> = result.assets.into_iter().map(AssetResponse::from).collect();

	Ok(Json(serde_json::json!({
		"assets": assets,
		"total": result.total,
		"has_more": result.has_more,
	})))
}

pub async fn get_asset(State(state): State<AppState>, headers: HeaderMap, UuidPath(id): UuidPath) -> ApiResult<Json<AssetResponse>> {
	let owner_id = owner_id_from_headers(&headers);
	let detail = management::get_asset_detail(state.db(), id, &owner_id).await?;
	Ok(Json(detail.into()))
}

pub async fn get_content(
	State(state): State<AppState>,
	headers: HeaderMap,
	UuidPath(id): UuidPath,
	RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
	let pairs = query_pairs(raw);
	let owner_id = owner_id_from_headers(&headers);
	let disposition = parse_disposition(&pairs);

	let resolved = download::resolve_content(state.db(), id, &owner_id).await?;
	Ok(stream::stream_response(resolved, disposition).await?)
}

#[derive(Deserialize)]
pub struct UpdateAssetRequest {
	name: Option<String>,
	tags: Option<Vec<String>>,
	user_metadata: Option<Value>,
	preview_id: Option<Value>,
}

pub async fn update_asset(
	State(state): State<AppState>,
	headers: HeaderMap,
	UuidPath(id): UuidPath,
	Json(body): Json<UpdateAssetRequest>,
) -> ApiResult<Json<AssetResponse>> {
	let owner_id = owner_id_from_headers(&headers);

	if body.name.is_none() && body.tags.is_none() && body.user_metadata.is_none() && body.preview_id.is_none() {
		return Err(ApiError::from(CatalogError::InvalidBody(
			"at least one of name, tags, user_metadata, preview_id is required".to_string(),
		)));
	}
	if let Some(ref name) = body.name {
		validate_name(name)?;
	}

	let normalized_tags = body.tags.map(|t| normalize_request_tags(&t));

	if let Some(raw_preview) = body.preview_id {
		let preview_id = match raw_preview {
			Value::Null => None,
			Value::String(s) => Some(parse_preview_id(Some(&s))?.ok_or_else(|| {
				ApiError::from(CatalogError::InvalidBody("preview_id must not be empty".to_string()))
			})?),
			_ => {
				return Err(ApiError::from(CatalogError::InvalidBody(
					"preview_id must be a uuid string or null".to_string(),
				)))
			}
		};
		management::set_asset_preview(state.db(), id, &owner_id, preview_id).await?;
	}

	management::update_asset(
		state.db(),
		state.config(),
		id,
		&owner_id,
		body.name,
		normalized_tags,
		body.user_metadata,
	)
	.await?;

	let detail = management::get_asset_detail(state.db(), id, &owner_id).await?;
	Ok(Json(detail.into()))
}

pub async fn delete_asset(
	State(state): State<AppState>,
	headers: HeaderMap,
	UuidPath(id): UuidPath,
	RawQuery(raw): RawQuery,
) -> ApiResult<StatusCode> {
	let pairs = query_pairs(raw);
	let owner_id = owner_id_from_headers(&headers);
	let delete_content = parse_bool_flag(pairs.iter().find(|(k, _)| k == "delete_content").map(|(_, v)| v.as_str()), true);

	management::delete_asset_reference(state.db(), id, &owner_id, delete_content).await?;
	Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct TagsRequest {
	tags: Vec<String>,
}

pub async fn add_tags(
	State(state): State<AppState>,
	headers: HeaderMap,
	UuidPath(id): UuidPath,
	Json(body): Json<TagsRequest>,
) -> ApiResult<Json<Value>> {
	if body.tags.is_empty() {
		return Err(ApiError::from(CatalogError::InvalidBody("tags must not be empty".to_string())));
	}
	let owner_id = owner_id_from_headers(&headers);
	let result = management::add_asset_tags(state.db(), id, &owner_id, &body.tags).await?;
	Ok(Json(serde_json::json!({
		"added": result.affected,
		"already_present": result.unaffected,
		"total_tags": result.total_tags,
	})))
}

pub async fn remove_tags(
	State(state): State<AppState>,
	headers: HeaderMap,
	UuidPath(id): UuidPath,
	Json(body): Json<TagsRequest>,
) -> ApiResult<Json<Value>> {
	if body.tags.is_empty() {
		return Err(ApiError::from(CatalogError::InvalidBody("tags must not be empty".to_string())));
	}
	let owner_id = owner_id_from_headers(&headers);
	let result = management::remove_asset_tags(state.db(), id, &owner_id, &body.tags).await?;
	Ok(Json(serde_json::json!({
		"removed": result.affected,
		"not_present": result.unaffected,
		"total_tags": result.total_tags,
	})))
}

pub async fn upload_asset(
	State(state): State<AppState>,
	headers: HeaderMap,
	multipart: ValidatedMultipart,
) -> ApiResult<Response> {
	let owner_id = owner_id_from_headers(&headers);
	let temp_dir = TempUploadDir::create().await?;
	let raw = parse_multipart(multipart.0, temp_dir.path()).await?;

	if raw.tags.is_empty() {
		return Err(ApiError::from(CatalogError::InvalidBody("tags is required".to_string())));
	}
	if let Some(ref name) = raw.name {
		validate_name(name)?;
	}
	let user_metadata = parse_user_metadata(raw.user_metadata_raw.as_deref())?;

	let Some(temp_file_path) = raw.temp_file_path else {
		// No `file` field: the upload must resolve entirely by a known hash (§6).
		let Some(ref expected_hash) = raw.expected_hash else {
			return Err(ApiError::from(CatalogError::MissingFile));
		};
		let normalized_hash = catalog_core::hash::normalize_hash(expected_hash)?;
		let existing = asset::Entity::find()
			.filter(asset::Column::Hash.eq(normalized_hash.clone()))
			.one(state.db())
			.await
			.map_err(CatalogError::from)?;
		let Some(existing) = existing else {
			return Err(ApiError::from(CatalogError::MissingFile));
		};

		let normalized_tags = normalize_request_tags(&raw.tags);
		let name = raw.name.clone().unwrap_or_else(|| normalized_hash.clone());
		let info_id = ingest::register_existing_asset(
			state.db(),
			state.config(),
			&normalized_hash,
			&name,
			&owner_id,
			&normalized_tags,
			user_metadata,
		)
		.await?;
		temp_dir.release();

		let body = serde_json::json!({
			"id": info_id,
			"asset_id": existing.id,
			"asset_hash": normalized_hash,
			"size": existing.size_bytes,
			"tags": normalized_tags,
			"created_new": false,
		});
		return Ok((StatusCode::OK, Json(body)).into_response());
	};

	let upload = ingest::ParsedUpload {
		temp_file_path,
		client_filename: raw.client_filename,
		tags: raw.tags,
		name: raw.name,
		expected_hash: raw.expected_hash,
		owner_id,
		user_metadata,
	};

	let result = ingest::handle_upload(state.db(), state.config(), upload).await?;
	temp_dir.release();

	let status = if result.created_new { StatusCode::CREATED } else { StatusCode::OK };
	let body = serde_json::json!({
		"id": result.asset_info_id,
		"asset_id": result.asset_id,
		"asset_hash": result.asset_hash,
		"size": result.size_bytes,
		"tags": result.tags,
		"created_new": result.created_new,
	});
	Ok((status, Json(body)).into_response())
}

#[derive(Deserialize)]
pub struct FromHashRequest {
	hash: String,
	name: String,
	tags: Vec<String>,
	user_metadata: Option<Value>,
}

pub async fn register_from_hash(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(body): Json<FromHashRequest>,
) -> ApiResult<Response> {
	validate_name(&body.name)?;
	if body.tags.is_empty() {
		return Err(ApiError::from(CatalogError::InvalidBody("tags must not be empty".to_string())));
	}
	let owner_id = owner_id_from_headers(&headers);
	let normalized_hash = catalog_core::hash::normalize_hash(&body.hash)?;
	let normalized_tags = normalize_request_tags(&body.tags);

	let info_id = ingest::register_existing_asset(
		state.db(),
		state.config(),
		&normalized_hash,
		&body.name,
		&owner_id,
		&normalized_tags,
		body.user_metadata,
	)
	.await?;

	let detail = management::get_asset_detail(state.db(), info_id, &owner_id).await?;
	let response: AssetResponse = detail.into();
	Ok((StatusCode::CREATED, Json(response)).into_response())
}

pub async fn head_by_hash(State(state): State<AppState>, axum::extract::Path(hash): axum::extract::Path<String>) -> ApiResult<StatusCode> {
	let normalized = catalog_core::hash::normalize_hash(&hash)?;
	let found = asset::Entity::find()
		.filter(asset::Column::Hash.eq(normalized))
		.one(state.db())
		.await
		.map_err(CatalogError::from)?;
	match found {
		Some(_) => Ok(StatusCode::OK),
		None => Ok(StatusCode::NOT_FOUND),
	}
}

#[derive(Deserialize)]
pub struct SeedRequest {
	#[serde(default)]
	roots: Vec<String>,
}

pub async fn seed(State(state): State<AppState>, Json(body): Json<SeedRequest>) -> ApiResult<Json<Value>> {
	let roots: Vec<Root> = if body.roots.is_empty() {
		vec![Root::Models, Root::Input, Root::Output]
	} else {
		body.roots
			.iter()
			.map(|r| {
				Root::from_str_opt(r).ok_or_else(|| ApiError::from(CatalogError::InvalidBody(format!("unknown root \"{r}\""))))
			})
			.collect::<Result<Vec<_>, _>>()?
	};

	let report = scanner::run_scan(state.db(), state.config(), &roots).await?;

	let seeded: Vec<Value> = report
		.seeded
		.iter()
		.map(|s| serde_json::json!({ "asset_id": s.asset_id, "asset_info_id": s.asset_info_id, "path": s.path }))
		.collect();

	Ok(Json(serde_json::json!({
		"seeded": seeded,
		"reconciled_assets": report.reconciled_assets,
		"pruned_states": report.pruned_states,
		"pruned_assets": report.pruned_assets,
	})))
}

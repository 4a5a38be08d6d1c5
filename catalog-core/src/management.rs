//! Management service (§4.7): the read/write operations the HTTP layer
//! calls directly, on top of the query layer and ingest's tag/metadata helpers.

use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
	QueryFilter, TransactionTrait,
};
use serde_json::Value;
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::db::entities::{asset, asset_info, asset_info_tag};
use crate::error::{CatalogError, CatalogResult};
use crate::ingest::{normalize_tags, TagOrigin};
use crate::metadata::replace_asset_info_metadata_projection;
use crate::path_utils;
use crate::query::{self, fetch_tag_map, owner_visibility_condition, ListFilter};

pub struct AssetDetail {
	pub info: asset_info::Model,
	pub asset: asset::Model,
	pub tags: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagListOrder {
	CountDesc,
	NameAsc,
}

impl TagListOrder {
	/// Unknown values fall back to `count_desc`.
	pub fn from_query(s: Option<&str>) -> Self {
		match s {
			Some("name_asc") => Self::NameAsc,
			_ => Self::CountDesc,
		}
	}
}

pub struct TagUsage {
	pub name: String,
	pub tag_type: crate::db::entities::tag::TagType,
	pub count: u64,
}

/// `GET /api/tags` backing query (§6): usage counts, prefix filter, pagination.
#[allow(clippy::too_many_arguments)]
pub async fn list_tags(
	db: &DatabaseConnection,
	prefix: Option<&str>,
	order: TagListOrder,
	include_zero: bool,
	limit: u64,
	offset: u64,
) -> CatalogResult<(Vec<TagUsage>, u64)> {
	use crate::db::entities::tag;

	let mut tags = tag::Entity::find().all(db).await?;
	if let Some(prefix) = prefix {
		tags.retain(|t| t.name.starts_with(prefix));
	}

	let links = asset_info_tag::Entity::find().all(db).await?;
	let mut counts: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
	for link in links {
		*counts.entry(link.tag_name).or_insert(0) += 1;
	}

	let mut usages: Vec<TagUsage> = tags
		.into_iter()
		.map(|t| {
			let count = counts.get(&t.name).copied().unwrap_or(0);
			TagUsage {
				name: t.name,
				tag_type: t.tag_type,
				count,
			}
		})
		.filter(|u| include_zero || u.count > 0)
		.collect();

	match order {
		TagListOrder::CountDesc => usages.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name))),
		TagListOrder::NameAsc => usages.sort_by(|a, b| a.name.cmp(&b.name)),
	}

	let total = usages.len() as u64;
	let page = usages
		.into_iter()
		.skip(offset as usize)
		.take(limit as usize)
		.collect();

	Ok((page, total))
}

/// `get_asset_detail(info_id, owner_id)` — §4.7.
pub async fn get_asset_detail(
	db: &DatabaseConnection,
	info_id: Uuid,
	caller_owner_id: &str,
) -> CatalogResult<AssetDetail> {
	let info = asset_info::Entity::find_by_id(info_id)
		.filter(owner_visibility_condition(caller_owner_id))
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info_id.to_string()))?;

	let asset_model = asset::Entity::find_by_id(info.asset_id)
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info.asset_id.to_string()))?;

	let tag_map = fetch_tag_map(db, &[info.id]).await?;
	let tags = tag_map.get(&info.id).cloned().unwrap_or_default();

	Ok(AssetDetail {
		info,
		asset: asset_model,
		tags,
	})
}

pub struct ListAssetsResult {
	pub assets: Vec<AssetDetail>,
	pub total: u64,
	pub has_more: bool,
}

/// `list_assets(...)` — §4.7; thin wrapper that adds pagination bookkeeping.
pub async fn list_assets(
	db: &DatabaseConnection,
	caller_owner_id: &str,
	filter: &ListFilter,
) -> CatalogResult<ListAssetsResult> {
	let (rows, mut tag_map, total) = query::list_assets(db, caller_owner_id, filter).await?;

	let assets = rows
		.into_iter()
		.map(|(info, asset_model)| {
			let tags = tag_map.remove(&info.id).unwrap_or_default();
			AssetDetail {
				info,
				asset: asset_model,
				tags,
			}
		})
		.collect::<Vec<_>>();

	let has_more = filter.offset + (assets.len() as u64) < total;

	Ok(ListAssetsResult { assets, total, has_more })
}

/// `update_asset(info_id, name?, tags?, metadata?, owner_id)` — §4.7.
pub async fn update_asset(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	info_id: Uuid,
	caller_owner_id: &str,
	name: Option<String>,
	tags: Option<Vec<String>>,
	metadata: Option<Value>,
) -> CatalogResult<()> {
	let txn = db.begin().await?;

	let info = asset_info::Entity::find_by_id(info_id)
		.filter(owner_visibility_condition(caller_owner_id))
		.one(&txn)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info_id.to_string()))?;

	let mut active: asset_info::ActiveModel = info.clone().into();
	if let Some(name) = name {
		active.name = Set(name);
	}
	active.updated_at = Set(Utc::now());
	active.update(&txn).await?;

	if let Some(tags) = tags {
		set_asset_info_tags(&txn, info_id, &tags, TagOrigin::Manual).await?;
	}

	let states = crate::db::entities::asset_cache_state::Entity::find()
		.filter(crate::db::entities::asset_cache_state::Column::AssetId.eq(info.asset_id))
		.all(&txn)
		.await?;
	let live = crate::download::best_live_path(&states).await;

	let mut merged = match metadata {
		Some(Value::Object(map)) => Value::Object(map),
		_ => {
			let current = asset_info::Entity::find_by_id(info_id).one(&txn).await?;
			current.map(|c| c.user_metadata).unwrap_or_else(|| Value::Object(serde_json::Map::new()))
		}
	};
	if !merged.is_object() {
		merged = Value::Object(serde_json::Map::new());
	}
	if let Some(state) = live {
		if let Ok(filename) = path_utils::relative_filename(config, std::path::Path::new(&state.file_path)) {
			if let Value::Object(ref mut map) = merged {
				map.insert("filename".to_string(), Value::String(filename));
			}
		}
	}

	replace_asset_info_metadata_projection(&txn, info_id, &merged).await?;
	if let Some(current) = asset_info::Entity::find_by_id(info_id).one(&txn).await? {
		let mut active: asset_info::ActiveModel = current.into();
		active.user_metadata = Set(merged);
		active.update(&txn).await?;
	}

	txn.commit().await?;
	Ok(())
}

/// Replace the manual tag set on `info_id` with exactly `tags`, leaving the
/// `missing` automatic tag (if present) untouched.
pub async fn set_asset_info_tags<C: sea_orm::ConnectionTrait>(
	db: &C,
	info_id: Uuid,
	tags: &[String],
	origin: TagOrigin,
) -> CatalogResult<()> {
	let normalized = normalize_tags(tags);

	asset_info_tag::Entity::delete_many()
		.filter(asset_info_tag::Column::AssetInfoId.eq(info_id))
		.filter(asset_info_tag::Column::TagName.ne(crate::db::entities::tag::MISSING_TAG))
		.exec(db)
		.await?;

	for name in &normalized {
		ensure_tag_exists(db, name).await?;
		let link = asset_info_tag::ActiveModel {
			asset_info_id: Set(info_id),
			tag_name: Set(name.clone()),
			origin: Set(origin),
			added_at: Set(Utc::now()),
		};
		let _ = link.insert(db).await;
	}

	Ok(())
}

async fn ensure_tag_exists<C: sea_orm::ConnectionTrait>(db: &C, name: &str) -> CatalogResult<()> {
	use crate::db::entities::tag;
	if tag::Entity::find_by_id(name).one(db).await?.is_some() {
		return Ok(());
	}
	let active = tag::ActiveModel {
		name: Set(name.to_string()),
		tag_type: Set(tag::TagType::User),
	};
	let _ = active.insert(db).await;
	Ok(())
}

pub struct TagMutationResult {
	pub affected: Vec<String>,
	pub unaffected: Vec<String>,
	pub total_tags: usize,
}

/// `POST /api/assets/{id}/tags` — additive, manual-origin tag links.
pub async fn add_asset_tags(
	db: &DatabaseConnection,
	info_id: Uuid,
	caller_owner_id: &str,
	tags: &[String],
) -> CatalogResult<TagMutationResult> {
	let info = asset_info::Entity::find_by_id(info_id)
		.filter(owner_visibility_condition(caller_owner_id))
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info_id.to_string()))?;

	let normalized = normalize_tags(tags);
	let existing = fetch_tag_map(db, &[info.id]).await?.remove(&info.id).unwrap_or_default();
	let existing_set: std::collections::HashSet<String> = existing.into_iter().collect();

	let mut added = Vec::new();
	let mut already_present = Vec::new();
	for name in &normalized {
		if existing_set.contains(name) {
			already_present.push(name.clone());
			continue;
		}
		ensure_tag_exists(db, name).await?;
		let link = asset_info_tag::ActiveModel {
			asset_info_id: Set(info.id),
			tag_name: Set(name.clone()),
			origin: Set(TagOrigin::Manual),
			added_at: Set(Utc::now()),
		};
		if link.insert(db).await.is_ok() {
			added.push(name.clone());
		} else {
			already_present.push(name.clone());
		}
	}

	Ok(TagMutationResult {
		total_tags: existing_set.len() + added.len(),
		affected: added,
		unaffected: already_present,
	})
}

/// `DELETE /api/assets/{id}/tags` — the reserved `missing` tag is not removable this way (§9).
pub async fn remove_asset_tags(
	db: &DatabaseConnection,
	info_id: Uuid,
	caller_owner_id: &str,
	tags: &[String],
) -> CatalogResult<TagMutationResult> {
	let info = asset_info::Entity::find_by_id(info_id)
		.filter(owner_visibility_condition(caller_owner_id))
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info_id.to_string()))?;

	let normalized = normalize_tags(tags);
	let existing = fetch_tag_map(db, &[info.id]).await?.remove(&info.id).unwrap_or_default();
	let existing_set: std::collections::HashSet<String> = existing.into_iter().collect();

	let mut removed = Vec::new();
	let mut not_present = Vec::new();
	for name in &normalized {
		if name == crate::db::entities::tag::MISSING_TAG || !existing_set.contains(name) {
			not_present.push(name.clone());
			continue;
		}
		asset_info_tag::Entity::delete_by_id((info.id, name.clone())).exec(db).await?;
		removed.push(name.clone());
	}

	Ok(TagMutationResult {
		total_tags: existing_set.len() - removed.len(),
		affected: removed,
		unaffected: not_present,
	})
}

/// `delete_asset_reference(info_id, owner_id, delete_if_orphan)` — §4.7.
pub async fn delete_asset_reference(
	db: &DatabaseConnection,
	info_id: Uuid,
	caller_owner_id: &str,
	delete_if_orphan: bool,
) -> CatalogResult<()> {
	let txn = db.begin().await?;

	let info = asset_info::Entity::find_by_id(info_id)
		.filter(owner_visibility_condition(caller_owner_id))
		.one(&txn)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info_id.to_string()))?;

	let asset_id = info.asset_id;
	asset_info::Entity::delete_by_id(info_id).exec(&txn).await?;

	let mut paths_to_remove: Vec<String> = Vec::new();
	if delete_if_orphan {
		let remaining = asset_info::Entity::find()
			.filter(asset_info::Column::AssetId.eq(asset_id))
			.count(&txn)
			.await?;
		if remaining == 0 {
			let states = crate::db::entities::asset_cache_state::Entity::find()
				.filter(crate::db::entities::asset_cache_state::Column::AssetId.eq(asset_id))
				.all(&txn)
				.await?;
			paths_to_remove = states.into_iter().map(|s| s.file_path).collect();
			asset::Entity::delete_by_id(asset_id).exec(&txn).await?;
		}
	}

	txn.commit().await?;

	for path in paths_to_remove {
		if let Err(e) = tokio::fs::remove_file(&path).await {
			tracing::warn!(error = %e, %path, "failed to remove orphaned file from disk");
		}
	}

	Ok(())
}

/// `set_asset_preview(info_id, preview_asset_id?, owner_id)` — §4.7.
pub async fn set_asset_preview(
	db: &DatabaseConnection,
	info_id: Uuid,
	caller_owner_id: &str,
	preview_asset_id: Option<Uuid>,
) -> CatalogResult<()> {
	let info = asset_info::Entity::find_by_id(info_id)
		.filter(owner_visibility_condition(caller_owner_id))
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info_id.to_string()))?;

	if let Some(preview_id) = preview_asset_id {
		if asset::Entity::find_by_id(preview_id).one(db).await?.is_none() {
			return Err(CatalogError::AssetNotFound(preview_id.to_string()));
		}
	}

	let mut active: asset_info::ActiveModel = info.into();
	active.preview_id = Set(preview_asset_id);
	active.update(db).await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::Database;
	use crate::ingest::{self, TagOrigin as IngestTagOrigin};
	use std::collections::BTreeMap;
	use tempfile::TempDir;

	fn test_config(tmp: &TempDir) -> CatalogConfig {
		CatalogConfig {
			input_base: tmp.path().join("input"),
			output_base: tmp.path().join("output"),
			model_categories: BTreeMap::new(),
			database_path: tmp.path().join("catalog.db"),
			max_bind_params: 800,
		}
	}

	async fn seed_one(db: &DatabaseConnection, config: &CatalogConfig) -> Uuid {
		std::fs::create_dir_all(&config.input_base).unwrap();
		let path = config.input_base.join("a.txt");
		std::fs::write(&path, b"hello").unwrap();
		let h = crate::hash::hash_bytes(b"hello");
		let outcome = ingest::ingest_file_from_path(
			db,
			config,
			&path,
			&h,
			5,
			1,
			None,
			Some("a.txt".to_string()),
			"",
			&["input".to_string()],
			None,
			None,
			false,
			IngestTagOrigin::Manual,
		)
		.await
		.unwrap();
		outcome.asset_info_id.unwrap()
	}

	#[tokio::test]
	async fn set_tags_replaces_the_set() {
		let db = Database::connect_in_memory().await.unwrap();
		let tmp = TempDir::new().unwrap();
		let config = test_config(&tmp);
		let info_id = seed_one(db.conn(), &config).await;

		set_asset_info_tags(
			db.conn(),
			info_id,
			&["a".to_string(), "b".to_string(), "c".to_string()],
			TagOrigin::Manual,
		)
		.await
		.unwrap();
		let map = fetch_tag_map(db.conn(), &[info_id]).await.unwrap();
		let mut tags = map.get(&info_id).cloned().unwrap_or_default();
		tags.sort();
		assert_eq!(tags, vec!["a".to_string(), "b".to_string(), "c".to_string()]);

		set_asset_info_tags(db.conn(), info_id, &["b".to_string(), "d".to_string()], TagOrigin::Manual)
			.await
			.unwrap();
		let map = fetch_tag_map(db.conn(), &[info_id]).await.unwrap();
		let mut tags = map.get(&info_id).cloned().unwrap_or_default();
		tags.sort();
		assert_eq!(tags, vec!["b".to_string(), "d".to_string()]);
	}

	#[tokio::test]
	async fn delete_with_orphan_removes_asset_and_file() {
		let db = Database::connect_in_memory().await.unwrap();
		let tmp = TempDir::new().unwrap();
		let config = test_config(&tmp);
		let info_id = seed_one(db.conn(), &config).await;
		let path = config.input_base.join("a.txt");
		assert!(path.exists());

		delete_asset_reference(db.conn(), info_id, "", true).await.unwrap();
		assert!(!path.exists());
		assert!(get_asset_detail(db.conn(), info_id, "").await.is_err());
	}

	#[tokio::test]
	async fn update_asset_merges_derived_filename() {
		let db = Database::connect_in_memory().await.unwrap();
		let tmp = TempDir::new().unwrap();
		let config = test_config(&tmp);
		let info_id = seed_one(db.conn(), &config).await;

		update_asset(
			db.conn(),
			&config,
			info_id,
			"",
			None,
			None,
			Some(serde_json::json!({"author": "alice"})),
		)
		.await
		.unwrap();

		let detail = get_asset_detail(db.conn(), info_id, "").await.unwrap();
		assert_eq!(detail.info.user_metadata["author"], "alice");
		assert_eq!(detail.info.user_metadata["filename"], "a.txt");
	}
}

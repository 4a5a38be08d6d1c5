//! Ingest service (§4.4): reconciled-path ingest, register-by-hash, and the
//! upload orchestration that ties them to a freshly landed file.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, ConnectionTrait,
	DatabaseConnection, EntityTrait, QueryFilter, TransactionTrait,
};
use serde_json::Value;
use uuid::Uuid;

use crate::config::CatalogConfig;
use crate::db::entities::{asset, asset_cache_state, asset_info, asset_info_tag, tag};
use crate::error::{CatalogError, CatalogResult};
use crate::hash;
use crate::metadata::replace_asset_info_metadata_projection;
use crate::path_utils;

pub use asset_info_tag::TagOrigin;

/// The record an external multipart parser hands to the ingest layer —
/// the multipart parser itself is out of scope (§1).
#[derive(Debug, Clone)]
pub struct ParsedUpload {
	pub temp_file_path: PathBuf,
	pub client_filename: Option<String>,
	pub tags: Vec<String>,
	pub name: Option<String>,
	pub expected_hash: Option<String>,
	pub owner_id: String,
	pub user_metadata: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct UploadResult {
	pub asset_info_id: Uuid,
	pub asset_id: Uuid,
	pub asset_hash: String,
	pub size_bytes: i64,
	pub tags: Vec<String>,
	pub created_new: bool,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
	pub asset_id: Uuid,
	pub asset_created: bool,
	pub state_created: bool,
	pub asset_info_id: Option<Uuid>,
}

/// Normalize and dedupe a tag list, preserving first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
	let mut seen = std::collections::HashSet::new();
	let mut out = Vec::new();
	for t in tags {
		let n = tag::normalize(t);
		if seen.insert(n.clone()) {
			out.push(n);
		}
	}
	out
}

async fn upsert_asset_by_hash<C: ConnectionTrait>(
	db: &C,
	hash_value: &str,
	size_bytes: i64,
	mime_type: Option<String>,
) -> CatalogResult<(asset::Model, bool)> {
	if let Some(existing) = asset::Entity::find()
		.filter(asset::Column::Hash.eq(hash_value))
		.one(db)
		.await?
	{
		let mut active: asset::ActiveModel = existing.clone().into();
		let mut changed = false;
		if existing.size_bytes == 0 && size_bytes > 0 {
			active.size_bytes = Set(size_bytes);
			changed = true;
		}
		if let Some(ref mime) = mime_type {
			if existing.mime_type.as_deref() != Some(mime.as_str()) {
				active.mime_type = Set(Some(mime.clone()));
				changed = true;
			}
		}
		let model = if changed { active.update(db).await? } else { existing };
		return Ok((model, false));
	}

	let new_asset = asset::ActiveModel {
		id: Set(Uuid::new_v4()),
		hash: Set(Some(hash_value.to_string())),
		size_bytes: Set(size_bytes),
		mime_type: Set(mime_type),
		created_at: Set(Utc::now()),
	};
	match new_asset.insert(db).await {
		Ok(model) => Ok((model, true)),
		Err(_) => {
			// Lost a concurrent insert race on the unique hash; the other writer wins.
			let existing = asset::Entity::find()
				.filter(asset::Column::Hash.eq(hash_value))
				.one(db)
				.await?
				.ok_or_else(|| CatalogError::internal("asset vanished after conflicting insert"))?;
			Ok((existing, false))
		}
	}
}

async fn upsert_cache_state<C: ConnectionTrait>(
	db: &C,
	asset_id: Uuid,
	file_path: &str,
	mtime_ns: i64,
) -> CatalogResult<bool> {
	if let Some(existing) = asset_cache_state::Entity::find()
		.filter(asset_cache_state::Column::FilePath.eq(file_path))
		.one(db)
		.await?
	{
		let mut active: asset_cache_state::ActiveModel = existing.into();
		active.asset_id = Set(asset_id);
		active.mtime_ns = Set(mtime_ns);
		active.needs_verify = Set(false);
		active.update(db).await?;
		return Ok(false);
	}

	let new_state = asset_cache_state::ActiveModel {
		id: NotSet,
		asset_id: Set(asset_id),
		file_path: Set(file_path.to_string()),
		mtime_ns: Set(mtime_ns),
		needs_verify: Set(false),
	};
	match new_state.insert(db).await {
		Ok(_) => Ok(true),
		Err(_) => Ok(false),
	}
}

async fn ensure_tag_exists<C: ConnectionTrait>(db: &C, name: &str, require_existing: bool) -> CatalogResult<()> {
	if tag::Entity::find_by_id(name).one(db).await?.is_some() {
		return Ok(());
	}
	if require_existing {
		return Err(CatalogError::InvalidBody(format!("unknown tag \"{name}\"")));
	}
	let active = tag::ActiveModel {
		name: Set(name.to_string()),
		tag_type: Set(tag::TagType::User),
	};
	let _ = active.insert(db).await; // best-effort; lost races are fine, the row already exists
	Ok(())
}

async fn link_tags<C: ConnectionTrait>(
	db: &C,
	asset_info_id: Uuid,
	tags: &[String],
	origin: TagOrigin,
	require_existing_tags: bool,
) -> CatalogResult<()> {
	for name in tags {
		ensure_tag_exists(db, name, require_existing_tags).await?;
		if asset_info_tag::Entity::find_by_id((asset_info_id, name.clone()))
			.one(db)
			.await?
			.is_some()
		{
			continue;
		}
		let link = asset_info_tag::ActiveModel {
			asset_info_id: Set(asset_info_id),
			tag_name: Set(name.clone()),
			origin: Set(origin),
			added_at: Set(Utc::now()),
		};
		let _ = link.insert(db).await;
	}
	Ok(())
}

/// Remove the `missing` system tag from every `AssetInfo` of `asset_id`, best-effort.
pub(crate) async fn clear_missing_tag_for_asset<C: ConnectionTrait>(db: &C, asset_id: Uuid) -> CatalogResult<()> {
	let infos = asset_info::Entity::find()
		.filter(asset_info::Column::AssetId.eq(asset_id))
		.all(db)
		.await?;
	for info in infos {
		if let Err(e) = asset_info_tag::Entity::delete_by_id((info.id, tag::MISSING_TAG.to_string()))
			.exec(db)
			.await
		{
			tracing::warn!(error = %e, asset_info_id = %info.id, "failed to clear missing tag");
		}
	}
	Ok(())
}

/// Derive the `filename` metadata value from the asset's current best live
/// path, merge it into `metadata` without clobbering caller-supplied keys,
/// and reproject.
async fn merge_derived_filename_and_reproject<C: ConnectionTrait>(
	db: &C,
	config: &CatalogConfig,
	asset_id: Uuid,
	asset_info_id: Uuid,
	caller_metadata: Option<Value>,
) -> CatalogResult<Value> {
	let states = asset_cache_state::Entity::find()
		.filter(asset_cache_state::Column::AssetId.eq(asset_id))
		.all(db)
		.await?;
	let live = crate::download::best_live_path(&states).await;

	let info = asset_info::Entity::find_by_id(asset_info_id)
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::internal("asset info vanished mid-ingest"))?;

	let mut metadata = match caller_metadata {
		Some(Value::Object(map)) => Value::Object(map),
		Some(_) | None => info.user_metadata.clone(),
	};
	if !metadata.is_object() {
		metadata = Value::Object(serde_json::Map::new());
	}

	if let Some(state) = live {
		if let Ok(filename) = path_utils::relative_filename(config, Path::new(&state.file_path)) {
			if let Value::Object(ref mut map) = metadata {
				map.insert("filename".to_string(), Value::String(filename));
			}
		}
	}

	replace_asset_info_metadata_projection(db, asset_info_id, &metadata).await?;

	let mut active: asset_info::ActiveModel = info.into();
	active.user_metadata = Set(metadata.clone());
	active.update(db).await?;

	Ok(metadata)
}

/// Create or update the `AssetInfo` for `asset_id`/`owner_id`/`name` and its
/// tags and metadata. Shared tail of `ingest_file_from_path` and
/// `register_existing_asset` (§4.4 steps 3-7).
#[allow(clippy::too_many_arguments)]
async fn upsert_asset_info<C: ConnectionTrait>(
	db: &C,
	config: &CatalogConfig,
	asset_id: Uuid,
	name: &str,
	owner_id: &str,
	tags: &[String],
	metadata: Option<Value>,
	preview_id: Option<Uuid>,
	tag_origin: TagOrigin,
	require_existing_tags: bool,
) -> CatalogResult<Uuid> {
	let now = Utc::now();

	let existing = asset_info::Entity::find()
		.filter(asset_info::Column::AssetId.eq(asset_id))
		.filter(asset_info::Column::OwnerId.eq(owner_id))
		.filter(asset_info::Column::Name.eq(name))
		.one(db)
		.await?;

	let resolved_preview = match preview_id {
		Some(pid) => {
			if asset::Entity::find_by_id(pid).one(db).await?.is_none() {
				return Err(CatalogError::AssetNotFound(pid.to_string()));
			}
			Some(Some(pid))
		}
		None => None,
	};

	let info_id = match existing {
		Some(info) => {
			let mut active: asset_info::ActiveModel = info.clone().into();
			active.updated_at = Set(now);
			if now > info.last_access_time {
				active.last_access_time = Set(now);
			}
			if let Some(preview) = resolved_preview {
				active.preview_id = Set(preview);
			}
			active.update(db).await?;
			info.id
		}
		None => {
			let id = Uuid::new_v4();
			let active = asset_info::ActiveModel {
				id: Set(id),
				asset_id: Set(asset_id),
				owner_id: Set(owner_id.to_string()),
				name: Set(name.to_string()),
				preview_id: Set(resolved_preview.flatten()),
				user_metadata: Set(Value::Object(serde_json::Map::new())),
				created_at: Set(now),
				updated_at: Set(now),
				last_access_time: Set(now),
			};
			active.insert(db).await?;
			id
		}
	};

	let normalized_tags = normalize_tags(tags);
	link_tags(db, info_id, &normalized_tags, tag_origin, require_existing_tags).await?;

	merge_derived_filename_and_reproject(db, config, asset_id, info_id, metadata).await?;
	clear_missing_tag_for_asset(db, asset_id).await?;

	Ok(info_id)
}

/// §4.4.A — the reconciled ingest path used by the scanner and by the
/// upload path after the file has been moved into place. `preview_id`,
/// when present, is validated for resolvability and overwrites the
/// `AssetInfo`'s stored preview on create or update (§9 "last writer
/// wins"); `register_existing_asset` has no equivalent parameter.
#[allow(clippy::too_many_arguments)]
pub async fn ingest_file_from_path(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	abs_path: &Path,
	content_hash: &str,
	size_bytes: i64,
	mtime_ns: i64,
	mime_type: Option<String>,
	name: Option<String>,
	owner_id: &str,
	tags: &[String],
	metadata: Option<Value>,
	preview_id: Option<Uuid>,
	require_existing_tags: bool,
	tag_origin: TagOrigin,
) -> CatalogResult<IngestOutcome> {
	let txn = db.begin().await?;

	let (asset_model, asset_created) =
		upsert_asset_by_hash(&txn, content_hash, size_bytes, mime_type).await?;
	let file_path = abs_path.to_string_lossy().into_owned();
	let state_created = upsert_cache_state(&txn, asset_model.id, &file_path, mtime_ns).await?;

	let asset_info_id = if let Some(name) = name {
		Some(
			upsert_asset_info(
				&txn,
				config,
				asset_model.id,
				&name,
				owner_id,
				tags,
				metadata,
				preview_id,
				tag_origin,
				require_existing_tags,
			)
			.await?,
		)
	} else {
		None
	};

	txn.commit().await?;

	Ok(IngestOutcome {
		asset_id: asset_model.id,
		asset_created,
		state_created,
		asset_info_id,
	})
}

/// §4.4.B — register an `AssetInfo` against content already known by hash.
pub async fn register_existing_asset(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	content_hash: &str,
	name: &str,
	owner_id: &str,
	tags: &[String],
	metadata: Option<Value>,
) -> CatalogResult<Uuid> {
	let txn = db.begin().await?;

	let asset_model = asset::Entity::find()
		.filter(asset::Column::Hash.eq(content_hash))
		.one(&txn)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(content_hash.to_string()))?;

	let info_id = upsert_asset_info(
		&txn,
		config,
		asset_model.id,
		name,
		owner_id,
		tags,
		metadata,
		None,
		TagOrigin::Manual,
		false,
	)
	.await?;

	txn.commit().await?;
	Ok(info_id)
}

fn derive_extension(client_filename: Option<&str>) -> String {
	let Some(name) = client_filename else {
		return String::new();
	};
	let name = Path::new(name)
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_default();
	match name.rsplit_once('.') {
		Some((_, ext)) if !ext.is_empty() => {
			let candidate = format!(".{ext}");
			if candidate.len() <= 16 && !candidate.contains(['/', '\\']) {
				candidate
			} else {
				String::new()
			}
		}
		_ => String::new(),
	}
}

fn category_base<'a>(config: &'a CatalogConfig, category: &str) -> CatalogResult<&'a Path> {
	config
		.category_bases(category)
		.first()
		.map(PathBuf::as_path)
		.ok_or_else(|| CatalogError::InvalidBody(format!("unknown model category \"{category}\"")))
}

/// Upload orchestration: hash the staged temp file, dedupe by hash, or move
/// it into place under the configured root/category and ingest it (§4.4 B,
/// upload section).
pub async fn handle_upload(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	upload: ParsedUpload,
) -> CatalogResult<UploadResult> {
	let actual_hash = hash::hash_file(&upload.temp_file_path)
		.await
		.map_err(|e| CatalogError::UploadIo(e.to_string()))?;

	if let Some(ref expected) = upload.expected_hash {
		let normalized_expected = hash::normalize_hash(expected)?;
		if normalized_expected != actual_hash {
			let _ = tokio::fs::remove_file(&upload.temp_file_path).await;
			return Err(CatalogError::HashMismatch {
				expected: normalized_expected,
				actual: actual_hash,
			});
		}
	}

	let normalized_tags = normalize_tags(&upload.tags);

	if let Some(existing) = asset::Entity::find()
		.filter(asset::Column::Hash.eq(actual_hash.clone()))
		.one(db)
		.await?
	{
		let _ = tokio::fs::remove_file(&upload.temp_file_path).await;
		let name = upload
			.name
			.clone()
			.unwrap_or_else(|| upload.client_filename.clone().unwrap_or_else(|| actual_hash.clone()));
		let info_id = register_existing_asset(
			db,
			config,
			&actual_hash,
			&name,
			&upload.owner_id,
			&normalized_tags,
			upload.user_metadata.clone(),
		)
		.await?;
		return Ok(UploadResult {
			asset_info_id: info_id,
			asset_id: existing.id,
			asset_hash: actual_hash,
			size_bytes: existing.size_bytes,
			tags: normalized_tags,
			created_new: false,
		});
	}

	let (root, category) = path_utils::validate_upload_tags(&normalized_tags)?;
	let dest_dir = match (root, &category) {
		(crate::config::Root::Models, Some(category)) => category_base(config, category)?.to_path_buf(),
		(crate::config::Root::Input, _) => config.input_base.clone(),
		(crate::config::Root::Output, _) => config.output_base.clone(),
		(crate::config::Root::Models, None) => {
			return Err(CatalogError::InvalidBody("models uploads require a category tag".to_string()))
		}
	};

	tokio::fs::create_dir_all(&dest_dir)
		.await
		.map_err(|e| CatalogError::UploadIo(e.to_string()))?;

	let digest = actual_hash
		.strip_prefix(hash::ALGORITHM_PREFIX)
		.unwrap_or(&actual_hash);
	let ext = derive_extension(upload.client_filename.as_deref());
	let dest_path = dest_dir.join(format!("{digest}{ext}"));
	let dest_path = path_utils::ensure_within_base(&dest_path, &dest_dir)?;

	tokio::fs::rename(&upload.temp_file_path, &dest_path)
		.await
		.map_err(|e| CatalogError::UploadIo(e.to_string()))?;

	let meta = tokio::fs::metadata(&dest_path)
		.await
		.map_err(|e| CatalogError::UploadIo(e.to_string()))?;
	let size_bytes = meta.len() as i64;
	let mtime_ns = meta
		.modified()
		.ok()
		.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
		.map(|d| d.as_nanos() as i64)
		.unwrap_or(0);
	let mime_type = mime_guess::from_path(&dest_path).first().map(|m| m.essence_str().to_string());

	let (display_name, _) = path_utils::name_and_tags(config, &dest_path)?;
	let name = upload.name.clone().unwrap_or(display_name);

	let outcome = ingest_file_from_path(
		db,
		config,
		&dest_path,
		&actual_hash,
		size_bytes,
		mtime_ns,
		mime_type,
		Some(name),
		&upload.owner_id,
		&normalized_tags,
		upload.user_metadata.clone(),
		None,
		false,
		TagOrigin::Manual,
	)
	.await?;

	Ok(UploadResult {
		asset_info_id: outcome.asset_info_id.expect("name was always supplied"),
		asset_id: outcome.asset_id,
		asset_hash: actual_hash,
		size_bytes,
		tags: normalized_tags,
		created_new: true,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::Database;
	use std::collections::BTreeMap;
	use tempfile::TempDir;

	fn test_config(tmp: &TempDir) -> CatalogConfig {
		let mut model_categories = BTreeMap::new();
		model_categories.insert("loras".to_string(), vec![tmp.path().join("models/loras")]);
		CatalogConfig {
			input_base: tmp.path().join("input"),
			output_base: tmp.path().join("output"),
			model_categories,
			database_path: tmp.path().join("catalog.db"),
			max_bind_params: 800,
		}
	}

	#[tokio::test]
	async fn ingest_is_idempotent_on_repeat() {
		let db = Database::connect_in_memory().await.unwrap();
		let tmp = TempDir::new().unwrap();
		let config = test_config(&tmp);
		std::fs::create_dir_all(&config.input_base).unwrap();
		let path = config.input_base.join("a.txt");
		std::fs::write(&path, b"hello").unwrap();
		let h = hash::hash_bytes(b"hello");

		let first = ingest_file_from_path(
			db.conn(),
			&config,
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
			TagOrigin::Manual,
		)
		.await
		.unwrap();
		assert!(first.asset_created);

		let second = ingest_file_from_path(
			db.conn(),
			&config,
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
			TagOrigin::Manual,
		)
		.await
		.unwrap();
		assert!(!second.asset_created);
		assert_eq!(first.asset_info_id, second.asset_info_id);
	}

	#[test]
	fn derive_extension_respects_length_cap() {
		assert_eq!(derive_extension(Some("file.txt")), ".txt");
		assert_eq!(derive_extension(Some("file")), "");
		assert_eq!(derive_extension(None), "");
		assert_eq!(derive_extension(Some("file.averylongextensionthatistoobig")), "");
	}
}

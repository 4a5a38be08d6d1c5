//! Filesystem reconciler (§4.6). Four phases, each its own commit; a
//! failure in one phase is logged and does not stop the rest.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sea_orm::{
	ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, ConnectionTrait,
	DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use sea_orm::sea_query::{Expr, OnConflict};
use serde_json::{Map, Value};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::{CatalogConfig, Root};
use crate::db::entities::{asset, asset_cache_state, asset_info, asset_info_tag, tag};
use crate::error::CatalogResult;
use crate::ingest::clear_missing_tag_for_asset;
use crate::metadata::replace_asset_info_metadata_projection;
use crate::path_utils;
use crate::query::{chunks_for, rows_per_stmt};

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
	pub reconciled_assets: usize,
	pub pruned_states: usize,
	pub pruned_assets: usize,
	pub seeded: Vec<SeededFile>,
}

#[derive(Debug, Clone)]
pub struct SeededFile {
	pub asset_id: Uuid,
	pub asset_info_id: Uuid,
	pub path: String,
}

struct DiscoveredFile {
	path: PathBuf,
	size: i64,
	mtime_ns: i64,
}

struct PendingSeed<'a> {
	file: &'a DiscoveredFile,
	asset_id: Uuid,
	info_id: Uuid,
	name: String,
	tags: Vec<String>,
}

fn mtime_ns_of(meta: &std::fs::Metadata) -> i64 {
	meta.modified()
		.ok()
		.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
		.map(|d| d.as_nanos() as i64)
		.unwrap_or(0)
}

fn base_paths_for_root(config: &CatalogConfig, root: Root) -> Vec<PathBuf> {
	match root {
		Root::Input => vec![config.input_base.clone()],
		Root::Output => vec![config.output_base.clone()],
		Root::Models => config
			.all_model_category_bases()
			.map(|(_, base)| base.to_path_buf())
			.collect(),
	}
}

/// Run a scan over `roots` (a subset of `models`/`input`/`output`).
pub async fn run_scan(db: &DatabaseConnection, config: &CatalogConfig, roots: &[Root]) -> CatalogResult<ScanReport> {
	let mut report = ScanReport::default();

	for root in roots {
		match reconcile_root(db, config, *root).await {
			Ok(n) => report.reconciled_assets += n,
			Err(e) => tracing::error!(error = %e, ?root, "scanner phase 1 failed"),
		}
	}

	match prune_outside_roots(db, config, roots).await {
		Ok((states, assets)) => {
			report.pruned_states = states;
			report.pruned_assets = assets;
		}
		Err(e) => tracing::error!(error = %e, "scanner phase 2 failed"),
	}

	let discovered = match discover_new_files(db, config, roots).await {
		Ok(d) => d,
		Err(e) => {
			tracing::error!(error = %e, "scanner phase 3 failed");
			Vec::new()
		}
	};

	match seed_batch(db, config, discovered).await {
		Ok(seeded) => report.seeded = seeded,
		Err(e) => tracing::error!(error = %e, "scanner phase 4 failed"),
	}

	Ok(report)
}

/// Phase 1 — reconcile existing `AssetCacheState` rows under `root`'s bases.
async fn reconcile_root(db: &DatabaseConnection, config: &CatalogConfig, root: Root) -> CatalogResult<usize> {
	let bases = base_paths_for_root(config, root);
	if bases.is_empty() {
		return Ok(0);
	}
	let bases_norm: Vec<PathBuf> = bases.iter().map(|b| path_utils::normalize(b)).collect();

	let in_root: Vec<asset_cache_state::Model> = asset_cache_state::Entity::find()
		.all(db)
		.await?
		.into_iter()
		.filter(|s| {
			let p = path_utils::normalize(Path::new(&s.file_path));
			bases_norm.iter().any(|b| p.starts_with(b))
		})
		.collect();

	let mut by_asset: HashMap<Uuid, Vec<asset_cache_state::Model>> = HashMap::new();
	for state in in_root {
		by_asset.entry(state.asset_id).or_default().push(state);
	}

	let mut verify_true: Vec<i32> = Vec::new();
	let mut verify_false: Vec<i32> = Vec::new();
	let mut touched = 0usize;

	for (asset_id, states) in &by_asset {
		let Some(asset_model) = asset::Entity::find_by_id(*asset_id).one(db).await? else {
			continue;
		};

		let mut fast_ok_any = false;
		let mut any_exist = false;
		let mut missing_ids: Vec<i32> = Vec::new();

		for state in states {
			match tokio::fs::metadata(&state.file_path).await {
				Ok(meta) => {
					any_exist = true;
					let actual_size = meta.len() as i64;
					let actual_mtime = mtime_ns_of(&meta);
					let fast_ok = state.mtime_ns == actual_mtime
						&& (asset_model.size_bytes == 0 || asset_model.size_bytes == actual_size);
					if fast_ok {
						fast_ok_any = true;
						verify_false.push(state.id);
					} else {
						verify_true.push(state.id);
					}
				}
				Err(_) => missing_ids.push(state.id),
			}
		}

		if asset_model.is_seed() {
			if !any_exist {
				asset::Entity::delete_by_id(*asset_id).exec(db).await?;
			}
			touched += 1;
			continue;
		}

		if fast_ok_any {
			if !missing_ids.is_empty() {
				asset_cache_state::Entity::delete_many()
					.filter(asset_cache_state::Column::Id.is_in(missing_ids))
					.exec(db)
					.await?;
			}
			clear_missing_tag_for_asset(db, *asset_id).await?;
		} else {
			add_missing_tag_for_asset(db, *asset_id).await?;
		}
		touched += 1;
	}

	for chunk in chunks_for(&verify_true, config.max_bind_params, 1) {
		asset_cache_state::Entity::update_many()
			.col_expr(asset_cache_state::Column::NeedsVerify, Expr::value(true))
			.filter(asset_cache_state::Column::Id.is_in(chunk.to_vec()))
			.exec(db)
			.await?;
	}
	for chunk in chunks_for(&verify_false, config.max_bind_params, 1) {
		asset_cache_state::Entity::update_many()
			.col_expr(asset_cache_state::Column::NeedsVerify, Expr::value(false))
			.filter(asset_cache_state::Column::Id.is_in(chunk.to_vec()))
			.exec(db)
			.await?;
	}

	Ok(touched)
}

async fn ensure_missing_tag_exists<C: ConnectionTrait>(db: &C) -> CatalogResult<()> {
	if tag::Entity::find_by_id(tag::MISSING_TAG).one(db).await?.is_none() {
		let active = tag::ActiveModel {
			name: Set(tag::MISSING_TAG.to_string()),
			tag_type: Set(tag::TagType::System),
		};
		let _ = active.insert(db).await;
	}
	Ok(())
}

async fn add_missing_tag_for_asset<C: ConnectionTrait>(db: &C, asset_id: Uuid) -> CatalogResult<()> {
	ensure_missing_tag_exists(db).await?;
	let infos = asset_info::Entity::find()
		.filter(asset_info::Column::AssetId.eq(asset_id))
		.all(db)
		.await?;
	for info in infos {
		if asset_info_tag::Entity::find_by_id((info.id, tag::MISSING_TAG.to_string()))
			.one(db)
			.await?
			.is_some()
		{
			continue;
		}
		let link = asset_info_tag::ActiveModel {
			asset_info_id: Set(info.id),
			tag_name: Set(tag::MISSING_TAG.to_string()),
			origin: Set(asset_info_tag::TagOrigin::Automatic),
			added_at: Set(Utc::now()),
		};
		let _ = link.insert(db).await;
	}
	Ok(())
}

/// Phase 2 — drop cache states outside `roots`' bases, then orphaned seed assets.
async fn prune_outside_roots(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	roots: &[Root],
) -> CatalogResult<(usize, usize)> {
	let allowed_norm: Vec<PathBuf> = roots
		.iter()
		.flat_map(|r| base_paths_for_root(config, *r))
		.map(|b| path_utils::normalize(&b))
		.collect();

	let outside_ids: Vec<i32> = asset_cache_state::Entity::find()
		.all(db)
		.await?
		.into_iter()
		.filter(|s| {
			let p = path_utils::normalize(Path::new(&s.file_path));
			!allowed_norm.iter().any(|b| p.starts_with(b))
		})
		.map(|s| s.id)
		.collect();

	let pruned_states = outside_ids.len();
	for chunk in chunks_for(&outside_ids, config.max_bind_params, 1) {
		asset_cache_state::Entity::delete_many()
			.filter(asset_cache_state::Column::Id.is_in(chunk.to_vec()))
			.exec(db)
			.await?;
	}

	let seed_assets = asset::Entity::find()
		.filter(asset::Column::Hash.is_null())
		.all(db)
		.await?;
	let mut pruned_assets = 0usize;
	for a in seed_assets {
		let remaining = asset_cache_state::Entity::find()
			.filter(asset_cache_state::Column::AssetId.eq(a.id))
			.count(db)
			.await?;
		if remaining == 0 {
			asset::Entity::delete_by_id(a.id).exec(db).await?;
			pruned_assets += 1;
		}
	}

	Ok((pruned_states, pruned_assets))
}

/// Phase 3 — walk `roots` for files not already tracked by a surviving path.
async fn discover_new_files(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	roots: &[Root],
) -> CatalogResult<Vec<DiscoveredFile>> {
	let mut existing: HashSet<PathBuf> = asset_cache_state::Entity::find()
		.all(db)
		.await?
		.into_iter()
		.map(|s| path_utils::normalize(Path::new(&s.file_path)))
		.collect();

	let mut discovered = Vec::new();
	for root in roots {
		for base in base_paths_for_root(config, *root) {
			if !base.exists() {
				continue;
			}
			for entry in WalkDir::new(&base).follow_links(false).into_iter().filter_map(Result::ok) {
				if !entry.file_type().is_file() {
					continue;
				}
				let path = entry.path().to_path_buf();
				let norm = path_utils::normalize(&path);
				if existing.contains(&norm) {
					continue;
				}
				let Ok(meta) = entry.metadata() else { continue };
				let size = meta.len() as i64;
				if size == 0 {
					continue;
				}
				let mtime_ns = mtime_ns_of(&meta);
				existing.insert(norm);
				discovered.push(DiscoveredFile { path, size, mtime_ns });
			}
		}
	}
	Ok(discovered)
}

fn seed_batch_size(config: &CatalogConfig) -> usize {
	rows_per_stmt(config.max_bind_params, 8)
}

/// Phase 4 — batch-seed discovered files, tolerating concurrent writers via
/// `ON CONFLICT DO NOTHING` and a winners/losers requery.
async fn seed_batch(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	discovered: Vec<DiscoveredFile>,
) -> CatalogResult<Vec<SeededFile>> {
	let mut seeded = Vec::new();
	for chunk in discovered.chunks(seed_batch_size(config).max(1)) {
		match seed_one_batch(db, config, chunk).await {
			Ok(mut s) => seeded.append(&mut s),
			Err(e) => tracing::error!(error = %e, "scanner phase 4 batch failed"),
		}
	}
	Ok(seeded)
}

async fn ensure_tag_vocabulary<C: ConnectionTrait>(db: &C, pendings: &[PendingSeed<'_>]) -> CatalogResult<()> {
	let mut names = HashSet::new();
	for p in pendings {
		for t in &p.tags {
			names.insert(t.clone());
		}
	}
	for name in names {
		if tag::Entity::find_by_id(name.clone()).one(db).await?.is_none() {
			let active = tag::ActiveModel {
				name: Set(name),
				tag_type: Set(tag::TagType::User),
			};
			let _ = active.insert(db).await;
		}
	}
	Ok(())
}

async fn seed_one_batch(
	db: &DatabaseConnection,
	config: &CatalogConfig,
	batch: &[DiscoveredFile],
) -> CatalogResult<Vec<SeededFile>> {
	if batch.is_empty() {
		return Ok(Vec::new());
	}

	let txn = db.begin().await?;
	let now = Utc::now();

	let mut pending = Vec::with_capacity(batch.len());
	let mut asset_models = Vec::with_capacity(batch.len());
	for file in batch {
		let (name, tags) = path_utils::name_and_tags(config, &file.path)?;
		let asset_id = Uuid::new_v4();
		let info_id = Uuid::new_v4();
		asset_models.push(asset::ActiveModel {
			id: Set(asset_id),
			hash: Set(None),
			size_bytes: Set(file.size),
			mime_type: Set(None),
			created_at: Set(now),
		});
		pending.push(PendingSeed {
			file,
			asset_id,
			info_id,
			name,
			tags,
		});
	}
	asset::Entity::insert_many(asset_models).exec(&txn).await?;

	let cache_models: Vec<_> = pending
		.iter()
		.map(|p| asset_cache_state::ActiveModel {
			id: NotSet,
			asset_id: Set(p.asset_id),
			file_path: Set(p.file.path.to_string_lossy().into_owned()),
			mtime_ns: Set(p.file.mtime_ns),
			needs_verify: Set(false),
		})
		.collect();
	let _ = asset_cache_state::Entity::insert_many(cache_models)
		.on_conflict(OnConflict::column(asset_cache_state::Column::FilePath).do_nothing().to_owned())
		.exec(&txn)
		.await;

	let paths: Vec<String> = pending.iter().map(|p| p.file.path.to_string_lossy().into_owned()).collect();
	let winners_by_path: HashMap<String, Uuid> = asset_cache_state::Entity::find()
		.filter(asset_cache_state::Column::FilePath.is_in(paths))
		.all(&txn)
		.await?
		.into_iter()
		.map(|r| (r.file_path, r.asset_id))
		.collect();

	let mut loser_asset_ids = Vec::new();
	let mut winners = Vec::new();
	for p in pending {
		let path_str = p.file.path.to_string_lossy().into_owned();
		match winners_by_path.get(&path_str) {
			Some(owner_asset_id) if *owner_asset_id == p.asset_id => winners.push(p),
			_ => loser_asset_ids.push(p.asset_id),
		}
	}

	if !loser_asset_ids.is_empty() {
		asset::Entity::delete_many()
			.filter(asset::Column::Id.is_in(loser_asset_ids))
			.exec(&txn)
			.await?;
	}

	if winners.is_empty() {
		txn.commit().await?;
		return Ok(Vec::new());
	}

	ensure_tag_vocabulary(&txn, &winners).await?;

	let info_models: Vec<_> = winners
		.iter()
		.map(|p| asset_info::ActiveModel {
			id: Set(p.info_id),
			asset_id: Set(p.asset_id),
			owner_id: Set(String::new()),
			name: Set(p.name.clone()),
			preview_id: Set(None),
			user_metadata: Set(Value::Object(Map::new())),
			created_at: Set(now),
			updated_at: Set(now),
			last_access_time: Set(now),
		})
		.collect();
	let _ = asset_info::Entity::insert_many(info_models)
		.on_conflict(
			OnConflict::columns([
				asset_info::Column::AssetId,
				asset_info::Column::OwnerId,
				asset_info::Column::Name,
			])
			.do_nothing()
			.to_owned(),
		)
		.exec(&txn)
		.await;

	let info_ids: Vec<Uuid> = winners.iter().map(|p| p.info_id).collect();
	let surviving: HashSet<Uuid> = asset_info::Entity::find()
		.filter(asset_info::Column::Id.is_in(info_ids))
		.all(&txn)
		.await?
		.into_iter()
		.map(|i| i.id)
		.collect();

	let mut seeded = Vec::new();
	for p in &winners {
		if !surviving.contains(&p.info_id) {
			continue;
		}
		for tag_name in &p.tags {
			let link = asset_info_tag::ActiveModel {
				asset_info_id: Set(p.info_id),
				tag_name: Set(tag_name.clone()),
				origin: Set(asset_info_tag::TagOrigin::Automatic),
				added_at: Set(now),
			};
			let _ = link.insert(&txn).await;
		}

		let filename = path_utils::relative_filename(config, &p.file.path).unwrap_or_default();
		let mut map = Map::new();
		map.insert("filename".to_string(), Value::String(filename));
		let metadata_value = Value::Object(map);
		replace_asset_info_metadata_projection(&txn, p.info_id, &metadata_value).await?;

		if let Some(info) = asset_info::Entity::find_by_id(p.info_id).one(&txn).await? {
			let mut active: asset_info::ActiveModel = info.into();
			active.user_metadata = Set(metadata_value);
			active.update(&txn).await?;
		}

		seeded.push(SeededFile {
			asset_id: p.asset_id,
			asset_info_id: p.info_id,
			path: p.file.path.to_string_lossy().into_owned(),
		});
	}

	txn.commit().await?;
	Ok(seeded)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::db::Database;
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

	#[tokio::test]
	async fn scan_is_idempotent() {
		let db = Database::connect_in_memory().await.unwrap();
		let tmp = TempDir::new().unwrap();
		let config = test_config(&tmp);
		std::fs::create_dir_all(&config.input_base).unwrap();
		std::fs::write(config.input_base.join("a.txt"), b"hello").unwrap();

		let first = run_scan(db.conn(), &config, &[Root::Input]).await.unwrap();
		assert_eq!(first.seeded.len(), 1);

		let second = run_scan(db.conn(), &config, &[Root::Input]).await.unwrap();
		assert_eq!(second.seeded.len(), 0);

		let assets = asset::Entity::find().all(db.conn()).await.unwrap();
		assert_eq!(assets.len(), 1);
	}

	#[tokio::test]
	async fn dropped_seed_file_is_deleted_on_rescan() {
		let db = Database::connect_in_memory().await.unwrap();
		let tmp = TempDir::new().unwrap();
		let config = test_config(&tmp);
		std::fs::create_dir_all(&config.input_base).unwrap();
		let path = config.input_base.join("a.txt");
		std::fs::write(&path, b"hello").unwrap();

		run_scan(db.conn(), &config, &[Root::Input]).await.unwrap();
		std::fs::remove_file(&path).unwrap();
		run_scan(db.conn(), &config, &[Root::Input]).await.unwrap();

		let assets = asset::Entity::find().all(db.conn()).await.unwrap();
		assert!(assets.is_empty());
		let infos = asset_info::Entity::find().all(db.conn()).await.unwrap();
		assert!(infos.is_empty());
	}
}

//! Best-live-path selection (§4.5) and content resolution for download (§4.8).

use std::path::{Path, PathBuf};

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::db::entities::{asset, asset_cache_state, asset_info};
use crate::error::{CatalogError, CatalogResult};
use crate::query::owner_visibility_condition;

/// Select which on-disk path to hand out for an asset, per §4.5:
/// 1. only paths that currently exist
/// 2. prefer one with `needs_verify = false`
/// 3. otherwise the first existing path
/// 4. `None` if nothing exists
pub async fn best_live_path(states: &[asset_cache_state::Model]) -> Option<&asset_cache_state::Model> {
	let mut existing = Vec::new();
	for state in states {
		if tokio::fs::try_exists(&state.file_path).await.unwrap_or(false) {
			existing.push(state);
		}
	}
	if existing.is_empty() {
		return None;
	}
	existing
		.iter()
		.find(|s| !s.needs_verify)
		.copied()
		.or_else(|| existing.first().copied())
}

pub struct ResolvedContent {
	pub path: PathBuf,
	pub content_type: String,
	pub download_name: String,
}

/// Resolve the file to stream for `info_id` as seen by `caller_owner_id`.
pub async fn resolve_content<C: ConnectionTrait>(
	db: &C,
	info_id: Uuid,
	caller_owner_id: &str,
) -> CatalogResult<ResolvedContent> {
	let info = asset_info::Entity::find_by_id(info_id)
		.filter(owner_visibility_condition(caller_owner_id))
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info_id.to_string()))?;

	let asset = asset::Entity::find_by_id(info.asset_id)
		.one(db)
		.await?
		.ok_or_else(|| CatalogError::AssetNotFound(info.asset_id.to_string()))?;

	let states = asset_cache_state::Entity::find()
		.filter(asset_cache_state::Column::AssetId.eq(info.asset_id))
		.all(db)
		.await?;

	let Some(live) = best_live_path(&states).await else {
		return Err(CatalogError::FileNotFound);
	};
	let path = PathBuf::from(&live.file_path);

	touch_last_access_time_if_newer(db, info.id, Utc::now()).await?;

	let content_type = asset
		.mime_type
		.clone()
		.or_else(|| mime_guess::from_path(&path).first().map(|m| m.essence_str().to_string()))
		.unwrap_or_else(|| "application/octet-stream".to_string());

	let download_name = if info.name.is_empty() {
		basename(&path)
	} else {
		info.name.clone()
	};

	Ok(ResolvedContent {
		path,
		content_type,
		download_name,
	})
}

fn basename(path: &Path) -> String {
	path.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| "download".to_string())
}

/// Best-effort `last_access_time` touch: only raises the value, never lowers it.
pub async fn touch_last_access_time_if_newer<C: ConnectionTrait>(
	db: &C,
	info_id: Uuid,
	candidate: chrono::DateTime<Utc>,
) -> CatalogResult<()> {
	let Some(info) = asset_info::Entity::find_by_id(info_id).one(db).await? else {
		return Ok(());
	};
	if candidate <= info.last_access_time {
		return Ok(());
	}
	let mut active: asset_info::ActiveModel = info.into();
	active.last_access_time = Set(candidate);
	if let Err(e) = active.update(db).await {
		tracing::warn!(error = %e, %info_id, "failed to touch last_access_time");
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::NamedTempFile;

	fn make_state(path: String, needs_verify: bool) -> asset_cache_state::Model {
		asset_cache_state::Model {
			id: 0,
			asset_id: Uuid::nil(),
			file_path: path,
			mtime_ns: 0,
			needs_verify,
		}
	}

	#[tokio::test]
	async fn best_live_path_prefers_verified() {
		let f1 = NamedTempFile::new().unwrap();
		let f2 = NamedTempFile::new().unwrap();
		let states = vec![
			make_state(f1.path().to_string_lossy().into_owned(), true),
			make_state(f2.path().to_string_lossy().into_owned(), false),
		];
		let chosen = best_live_path(&states).await.unwrap();
		assert_eq!(chosen.file_path, f2.path().to_string_lossy());
	}

	#[tokio::test]
	async fn best_live_path_falls_back_to_any_existing() {
		let f1 = NamedTempFile::new().unwrap();
		let states = vec![make_state(f1.path().to_string_lossy().into_owned(), true)];
		let chosen = best_live_path(&states).await.unwrap();
		assert_eq!(chosen.file_path, f1.path().to_string_lossy());
	}

	#[tokio::test]
	async fn best_live_path_none_when_nothing_exists() {
		let states = vec![make_state("/nonexistent/path/xyz".to_string(), false)];
		assert!(best_live_path(&states).await.is_none());
	}
}

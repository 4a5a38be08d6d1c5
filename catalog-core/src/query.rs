//! Atomic, side-effect-free read/filter operations (§4.2).

use std::collections::{HashMap, HashSet};

use sea_orm::sea_query::Expr;
use sea_orm::{
	ColumnTrait, Condition, ConnectionTrait, EntityTrait, Order, PaginatorTrait, QueryFilter,
	QueryOrder, QuerySelect,
};
use serde_json::Value;
use uuid::Uuid;

use crate::db::entities::{asset, asset_info, asset_info_meta, asset_info_tag};
use crate::error::CatalogResult;

/// SQLite's practical parameter-count limit; bulk statements chunk rows so
/// `rows_per_stmt * columns_per_row <= max_bind_params`.
pub const DEFAULT_MAX_BIND_PARAMS: usize = 800;

/// How many rows of `columns_per_row` columns fit in one statement under `max_bind_params`.
pub fn rows_per_stmt(max_bind_params: usize, columns_per_row: usize) -> usize {
	(max_bind_params / columns_per_row.max(1)).max(1)
}

/// Split a slice into chunks sized to respect the bind-parameter cap for a
/// statement with `columns_per_row` bound parameters per row.
pub fn chunks_for<'a, T>(items: &'a [T], max_bind_params: usize, columns_per_row: usize) -> impl Iterator<Item = &'a [T]> {
	items.chunks(rows_per_stmt(max_bind_params, columns_per_row))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortKey {
	Name,
	CreatedAt,
	UpdatedAt,
	LastAccessTime,
	Size,
}

impl SortKey {
	/// Unknown values fall back to `created_at`.
	pub fn from_query(s: Option<&str>) -> Self {
		match s {
			Some("name") => Self::Name,
			Some("created_at") => Self::CreatedAt,
			Some("updated_at") => Self::UpdatedAt,
			Some("last_access_time") => Self::LastAccessTime,
			Some("size") => Self::Size,
			_ => Self::CreatedAt,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
	Asc,
	Desc,
}

impl SortOrder {
	/// Unknown values fall back to `desc`.
	pub fn from_query(s: Option<&str>) -> Self {
		match s {
			Some("asc") => Self::Asc,
			_ => Self::Desc,
		}
	}

	fn as_sea_orm(&self) -> Order {
		match self {
			Self::Asc => Order::Asc,
			Self::Desc => Order::Desc,
		}
	}
}

/// The owner-visibility predicate: rows whose `owner_id` is `""` (public) or
/// equal to `caller_owner_id` are visible.
pub fn owner_visibility_condition(caller_owner_id: &str) -> Condition {
	Condition::any()
		.add(asset_info::Column::OwnerId.eq(""))
		.add(asset_info::Column::OwnerId.eq(caller_owner_id))
}

/// Writes (update/delete) succeed only against rows the caller owns or that
/// are public; same predicate as reads, kept as a distinct name for clarity
/// at call sites.
pub fn owner_write_condition(caller_owner_id: &str) -> Condition {
	owner_visibility_condition(caller_owner_id)
}

fn escape_like_pattern(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for c in input.chars() {
		match c {
			'\\' => out.push_str("\\\\"),
			'%' => out.push_str("\\%"),
			'_' => out.push_str("\\_"),
			other => out.push(other),
		}
	}
	out
}

fn name_contains_condition(substring: &str) -> Condition {
	let pattern = format!("%{}%", escape_like_pattern(substring));
	Condition::all().add(Expr::cust_with_values(
		"asset_infos.name LIKE ? ESCAPE '\\'",
		[pattern],
	))
}

/// `asset_info_id`s that carry every tag in `tags` (AND of n membership checks).
async fn ids_with_all_tags<C: ConnectionTrait>(db: &C, tags: &[String]) -> CatalogResult<HashSet<Uuid>> {
	if tags.is_empty() {
		return Ok(HashSet::new());
	}
	let mut counts: HashMap<Uuid, usize> = HashMap::new();
	let rows = asset_info_tag::Entity::find()
		.filter(asset_info_tag::Column::TagName.is_in(tags.to_vec()))
		.all(db)
		.await?;
	for row in rows {
		*counts.entry(row.asset_info_id).or_insert(0) += 1;
	}
	Ok(counts
		.into_iter()
		.filter(|(_, c)| *c == tags.len())
		.map(|(id, _)| id)
		.collect())
}

/// `asset_info_id`s carrying any tag in `tags`.
async fn ids_with_any_tag<C: ConnectionTrait>(db: &C, tags: &[String]) -> CatalogResult<HashSet<Uuid>> {
	if tags.is_empty() {
		return Ok(HashSet::new());
	}
	let rows = asset_info_tag::Entity::find()
		.filter(asset_info_tag::Column::TagName.is_in(tags.to_vec()))
		.all(db)
		.await?;
	Ok(rows.into_iter().map(|r| r.asset_info_id).collect())
}

fn json_number_as_f64(value: &Value) -> Option<f64> {
	match value {
		Value::Number(n) => n.as_f64(),
		_ => None,
	}
}

/// `asset_info_id`s whose projected metadata for `key` matches `value`, per
/// the scalar/list/null rules in §4.2.
async fn ids_matching_metadata_value<C: ConnectionTrait>(
	db: &C,
	key: &str,
	value: &Value,
) -> CatalogResult<HashSet<Uuid>> {
	let rows = asset_info_meta::Entity::find()
		.filter(asset_info_meta::Column::Key.eq(key))
		.all(db)
		.await?;

	let matches_scalar = |row: &asset_info_meta::Model, v: &Value| -> bool {
		match v {
			Value::Bool(b) => row.val_bool == Some(*b),
			Value::Number(_) => row.val_num.is_some() && json_number_as_f64(v) == row.val_num,
			Value::String(s) => row.val_str.as_deref() == Some(s.as_str()),
			Value::Null => row.is_null(),
			other => row.val_json.as_ref() == Some(other),
		}
	};

	match value {
		Value::Null => {
			// Matching set = all asset_info ids EXCEPT those with a non-null row for this key.
			let non_null_ids: HashSet<Uuid> = rows
				.iter()
				.filter(|r| !r.is_null())
				.map(|r| r.asset_info_id)
				.collect();
			let all_ids: HashSet<Uuid> = asset_info::Entity::find()
				.all(db)
				.await?
				.into_iter()
				.map(|i| i.id)
				.collect();
			Ok(all_ids.difference(&non_null_ids).copied().collect())
		}
		Value::Array(elements) => Ok(rows
			.iter()
			.filter(|r| elements.iter().any(|e| matches_scalar(r, e)))
			.map(|r| r.asset_info_id)
			.collect()),
		scalar => Ok(rows
			.iter()
			.filter(|r| matches_scalar(r, scalar))
			.map(|r| r.asset_info_id)
			.collect()),
	}
}

/// Intersect matching ids across every key in the filter map (AND across keys).
pub async fn ids_matching_metadata_filter<C: ConnectionTrait>(
	db: &C,
	filter: &serde_json::Map<String, Value>,
) -> CatalogResult<Option<HashSet<Uuid>>> {
	if filter.is_empty() {
		return Ok(None);
	}
	let mut acc: Option<HashSet<Uuid>> = None;
	for (key, value) in filter {
		let ids = ids_matching_metadata_value(db, key, value).await?;
		acc = Some(match acc {
			None => ids,
			Some(prev) => prev.intersection(&ids).copied().collect(),
		});
	}
	Ok(acc)
}

/// Filter parameters for [`list_assets`].
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
	pub include_tags: Vec<String>,
	pub exclude_tags: Vec<String>,
	pub name_contains: Option<String>,
	pub metadata_filter: Option<serde_json::Map<String, Value>>,
	pub sort: SortKey,
	pub order: SortOrder,
	pub limit: u64,
	pub offset: u64,
}

impl Default for SortKey {
	fn default() -> Self {
		Self::CreatedAt
	}
}

impl Default for SortOrder {
	fn default() -> Self {
		Self::Desc
	}
}

/// `(rows, tag_map, total)` — `tag_map` is ordered by `added_at` per asset.
pub async fn list_assets<C: ConnectionTrait>(
	db: &C,
	caller_owner_id: &str,
	filter: &ListFilter,
) -> CatalogResult<(Vec<(asset_info::Model, asset::Model)>, HashMap<Uuid, Vec<String>>, u64)> {
	let mut condition = Condition::all().add(owner_visibility_condition(caller_owner_id));

	if let Some(ref substring) = filter.name_contains {
		condition = condition.add(name_contains_condition(substring));
	}

	if !filter.include_tags.is_empty() {
		let ids = ids_with_all_tags(db, &filter.include_tags).await?;
		condition = condition.add(asset_info::Column::Id.is_in(ids));
	}
	if !filter.exclude_tags.is_empty() {
		let ids = ids_with_any_tag(db, &filter.exclude_tags).await?;
		condition = condition.add(asset_info::Column::Id.is_not_in(ids));
	}
	if let Some(ref meta_filter) = filter.metadata_filter {
		if let Some(ids) = ids_matching_metadata_filter(db, meta_filter).await? {
			condition = condition.add(asset_info::Column::Id.is_in(ids));
		}
	}

	let total = asset_info::Entity::find()
		.filter(condition.clone())
		.count(db)
		.await?;

	let mut select = asset_info::Entity::find()
		.filter(condition)
		.find_also_related(asset::Entity);

	select = match filter.sort {
		SortKey::Name => select.order_by(asset_info::Column::Name, filter.order.as_sea_orm()),
		SortKey::CreatedAt => select.order_by(asset_info::Column::CreatedAt, filter.order.as_sea_orm()),
		SortKey::UpdatedAt => select.order_by(asset_info::Column::UpdatedAt, filter.order.as_sea_orm()),
		SortKey::LastAccessTime => {
			select.order_by(asset_info::Column::LastAccessTime, filter.order.as_sea_orm())
		}
		SortKey::Size => select.order_by(asset::Column::SizeBytes, filter.order.as_sea_orm()),
	};

	let rows = select
		.limit(filter.limit)
		.offset(filter.offset)
		.all(db)
		.await?
		.into_iter()
		.filter_map(|(info, asset)| asset.map(|a| (info, a)))
		.collect::<Vec<_>>();

	let ids: Vec<Uuid> = rows.iter().map(|(i, _)| i.id).collect();
	let tag_map = fetch_tag_map(db, &ids).await?;

	Ok((rows, tag_map, total))
}

/// Tag names per `asset_info_id`, ordered by `added_at` so rendered tag
/// order is stable.
pub async fn fetch_tag_map<C: ConnectionTrait>(db: &C, ids: &[Uuid]) -> CatalogResult<HashMap<Uuid, Vec<String>>> {
	if ids.is_empty() {
		return Ok(HashMap::new());
	}
	let links = asset_info_tag::Entity::find()
		.filter(asset_info_tag::Column::AssetInfoId.is_in(ids.to_vec()))
		.order_by_asc(asset_info_tag::Column::AddedAt)
		.all(db)
		.await?;

	let mut map: HashMap<Uuid, Vec<String>> = HashMap::new();
	for link in links {
		map.entry(link.asset_info_id).or_default().push(link.tag_name);
	}
	Ok(map)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rows_per_stmt_respects_cap() {
		assert_eq!(rows_per_stmt(800, 8), 100);
		assert_eq!(rows_per_stmt(800, 801), 1);
	}

	#[test]
	fn sort_key_falls_back_to_created_at() {
		assert_eq!(SortKey::from_query(Some("bogus")), SortKey::CreatedAt);
		assert_eq!(SortKey::from_query(Some("size")), SortKey::Size);
	}

	#[test]
	fn sort_order_falls_back_to_desc() {
		assert_eq!(SortOrder::from_query(Some("bogus")), SortOrder::Desc);
		assert_eq!(SortOrder::from_query(Some("asc")), SortOrder::Asc);
	}

	#[test]
	fn escape_like_pattern_escapes_wildcards() {
		assert_eq!(escape_like_pattern("50%_off\\"), "50\\%\\_off\\\\");
	}
}

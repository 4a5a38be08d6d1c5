//! EAV projection of `AssetInfo.user_metadata` (§4.3).

use sea_orm::{ActiveModelTrait, ActiveValue::Set, ActiveValue::NotSet, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use uuid::Uuid;

use crate::db::entities::asset_info_meta;
use crate::error::CatalogResult;

/// One row of the EAV projection, before it is attached to an `asset_info_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRow {
	pub key: String,
	pub ordinal: i32,
	pub val_str: Option<String>,
	pub val_num: Option<f64>,
	pub val_bool: Option<bool>,
	pub val_json: Option<Value>,
}

fn is_scalar(value: &Value) -> bool {
	matches!(value, Value::Bool(_) | Value::Number(_) | Value::String(_))
}

fn scalar_row(key: &str, ordinal: i32, value: &Value) -> MetaRow {
	match value {
		Value::Bool(b) => MetaRow {
			key: key.to_string(),
			ordinal,
			val_str: None,
			val_num: None,
			val_bool: Some(*b),
			val_json: None,
		},
		Value::Number(n) => MetaRow {
			key: key.to_string(),
			ordinal,
			val_str: None,
			val_num: n.as_f64(),
			val_bool: None,
			val_json: None,
		},
		Value::String(s) => MetaRow {
			key: key.to_string(),
			ordinal,
			val_str: Some(s.clone()),
			val_num: None,
			val_bool: None,
			val_json: None,
		},
		other => MetaRow {
			key: key.to_string(),
			ordinal,
			val_str: None,
			val_num: None,
			val_bool: None,
			val_json: Some(other.clone()),
		},
	}
}

/// Project a single `(key, value)` pair into one or more EAV rows, per the
/// rules in §4.3.
pub fn project_kv(key: &str, value: &Value) -> Vec<MetaRow> {
	match value {
		Value::Null => vec![MetaRow {
			key: key.to_string(),
			ordinal: 0,
			val_str: None,
			val_num: None,
			val_bool: None,
			val_json: None,
		}],
		Value::Array(items) => {
			if items.iter().all(is_scalar) {
				items
					.iter()
					.enumerate()
					.map(|(i, v)| scalar_row(key, i as i32, v))
					.collect()
			} else {
				items
					.iter()
					.enumerate()
					.map(|(i, v)| MetaRow {
						key: key.to_string(),
						ordinal: i as i32,
						val_str: None,
						val_num: None,
						val_bool: None,
						val_json: Some(v.clone()),
					})
					.collect()
			}
		}
		scalar if is_scalar(scalar) => vec![scalar_row(key, 0, scalar)],
		other => vec![MetaRow {
			key: key.to_string(),
			ordinal: 0,
			val_str: None,
			val_num: None,
			val_bool: None,
			val_json: Some(other.clone()),
		}],
	}
}

/// Delete all existing `AssetInfoMeta` rows for `asset_info_id`, re-project
/// `metadata` (must be a JSON object), write the new rows, and leave the
/// caller to persist the updated `user_metadata` column on `AssetInfo`.
///
/// Must be called within the caller's own transaction to stay atomic with
/// the `AssetInfo.user_metadata` update.
pub async fn replace_asset_info_metadata_projection<C: ConnectionTrait>(
	db: &C,
	asset_info_id: Uuid,
	metadata: &Value,
) -> CatalogResult<()> {
	asset_info_meta::Entity::delete_many()
		.filter(asset_info_meta::Column::AssetInfoId.eq(asset_info_id))
		.exec(db)
		.await?;

	let Value::Object(map) = metadata else {
		return Ok(());
	};

	for (key, value) in map {
		for row in project_kv(key, value) {
			let active = asset_info_meta::ActiveModel {
				id: NotSet,
				asset_info_id: Set(asset_info_id),
				key: Set(row.key),
				ordinal: Set(row.ordinal),
				val_str: Set(row.val_str),
				val_num: Set(row.val_num),
				val_bool: Set(row.val_bool),
				val_json: Set(row.val_json),
			};
			active.insert(db).await?;
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn null_projects_one_all_none_row() {
		let rows = project_kv("k", &Value::Null);
		assert_eq!(rows.len(), 1);
		assert!(rows[0].val_str.is_none() && rows[0].val_num.is_none() && rows[0].val_bool.is_none() && rows[0].val_json.is_none());
	}

	#[test]
	fn scalar_projects_single_typed_row() {
		let rows = project_kv("k", &json!("hello"));
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].val_str.as_deref(), Some("hello"));
		assert_eq!(rows[0].ordinal, 0);
	}

	#[test]
	fn scalar_list_projects_one_row_per_element_typed() {
		let rows = project_kv("k", &json!([1, 2, 3]));
		assert_eq!(rows.len(), 3);
		for (i, row) in rows.iter().enumerate() {
			assert_eq!(row.ordinal, i as i32);
			assert_eq!(row.val_num, Some(i as f64 + 1.0));
		}
	}

	#[test]
	fn mixed_list_projects_all_elements_as_json() {
		let rows = project_kv("k", &json!([1, {"a": 1}, "x"]));
		assert_eq!(rows.len(), 3);
		for row in &rows {
			assert!(row.val_str.is_none() && row.val_num.is_none() && row.val_bool.is_none());
			assert!(row.val_json.is_some());
		}
	}

	#[test]
	fn object_projects_single_json_row() {
		let rows = project_kv("k", &json!({"a": 1}));
		assert_eq!(rows.len(), 1);
		assert!(rows[0].val_json.is_some());
	}
}

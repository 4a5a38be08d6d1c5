//! AssetInfoMeta entity — the EAV projection of `AssetInfo.user_metadata`.
//!
//! Exactly one of `val_str`/`val_num`/`val_bool`/`val_json` is non-null,
//! unless the logical value was JSON `null`, in which case all four are
//! null for that row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset_info_meta")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub asset_info_id: Uuid,
    pub key: String,
    pub ordinal: i32,
    pub val_str: Option<String>,
    pub val_num: Option<f64>,
    pub val_bool: Option<bool>,
    pub val_json: Option<Json>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::asset_info::Entity",
        from = "Column::AssetInfoId",
        to = "super::asset_info::Column::Id"
    )]
    AssetInfo,
}

impl Related<super::asset_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssetInfo.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// `true` if this row is a projection of a literal JSON `null`.
    pub fn is_null(&self) -> bool {
        self.val_str.is_none() && self.val_num.is_none() && self.val_bool.is_none() && self.val_json.is_none()
    }
}

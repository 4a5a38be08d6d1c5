//! AssetInfo entity — a named, tagged handle on an Asset within an owner scope.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset_infos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub asset_id: Uuid,
    /// `""` denotes a public row visible to every caller.
    pub owner_id: String,
    pub name: String,
    pub preview_id: Option<Uuid>,
    /// Empty object when unset, never `null` at rest.
    pub user_metadata: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub last_access_time: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::asset::Entity",
        from = "Column::AssetId",
        to = "super::asset::Column::Id"
    )]
    Asset,
    #[sea_orm(has_many = "super::asset_info_tag::Entity")]
    Tags,
    #[sea_orm(has_many = "super::asset_info_meta::Entity")]
    Meta,
}

impl Related<super::asset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Asset.def()
    }
}

impl Related<super::asset_info_tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tags.def()
    }
}

impl Related<super::asset_info_meta::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Meta.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn is_public(&self) -> bool {
        self.owner_id.is_empty()
    }

    /// Owner-visibility predicate: can `caller_owner_id` see this row.
    pub fn visible_to(&self, caller_owner_id: &str) -> bool {
        self.is_public() || self.owner_id == caller_owner_id
    }

    /// Owner-visibility predicate for writes: row must be public or owned by caller.
    pub fn writable_by(&self, caller_owner_id: &str) -> bool {
        self.visible_to(caller_owner_id)
    }
}

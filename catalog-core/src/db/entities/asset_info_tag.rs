//! AssetInfoTag entity — many-to-many link between AssetInfo and Tag, with provenance.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "asset_info_tags")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub asset_info_id: Uuid,
    #[sea_orm(primary_key, auto_increment = false)]
    pub tag_name: String,
    pub origin: TagOrigin,
    pub added_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum TagOrigin {
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "automatic")]
    Automatic,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::asset_info::Entity",
        from = "Column::AssetInfoId",
        to = "super::asset_info::Column::Id"
    )]
    AssetInfo,
    #[sea_orm(
        belongs_to = "super::tag::Entity",
        from = "Column::TagName",
        to = "super::tag::Column::Name"
    )]
    Tag,
}

impl Related<super::asset_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssetInfo.def()
    }
}

impl Related<super::tag::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tag.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

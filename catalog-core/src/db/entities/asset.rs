//! Asset entity — a content blob identified by hash.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "assets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// `None` marks a seed asset created by the scanner, awaiting hashing.
    #[sea_orm(unique)]
    pub hash: Option<String>,
    /// 0 means "unknown".
    pub size_bytes: i64,
    pub mime_type: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::asset_cache_state::Entity")]
    CacheStates,
    #[sea_orm(has_many = "super::asset_info::Entity")]
    Infos,
}

impl Related<super::asset_cache_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CacheStates.def()
    }
}

impl Related<super::asset_info::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Infos.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A seed asset has no content hash yet; it was created by the scanner
    /// ahead of content identification.
    pub fn is_seed(&self) -> bool {
        self.hash.is_none()
    }
}

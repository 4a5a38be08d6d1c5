//! SeaORM entity models for the catalog schema.

pub mod asset;
pub mod asset_cache_state;
pub mod asset_info;
pub mod asset_info_meta;
pub mod asset_info_tag;
pub mod tag;

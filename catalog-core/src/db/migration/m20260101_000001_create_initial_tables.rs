//! Initial migration: Asset, AssetCacheState, AssetInfo, AssetInfoTag, Tag, AssetInfoMeta.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Assets::Table)
					.if_not_exists()
					.col(ColumnDef::new(Assets::Id).uuid().not_null().primary_key())
					.col(ColumnDef::new(Assets::Hash).string().unique_key())
					.col(
						ColumnDef::new(Assets::SizeBytes)
							.big_integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(Assets::MimeType).string())
					.col(
						ColumnDef::new(Assets::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(AssetCacheStates::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(AssetCacheStates::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(AssetCacheStates::AssetId).uuid().not_null())
					.col(
						ColumnDef::new(AssetCacheStates::FilePath)
							.string()
							.not_null()
							.unique_key(),
					)
					.col(
						ColumnDef::new(AssetCacheStates::MtimeNs)
							.big_integer()
							.not_null(),
					)
					.col(
						ColumnDef::new(AssetCacheStates::NeedsVerify)
							.boolean()
							.not_null()
							.default(false),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk_cache_state_asset")
							.from(AssetCacheStates::Table, AssetCacheStates::AssetId)
							.to(Assets::Table, Assets::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_cache_states_asset_id")
					.table(AssetCacheStates::Table)
					.col(AssetCacheStates::AssetId)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Tags::Table)
					.if_not_exists()
					.col(ColumnDef::new(Tags::Name).string().not_null().primary_key())
					.col(ColumnDef::new(Tags::TagType).string().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(AssetInfos::Table)
					.if_not_exists()
					.col(ColumnDef::new(AssetInfos::Id).uuid().not_null().primary_key())
					.col(ColumnDef::new(AssetInfos::AssetId).uuid().not_null())
					.col(
						ColumnDef::new(AssetInfos::OwnerId)
							.string()
							.not_null()
							.default(""),
					)
					.col(ColumnDef::new(AssetInfos::Name).string().not_null())
					.col(ColumnDef::new(AssetInfos::PreviewId).uuid())
					.col(
						ColumnDef::new(AssetInfos::UserMetadata)
							.json()
							.not_null(),
					)
					.col(
						ColumnDef::new(AssetInfos::CreatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(AssetInfos::UpdatedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.col(
						ColumnDef::new(AssetInfos::LastAccessTime)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk_asset_info_asset")
							.from(AssetInfos::Table, AssetInfos::AssetId)
							.to(Assets::Table, Assets::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk_asset_info_preview")
							.from(AssetInfos::Table, AssetInfos::PreviewId)
							.to(Assets::Table, Assets::Id)
							.on_delete(ForeignKeyAction::SetNull),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_asset_info_asset_owner_name")
					.table(AssetInfos::Table)
					.col(AssetInfos::AssetId)
					.col(AssetInfos::OwnerId)
					.col(AssetInfos::Name)
					.unique()
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_asset_info_owner")
					.table(AssetInfos::Table)
					.col(AssetInfos::OwnerId)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(AssetInfoTags::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(AssetInfoTags::AssetInfoId)
							.uuid()
							.not_null(),
					)
					.col(ColumnDef::new(AssetInfoTags::TagName).string().not_null())
					.col(ColumnDef::new(AssetInfoTags::Origin).string().not_null())
					.col(
						ColumnDef::new(AssetInfoTags::AddedAt)
							.timestamp_with_time_zone()
							.not_null(),
					)
					.primary_key(
						Index::create()
							.col(AssetInfoTags::AssetInfoId)
							.col(AssetInfoTags::TagName),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk_asset_info_tag_info")
							.from(AssetInfoTags::Table, AssetInfoTags::AssetInfoId)
							.to(AssetInfos::Table, AssetInfos::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk_asset_info_tag_tag")
							.from(AssetInfoTags::Table, AssetInfoTags::TagName)
							.to(Tags::Table, Tags::Name)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_asset_info_tags_tag_name")
					.table(AssetInfoTags::Table)
					.col(AssetInfoTags::TagName)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_asset_info_tags_added_at")
					.table(AssetInfoTags::Table)
					.col(AssetInfoTags::AssetInfoId)
					.col(AssetInfoTags::AddedAt)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(AssetInfoMeta::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(AssetInfoMeta::Id)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(
						ColumnDef::new(AssetInfoMeta::AssetInfoId)
							.uuid()
							.not_null(),
					)
					.col(ColumnDef::new(AssetInfoMeta::Key).string().not_null())
					.col(
						ColumnDef::new(AssetInfoMeta::Ordinal)
							.integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(AssetInfoMeta::ValStr).string())
					.col(ColumnDef::new(AssetInfoMeta::ValNum).double())
					.col(ColumnDef::new(AssetInfoMeta::ValBool).boolean())
					.col(ColumnDef::new(AssetInfoMeta::ValJson).json())
					.foreign_key(
						ForeignKey::create()
							.name("fk_asset_info_meta_info")
							.from(AssetInfoMeta::Table, AssetInfoMeta::AssetInfoId)
							.to(AssetInfos::Table, AssetInfos::Id)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_asset_info_meta_info_key_ordinal")
					.table(AssetInfoMeta::Table)
					.col(AssetInfoMeta::AssetInfoId)
					.col(AssetInfoMeta::Key)
					.col(AssetInfoMeta::Ordinal)
					.unique()
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(AssetInfoMeta::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(AssetInfoTags::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(AssetInfos::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Tags::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(AssetCacheStates::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Assets::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(DeriveIden)]
enum Assets {
	Table,
	Id,
	Hash,
	SizeBytes,
	MimeType,
	CreatedAt,
}

#[derive(DeriveIden)]
enum AssetCacheStates {
	Table,
	Id,
	AssetId,
	FilePath,
	MtimeNs,
	NeedsVerify,
}

#[derive(DeriveIden)]
enum AssetInfos {
	Table,
	Id,
	AssetId,
	OwnerId,
	Name,
	PreviewId,
	UserMetadata,
	CreatedAt,
	UpdatedAt,
	LastAccessTime,
}

#[derive(DeriveIden)]
enum AssetInfoTags {
	Table,
	AssetInfoId,
	TagName,
	Origin,
	AddedAt,
}

#[derive(DeriveIden)]
enum Tags {
	Table,
	Name,
	TagType,
}

#[derive(DeriveIden)]
enum AssetInfoMeta {
	Table,
	Id,
	AssetInfoId,
	Key,
	Ordinal,
	ValStr,
	ValNum,
	ValBool,
	ValJson,
}

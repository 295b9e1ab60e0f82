//! Creates the index's four tables and four indexes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Metadata::Table)
					.if_not_exists()
					.col(ColumnDef::new(Metadata::Name).string().not_null().primary_key())
					.col(ColumnDef::new(Metadata::Value).string().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(CloudConfigs::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(CloudConfigs::ConfigId)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(CloudConfigs::Name).string().not_null().unique_key())
					.col(ColumnDef::new(CloudConfigs::Type).string().not_null())
					.col(ColumnDef::new(CloudConfigs::ConfigData).text().not_null())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Files::Table)
					.if_not_exists()
					.col(
						ColumnDef::new(Files::GlobalId)
							.integer()
							.not_null()
							.auto_increment()
							.primary_key(),
					)
					.col(ColumnDef::new(Files::Type).string().not_null())
					.col(ColumnDef::new(Files::Path).string().not_null())
					.col(ColumnDef::new(Files::Size).big_integer().not_null())
					.col(ColumnDef::new(Files::LocalHash).big_integer())
					.col(ColumnDef::new(Files::LocalModifiedTime).big_integer().not_null())
					.col(ColumnDef::new(Files::FileId).big_integer())
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(FileLinks::Table)
					.if_not_exists()
					.col(ColumnDef::new(FileLinks::GlobalId).integer().not_null())
					.col(ColumnDef::new(FileLinks::CloudId).integer().not_null())
					.col(ColumnDef::new(FileLinks::CloudFileId).string())
					.col(ColumnDef::new(FileLinks::CloudParentId).string())
					.col(ColumnDef::new(FileLinks::CloudFileModifiedTime).big_integer())
					.col(ColumnDef::new(FileLinks::CloudHashCheckSum).string())
					.col(ColumnDef::new(FileLinks::CloudSize).big_integer())
					.primary_key(
						Index::create()
							.col(FileLinks::GlobalId)
							.col(FileLinks::CloudId),
					)
					.foreign_key(
						ForeignKey::create()
							.from(FileLinks::Table, FileLinks::GlobalId)
							.to(Files::Table, Files::GlobalId)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.from(FileLinks::Table, FileLinks::CloudId)
							.to(CloudConfigs::Table, CloudConfigs::ConfigId)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name("idx_files_path")
					.table(Files::Table)
					.col(Files::Path)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_files_file_id")
					.table(Files::Table)
					.col(Files::FileId)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_file_links_cloud_file_id")
					.table(FileLinks::Table)
					.col(FileLinks::CloudFileId)
					.col(FileLinks::CloudId)
					.to_owned(),
			)
			.await?;
		manager
			.create_index(
				Index::create()
					.name("idx_file_links_global_cloud")
					.table(FileLinks::Table)
					.col(FileLinks::GlobalId)
					.col(FileLinks::CloudId)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(FileLinks::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Files::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(CloudConfigs::Table).to_owned())
			.await?;
		manager
			.drop_table(Table::drop().table(Metadata::Table).to_owned())
			.await?;
		Ok(())
	}
}

#[derive(Iden)]
enum Metadata {
	Table,
	Name,
	Value,
}

#[derive(Iden)]
enum CloudConfigs {
	Table,
	ConfigId,
	Name,
	Type,
	ConfigData,
}

#[derive(Iden)]
enum Files {
	Table,
	GlobalId,
	Type,
	Path,
	Size,
	LocalHash,
	LocalModifiedTime,
	FileId,
}

#[derive(Iden)]
enum FileLinks {
	Table,
	GlobalId,
	CloudId,
	CloudFileId,
	CloudParentId,
	CloudFileModifiedTime,
	CloudHashCheckSum,
	CloudSize,
}

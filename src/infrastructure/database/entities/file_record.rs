//! `files` table: one row per logical file, spanning the local filesystem and every enrolled
//! cloud. `global_id` is the identity that ties a `FileRecord` to its `FileLink` rows.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "files")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub global_id: i32,
	#[sea_orm(column_name = "type")]
	pub kind: String,
	pub path: String,
	pub size: i64,
	pub local_hash: Option<i64>,
	pub local_modified_time: i64,
	pub file_id: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::file_link::Entity")]
	FileLinks,
}

impl Related<super::file_link::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::FileLinks.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}

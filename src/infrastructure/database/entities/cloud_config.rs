//! `cloud_configs` table: one row per enrolled cloud endpoint. `cloud_id = 0` is reserved for
//! the local filesystem and never has a row here.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "cloud_configs")]
pub struct Model {
	#[sea_orm(primary_key)]
	pub config_id: i32,
	#[sea_orm(unique)]
	pub name: String,
	#[sea_orm(column_name = "type")]
	pub kind: String,
	pub config_data: String,
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

//! `metadata` table: free-form key/value pairs (at minimum `initial_sync_done`).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "metadata")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false, column_name = "name")]
	pub name: String,
	pub value: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

pub const INITIAL_SYNC_DONE: &str = "initial_sync_done";

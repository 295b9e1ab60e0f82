//! `file_links` table: the per-cloud half of a logical file's identity. Composite primary key
//! `(global_id, cloud_id)`; cascades on deletion of either parent row.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "file_links")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = false)]
	pub global_id: i32,
	#[sea_orm(primary_key, auto_increment = false)]
	pub cloud_id: i32,
	pub cloud_file_id: Option<String>,
	pub cloud_parent_id: Option<String>,
	pub cloud_file_modified_time: Option<i64>,
	/// Either a provider-native hash string or a stringified 64-bit integer; see
	/// `shared::types::Hash` for the typed tagged-union this column round-trips through.
	pub cloud_hash_check_sum: Option<String>,
	pub cloud_size: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::file_record::Entity",
		from = "Column::GlobalId",
		to = "super::file_record::Column::GlobalId",
		on_delete = "Cascade"
	)]
	FileRecord,
	#[sea_orm(
		belongs_to = "super::cloud_config::Entity",
		from = "Column::CloudId",
		to = "super::cloud_config::Column::ConfigId",
		on_delete = "Cascade"
	)]
	CloudConfig,
}

impl Related<super::file_record::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::FileRecord.def()
	}
}

impl Related<super::cloud_config::Entity> for Entity {
	fn to() -> RelationDef {
		Relation::CloudConfig.def()
	}
}

impl ActiveModelBehavior for ActiveModel {}

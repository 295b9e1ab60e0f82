//! The typed, high-level API (C1) that the rest of the engine actually calls. Wraps [`Database`]
//! and the raw sea-orm entities; every write is one transaction. Method surface is grounded on
//! `examples/original_source/include/database.h`.

use super::entities::{cloud_config, file_link, file_record, metadata};
use super::Database;
use crate::error::{Error, Result};
use crate::shared::types::Hash;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use std::path::{Path, PathBuf};

pub struct Index {
	db: Database,
}

impl Index {
	pub fn new(db: Database) -> Self {
		Self { db }
	}

	pub fn conn(&self) -> &sea_orm::DatabaseConnection {
		self.db.conn()
	}

	// --- cloud configs -----------------------------------------------------------------

	pub async fn add_cloud_config(&self, name: &str, kind: &str, config_data: &str) -> Result<i32> {
		let am = cloud_config::ActiveModel {
			config_id: sea_orm::NotSet,
			name: Set(name.to_string()),
			kind: Set(kind.to_string()),
			config_data: Set(config_data.to_string()),
		};
		let inserted = am.insert(self.conn()).await?;
		Ok(inserted.config_id)
	}

	pub async fn get_cloud_config(&self, cloud_id: i32) -> Result<Option<cloud_config::Model>> {
		Ok(cloud_config::Entity::find_by_id(cloud_id).one(self.conn()).await?)
	}

	pub async fn list_cloud_configs(&self) -> Result<Vec<cloud_config::Model>> {
		Ok(cloud_config::Entity::find().all(self.conn()).await?)
	}

	pub async fn update_cloud_config_data(&self, cloud_id: i32, config_data: &str) -> Result<()> {
		let Some(model) = self.get_cloud_config(cloud_id).await? else {
			return Err(Error::Configuration(format!("unknown cloud_id {cloud_id}")));
		};
		let mut am: cloud_config::ActiveModel = model.into();
		am.config_data = Set(config_data.to_string());
		am.update(self.conn()).await?;
		Ok(())
	}

	// --- file records --------------------------------------------------------------------

	pub async fn insert_file_record(
		&self,
		kind: &str,
		rel_path: &str,
		size: i64,
		local_hash: Option<i64>,
		local_modified_time: i64,
		file_id: Option<i64>,
	) -> Result<i32> {
		let am = file_record::ActiveModel {
			global_id: sea_orm::NotSet,
			kind: Set(kind.to_string()),
			path: Set(rel_path.to_string()),
			size: Set(size),
			local_hash: Set(local_hash),
			local_modified_time: Set(local_modified_time),
			file_id: Set(file_id),
		};
		let inserted = am.insert(self.conn()).await?;
		Ok(inserted.global_id)
	}

	pub async fn file_by_global_id(&self, global_id: i32) -> Result<Option<file_record::Model>> {
		Ok(file_record::Entity::find_by_id(global_id).one(self.conn()).await?)
	}

	pub async fn file_by_file_id(&self, file_id: i64) -> Result<Option<file_record::Model>> {
		Ok(file_record::Entity::find()
			.filter(file_record::Column::FileId.eq(file_id))
			.one(self.conn())
			.await?)
	}

	pub async fn file_by_path(&self, rel_path: &str) -> Result<Option<file_record::Model>> {
		Ok(file_record::Entity::find()
			.filter(file_record::Column::Path.eq(rel_path))
			.one(self.conn())
			.await?)
	}

	pub async fn update_file_content(&self, global_id: i32, size: i64, local_hash: i64, local_modified_time: i64) -> Result<()> {
		let Some(model) = self.file_by_global_id(global_id).await? else {
			return Err(Error::Index(sea_orm::DbErr::RecordNotFound(format!("file {global_id}"))));
		};
		let mut am: file_record::ActiveModel = model.into();
		am.size = Set(size);
		am.local_hash = Set(Some(local_hash));
		am.local_modified_time = Set(local_modified_time);
		am.update(self.conn()).await?;
		Ok(())
	}

	pub async fn update_file_path(&self, global_id: i32, new_rel_path: &str) -> Result<()> {
		let Some(model) = self.file_by_global_id(global_id).await? else {
			return Err(Error::Index(sea_orm::DbErr::RecordNotFound(format!("file {global_id}"))));
		};
		let mut am: file_record::ActiveModel = model.into();
		am.path = Set(new_rel_path.to_string());
		am.update(self.conn()).await?;
		Ok(())
	}

	/// Rewrites every descendant record's `rel_path` after a directory move, in one transaction.
	pub async fn rewrite_descendant_paths(&self, old_prefix: &str, new_prefix: &str) -> Result<u64> {
		let txn = self.conn().begin().await?;
		let prefix_with_slash = format!("{old_prefix}/");
		let descendants = file_record::Entity::find()
			.filter(file_record::Column::Path.starts_with(&prefix_with_slash))
			.all(&txn)
			.await?;
		let count = descendants.len() as u64;
		for model in descendants {
			let suffix = model.path.strip_prefix(&prefix_with_slash).unwrap_or(&model.path).to_string();
			let mut am: file_record::ActiveModel = model.into();
			am.path = Set(format!("{new_prefix}/{suffix}"));
			am.update(&txn).await?;
		}
		txn.commit().await?;
		Ok(count)
	}

	pub async fn delete_file_cascade(&self, global_id: i32) -> Result<()> {
		// `file_links` cascades via ON DELETE CASCADE once `PRAGMA foreign_keys = ON`
		// (set at connection time) — no manual link deletion needed here.
		file_record::Entity::delete_by_id(global_id).exec(self.conn()).await?;
		Ok(())
	}

	// --- file links -----------------------------------------------------------------------

	#[allow(clippy::too_many_arguments)]
	pub async fn upsert_file_link(
		&self,
		global_id: i32,
		cloud_id: i32,
		cloud_file_id: Option<&str>,
		cloud_parent_id: Option<&str>,
		hash: Option<&Hash>,
		size: Option<i64>,
		cloud_file_modified_time: Option<i64>,
	) -> Result<()> {
		let existing = self.link_by_global_and_cloud(global_id, cloud_id).await?;
		let am = file_link::ActiveModel {
			global_id: Set(global_id),
			cloud_id: Set(cloud_id),
			cloud_file_id: Set(cloud_file_id.map(str::to_string)),
			cloud_parent_id: Set(cloud_parent_id.map(str::to_string)),
			cloud_file_modified_time: Set(cloud_file_modified_time),
			cloud_hash_check_sum: Set(hash.map(Hash::to_column)),
			cloud_size: Set(size),
		};
		if existing.is_some() {
			file_link::Entity::update(am).exec(self.conn()).await?;
		} else {
			file_link::Entity::insert(am).exec(self.conn()).await?;
		}
		Ok(())
	}

	pub async fn link_by_global_and_cloud(&self, global_id: i32, cloud_id: i32) -> Result<Option<file_link::Model>> {
		Ok(file_link::Entity::find()
			.filter(file_link::Column::GlobalId.eq(global_id))
			.filter(file_link::Column::CloudId.eq(cloud_id))
			.one(self.conn())
			.await?)
	}

	pub async fn link_by_cloud_file_id(&self, cloud_id: i32, cloud_file_id: &str) -> Result<Option<file_link::Model>> {
		Ok(file_link::Entity::find()
			.filter(file_link::Column::CloudId.eq(cloud_id))
			.filter(file_link::Column::CloudFileId.eq(cloud_file_id))
			.one(self.conn())
			.await?)
	}

	pub async fn cloud_file_id_for_path(&self, rel_path: &str, cloud_id: i32) -> Result<Option<String>> {
		let Some(file) = self.file_by_path(rel_path).await? else {
			return Ok(None);
		};
		Ok(self
			.link_by_global_and_cloud(file.global_id, cloud_id)
			.await?
			.and_then(|l| l.cloud_file_id))
	}

	// --- metadata -------------------------------------------------------------------------

	pub async fn is_initial_sync_done(&self) -> Result<bool> {
		Ok(metadata::Entity::find_by_id(metadata::INITIAL_SYNC_DONE.to_string())
			.one(self.conn())
			.await?
			.map(|m| m.value == "true")
			.unwrap_or(false))
	}

	pub async fn mark_initial_sync_done(&self) -> Result<()> {
		let existing = metadata::Entity::find_by_id(metadata::INITIAL_SYNC_DONE.to_string())
			.one(self.conn())
			.await?;
		let am = metadata::ActiveModel {
			name: Set(metadata::INITIAL_SYNC_DONE.to_string()),
			value: Set("true".to_string()),
		};
		if existing.is_some() {
			metadata::Entity::update(am).exec(self.conn()).await?;
		} else {
			metadata::Entity::insert(am).exec(self.conn()).await?;
		}
		Ok(())
	}

	/// Longest suffix of `path` that has no matching Directory FileRecord, walked from the
	/// root downward, used to drive `createPath` on a target cloud.
	/// Returns `None` if every ancestor directory already exists.
	pub async fn missing_path_part(&self, path: &Path) -> Result<Option<PathBuf>> {
		let mut components: Vec<String> = path
			.iter()
			.map(|c| c.to_string_lossy().into_owned())
			.collect();
		if components.is_empty() {
			return Ok(None);
		}
		// Only directory ancestors matter; drop the leaf file name itself.
		components.pop();
		if components.is_empty() {
			return Ok(None);
		}

		let mut deepest_existing = 0usize;
		let mut accumulated = String::new();
		for (i, component) in components.iter().enumerate() {
			if i > 0 {
				accumulated.push('/');
			}
			accumulated.push_str(component);
			let exists = file_record::Entity::find()
				.filter(file_record::Column::Path.eq(accumulated.as_str()))
				.filter(file_record::Column::Kind.eq("Directory"))
				.one(self.conn())
				.await?
				.is_some();
			if exists {
				deepest_existing = i + 1;
			}
		}

		if deepest_existing == components.len() {
			return Ok(None);
		}
		Ok(Some(PathBuf::from(components[deepest_existing..].join("/"))))
	}
}

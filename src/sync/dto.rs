//! Data transfer objects carried by Commands between adapters, the index, and the callback
//! dispatcher. Grounded on `FileRecordDTO`/`FileUpdatedDTO`/`FileMovedDTO`/`FileDeletedDTO` from
//! the original implementation's `utils.h`; the five constructor overloads that file used per
//! call site become plain struct literals here, one per field, since Rust has no overloading.

use crate::shared::types::{EntryType, Hash};
use std::path::PathBuf;

/// Describes a newly-discovered or newly-created file, either side of the boundary.
/// `global_id` is `None` until the index has assigned one; `cloud_id = 0` means local.
#[derive(Debug, Clone)]
pub struct FileRecordDto {
	pub global_id: Option<i32>,
	pub cloud_id: i32,
	pub kind: EntryType,
	pub rel_path: String,
	pub size: u64,
	pub file_id: Option<u64>,
	pub cloud_file_id: Option<String>,
	pub cloud_parent_id: Option<String>,
	pub hash: Option<Hash>,
	pub modified_time: i64,
	/// Absolute on-disk path a cloud adapter reads the upload body from. `None` for a
	/// directory record or for a cloud-originated enumeration, which has nothing local to read.
	pub local_path: Option<PathBuf>,
}

impl FileRecordDto {
	/// Shape used by the local adapter for a brand-new on-disk file.
	pub fn local_new(kind: EntryType, rel_path: String, size: u64, modified_time: i64, hash: u64, file_id: u64) -> Self {
		Self {
			global_id: None,
			cloud_id: 0,
			kind,
			rel_path,
			size,
			file_id: Some(file_id),
			cloud_file_id: None,
			cloud_parent_id: None,
			hash: Some(Hash::Num(hash)),
			modified_time,
			local_path: None,
		}
	}

	/// Shape used by a cloud adapter's initial enumeration or delta-new classification.
	pub fn cloud_new(
		cloud_id: i32,
		kind: EntryType,
		rel_path: String,
		cloud_file_id: String,
		cloud_parent_id: String,
		size: u64,
		modified_time: i64,
		hash: Hash,
	) -> Self {
		Self {
			global_id: None,
			cloud_id,
			kind,
			rel_path,
			size,
			file_id: None,
			cloud_file_id: Some(cloud_file_id),
			cloud_parent_id: Some(cloud_parent_id),
			hash: Some(hash),
			modified_time,
			local_path: None,
		}
	}

	/// Attaches the absolute path an upload/update request should stream its body from.
	pub fn with_local_path(mut self, path: PathBuf) -> Self {
		self.local_path = Some(path);
		self
	}
}

/// Describes an in-place content change to an already-indexed file.
#[derive(Debug, Clone)]
pub struct FileUpdatedDto {
	pub global_id: i32,
	pub cloud_id: i32,
	pub kind: EntryType,
	pub rel_path: String,
	pub cloud_file_id: Option<String>,
	pub cloud_parent_id: Option<String>,
	pub size: u64,
	pub hash: Hash,
	pub modified_time: i64,
	/// Absolute on-disk path a cloud adapter reads the updated body from.
	pub local_path: Option<PathBuf>,
}

/// Describes a move and/or rename of an already-indexed file. A single entry that is both
/// moved and updated is represented as a Move Change with a dependent Update Change, not as
/// one combined DTO.
#[derive(Debug, Clone)]
pub struct FileMovedDto {
	pub global_id: i32,
	pub cloud_id: i32,
	pub kind: EntryType,
	pub old_rel_path: String,
	pub new_rel_path: String,
	pub cloud_file_id: Option<String>,
	pub old_cloud_parent_id: Option<String>,
	pub new_cloud_parent_id: Option<String>,
	pub modified_time: i64,
}

/// Describes the deletion of an already-indexed file.
#[derive(Debug, Clone)]
pub struct FileDeletedDto {
	pub global_id: i32,
	pub cloud_id: i32,
	pub rel_path: String,
	pub cloud_file_id: Option<String>,
	pub when: i64,
}

/// One raw entry from a provider's delta/changes feed, already shaped into the fields the
/// normalization pass classifies on. Deserializing the provider's actual response into this
/// shape is the only part specific to a given adapter; everything past this point treats a
/// Drive-style and a Dropbox-style entry identically.
#[derive(Debug, Clone)]
pub struct DeltaEntry {
	pub cloud_file_id: String,
	/// Empty for an entry parented directly at the sync root.
	pub cloud_parent_id: String,
	pub rel_path: String,
	pub kind: EntryType,
	pub size: u64,
	pub modified_time: i64,
	pub hash: Hash,
	/// The entry represents the file being moved to trash/deleted provider-side, not a live
	/// state to adopt.
	pub trashed: bool,
}

//! The local filesystem adapter (C8). Owns the recursive watcher, translates native filesystem
//! events into Changes via self-echo suppression and the factory, and executes the local side
//! of every command chain. Grounded on `examples/original_source/include/LocalStorage.h`.

pub mod hashing;
pub mod watcher;

use crate::infrastructure::database::Index;
use crate::infrastructure::events::{Event, EventBus};
use crate::shared::types::{ChangeType, EntryType, Hash};
use crate::shared::utils::{is_degenerate_rel_path, is_tmp_name, normalize_rel_path, staging_path_for};
use crate::sync::change::Change;
use crate::sync::cloud::{cloud_handle, CloudAdapter};
use crate::sync::dto::{FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
use crate::sync::expected_events::ExpectedEventsRegistry;
use crate::sync::factory::ChangeFactory;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use watcher::{FileEvent, LocalWatcher};

const MARKER_FILE: &str = ".synccore-writable-check";

pub struct LocalAdapter {
	root: PathBuf,
	index: Arc<Index>,
	events: Arc<EventBus>,
	expected: ExpectedEventsRegistry,
}

impl LocalAdapter {
	pub fn new(root: PathBuf, index: Arc<Index>, events: Arc<EventBus>) -> Self {
		Self { root, index, events, expected: ExpectedEventsRegistry::new() }
	}

	/// Preflight root check: the root must exist and be
	/// writable before the engine starts watching it, checked with a throwaway marker file
	/// rather than a permission-bits inspection, which is unreliable across filesystems and
	/// mount options (ACLs, read-only bind mounts).
	pub async fn preflight(&self) -> crate::error::Result<()> {
		if !self.root.is_dir() {
			return Err(crate::error::Error::Configuration(format!("sync root {} is not a directory", self.root.display())));
		}
		let marker = self.root.join(MARKER_FILE);
		tokio::fs::write(&marker, b"").await.map_err(|e| crate::error::Error::filesystem(&marker, e))?;
		tokio::fs::remove_file(&marker).await.map_err(|e| crate::error::Error::filesystem(&marker, e))?;
		Ok(())
	}

	/// One-time recursive scan feeding the initial reconciliation table.
	pub fn initial_files(&self) -> crate::error::Result<Vec<FileRecordDto>> {
		let mut out = Vec::new();
		self.scan_dir(&self.root.clone(), &mut out)?;
		Ok(out)
	}

	fn scan_dir(&self, dir: &Path, out: &mut Vec<FileRecordDto>) -> crate::error::Result<()> {
		let entries = std::fs::read_dir(dir).map_err(|e| crate::error::Error::filesystem(dir, e))?;
		for entry in entries {
			let entry = entry.map_err(|e| crate::error::Error::filesystem(dir, e))?;
			let path = entry.path();
			let name = entry.file_name();
			let name = name.to_string_lossy();
			if is_tmp_name(&name) {
				continue;
			}
			let Some(rel_path) = normalize_rel_path(&self.root, &path) else { continue };
			let file_type = entry.file_type().map_err(|e| crate::error::Error::filesystem(&path, e))?;
			if file_type.is_dir() {
				out.push(self.dir_record(&path, rel_path)?);
				self.scan_dir(&path, out)?;
			} else if file_type.is_file() {
				out.push(self.file_record(&path, rel_path)?);
			}
		}
		Ok(())
	}

	fn file_record(&self, path: &Path, rel_path: String) -> crate::error::Result<FileRecordDto> {
		let meta = std::fs::metadata(path).map_err(|e| crate::error::Error::filesystem(path, e))?;
		let modified_time = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);
		let hash = hashing::compute_file_hash(path)?;
		let file_id = hashing::file_id(path)?;
		let kind = if hashing::is_doc_extension(path) { EntryType::Document } else { EntryType::File };
		Ok(FileRecordDto::local_new(kind, rel_path, meta.len(), modified_time, hash, file_id).with_local_path(path.to_path_buf()))
	}

	fn dir_record(&self, path: &Path, rel_path: String) -> crate::error::Result<FileRecordDto> {
		let meta = std::fs::metadata(path).map_err(|e| crate::error::Error::filesystem(path, e))?;
		let modified_time = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);
		let file_id = hashing::file_id(path)?;
		Ok(FileRecordDto::local_new(EntryType::Directory, rel_path, 0, modified_time, 0, file_id))
	}

	pub fn start_watching(&self) -> crate::error::Result<(LocalWatcher, tokio::sync::mpsc::UnboundedReceiver<FileEvent>)> {
		LocalWatcher::spawn(&self.root)
	}

	/// Normalizes one native event into a Change chain, or `None` if it is filtered out
	/// (tmp file, degenerate path, matches an expected self-echo).
	pub async fn handle_event(&self, event: FileEvent, enrolled_cloud_ids: &[i32], clouds: &[Arc<dyn CloudAdapter>]) -> crate::error::Result<Option<(Arc<Change>, crate::sync::command::Command)>> {
		match event {
			FileEvent::Created(path) => self.handle_created(path, enrolled_cloud_ids, clouds).await,
			FileEvent::Modified(path) => self.handle_updated(path, enrolled_cloud_ids, clouds).await,
			FileEvent::Removed(path) => self.handle_deleted(path, enrolled_cloud_ids, clouds).await,
			FileEvent::Renamed { from, to } => self.handle_renamed(from, to, enrolled_cloud_ids, clouds).await,
		}
	}

	async fn handle_created(&self, path: PathBuf, enrolled: &[i32], clouds: &[Arc<dyn CloudAdapter>]) -> crate::error::Result<Option<(Arc<Change>, crate::sync::command::Command)>> {
		let Some(name) = path.file_name().and_then(|n| n.to_str()) else { return Ok(None) };
		if is_tmp_name(name) {
			return Ok(None);
		}
		let Some(rel_path) = normalize_rel_path(&self.root, &path) else { return Ok(None) };
		if is_degenerate_rel_path(&rel_path) {
			return Ok(None);
		}
		if self.expected.check_and_clear(&rel_path, ChangeType::New) {
			return Ok(None);
		}
		if !path.exists() {
			return Ok(None); // vanished between the event firing and us looking (atomic-save churn)
		}
		let dto = if path.is_dir() { self.dir_record(&path, rel_path.clone())? } else { self.file_record(&path, rel_path.clone())? };
		self.events.emit(Event::ChangeQueued { target_path: rel_path, change_type: ChangeType::New });
		let (change, head) = ChangeFactory::make_local_new(dto, enrolled, |cloud_id, dto| {
			cloud_handle(clouds, reqwest::Method::POST, cloud_id, dto, |a, h, d| a.setup_upload_handle(h, d))
		});
		Ok(Some((change, head)))
	}

	async fn handle_updated(&self, path: PathBuf, enrolled: &[i32], clouds: &[Arc<dyn CloudAdapter>]) -> crate::error::Result<Option<(Arc<Change>, crate::sync::command::Command)>> {
		let Some(name) = path.file_name().and_then(|n| n.to_str()) else { return Ok(None) };
		if is_tmp_name(name) || !path.is_file() {
			return Ok(None);
		}
		let Some(rel_path) = normalize_rel_path(&self.root, &path) else { return Ok(None) };
		if self.expected.check_and_clear(&rel_path, ChangeType::Update) {
			return Ok(None);
		}
		let Some(record) = self.index.file_by_path(&rel_path).await? else {
			return self.handle_created(path, enrolled, clouds).await;
		};
		let new_hash = hashing::compute_file_hash(&path)?;
		if record.local_hash == Some(new_hash as i64) {
			return Ok(None); // metadata-only touch, content unchanged
		}
		let meta = std::fs::metadata(&path).map_err(|e| crate::error::Error::filesystem(&path, e))?;
		let modified_time = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);
		let dto = FileUpdatedDto {
			global_id: record.global_id,
			cloud_id: 0,
			kind: EntryType::File,
			rel_path: rel_path.clone(),
			cloud_file_id: None,
			cloud_parent_id: None,
			size: meta.len(),
			hash: Hash::Num(new_hash),
			modified_time,
			local_path: Some(path.clone()),
		};
		self.events.emit(Event::ChangeQueued { target_path: rel_path, change_type: ChangeType::Update });
		let (change, head) = ChangeFactory::make_local_update(dto, enrolled, |cloud_id, dto| {
			cloud_handle(clouds, reqwest::Method::PATCH, cloud_id, dto, |a, h, d| a.setup_update_handle(h, d))
		});
		Ok(Some((change, head)))
	}

	/// A same-stem tmp neighbor (or the path itself re-existing by the time we look) means this
	/// Removed event is the mid-flight half of an editor's atomic save — the file isn't actually
	/// gone, it's about to be replaced by a rename-over-original that will surface as a single
	/// Update instead (step 4). Surfacing a real Delete here would cascade the
	/// FileRecord out from under that rename.
	async fn handle_deleted(&self, path: PathBuf, enrolled: &[i32], clouds: &[Arc<dyn CloudAdapter>]) -> crate::error::Result<Option<(Arc<Change>, crate::sync::command::Command)>> {
		let Some(name) = path.file_name().and_then(|n| n.to_str()) else { return Ok(None) };
		if is_tmp_name(name) {
			return Ok(None);
		}
		let Some(rel_path) = normalize_rel_path(&self.root, &path) else { return Ok(None) };
		if self.expected.check_and_clear(&rel_path, ChangeType::Delete) {
			return Ok(None);
		}
		let Some(record) = self.index.file_by_path(&rel_path).await? else {
			return Ok(None); // delete of something never indexed (e.g. a filtered tmp file)
		};
		if path.exists() || staging_path_for(&path).exists() {
			return Ok(None); // atomic-save in progress, not a real delete
		}
		let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0);
		let dto = FileDeletedDto { global_id: record.global_id, cloud_id: 0, rel_path: rel_path.clone(), cloud_file_id: None, when: now };
		self.events.emit(Event::ChangeQueued { target_path: rel_path, change_type: ChangeType::Delete });
		let (change, head) = ChangeFactory::make_delete(dto, 0, enrolled, |cloud_id, dto| {
			cloud_handle(clouds, reqwest::Method::DELETE, cloud_id, dto, |a, h, d| a.setup_delete_handle(h, d))
		});
		Ok(Some((change, head)))
	}

	async fn handle_renamed(&self, from: PathBuf, to: PathBuf, enrolled: &[i32], clouds: &[Arc<dyn CloudAdapter>]) -> crate::error::Result<Option<(Arc<Change>, crate::sync::command::Command)>> {
		let Some(old_name) = from.file_name().and_then(|n| n.to_str()) else { return Ok(None) };
		if is_tmp_name(old_name) {
			// the tmp-neighbor half of an atomic save landing over its original: its own
			// Removed event was already suppressed, so this rename is the save's only visible
			// effect and must surface as the file's single Update, not a fresh create.
			return self.handle_updated(to, enrolled, clouds).await;
		}
		let Some(old_rel) = normalize_rel_path(&self.root, &from) else { return Ok(None) };
		let Some(new_name) = to.file_name().and_then(|n| n.to_str()) else { return Ok(None) };
		if is_tmp_name(new_name) {
			// renamed *into* a tmp name: treat as the file vanishing, matching an editor's
			// save-to-swap-then-delete-original pattern.
			return self.handle_deleted(from, enrolled, clouds).await;
		}
		let Some(new_rel) = normalize_rel_path(&self.root, &to) else { return Ok(None) };
		if self.expected.check_and_clear(&old_rel, ChangeType::Move) {
			return Ok(None);
		}
		let Some(record) = self.index.file_by_path(&old_rel).await? else {
			// unknown file id: treat the destination as a fresh creation (step 8).
			return self.handle_created(to, enrolled, clouds).await;
		};
		let meta = std::fs::metadata(&to).map_err(|e| crate::error::Error::filesystem(&to, e))?;
		let modified_time = meta.modified().ok().and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok()).map(|d| d.as_secs() as i64).unwrap_or(0);
		let dto = FileMovedDto {
			global_id: record.global_id,
			cloud_id: 0,
			kind: EntryType::File,
			old_rel_path: old_rel,
			new_rel_path: new_rel.clone(),
			cloud_file_id: None,
			old_cloud_parent_id: None,
			new_cloud_parent_id: None,
			modified_time,
		};
		self.events.emit(Event::ChangeQueued { target_path: new_rel, change_type: ChangeType::Move });
		let (change, head) = ChangeFactory::make_local_move(dto, enrolled, |cloud_id, dto| {
			cloud_handle(clouds, reqwest::Method::PATCH, cloud_id, dto, |a, h, d| a.setup_move_handle(h, d))
		});
		Ok(Some((change, head)))
	}

	/// Registers a mutation this adapter is about to perform on its own behalf (e.g. applying
	/// a cloud-originated download), so the resulting native event is swallowed instead of
	/// re-detected as a new local Change.
	pub fn expect(&self, rel_path: &str, change_type: ChangeType) {
		self.expected.add(rel_path, change_type);
	}

	/// Creates the missing ancestor directories of `path`, matching `LocalStorage::createPath`.
	pub async fn create_path(&self, missing: &Path) -> crate::error::Result<()> {
		let absolute = self.root.join(missing);
		tokio::fs::create_dir_all(&absolute).await.map_err(|e| crate::error::Error::filesystem(&absolute, e))
	}

	pub fn absolute_path(&self, rel_path: &str) -> PathBuf {
		self.root.join(rel_path)
	}
}

//! The Command sum type (C5): the unit of work dispatched either to the HTTP multiplexer
//! (cloud variants) or to the local filesystem executor (local variants). Grounded on
//! `examples/original_source/include/command.h`'s ten concrete subclasses of `ICommand`,
//! collapsed here into one enum since Rust prefers a closed sum type over a class hierarchy
//! for a fixed, known set of variants.

use crate::error::{Error, Result};
use crate::infrastructure::database::Index;
use crate::infrastructure::http::{HttpExecutable, RequestHandle};
use crate::sync::change::ChangeRef;
use crate::sync::cloud::CloudAdapter;
use crate::sync::dto::{FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
use std::sync::Arc;

/// Per-variant payload. Cloud variants carry a `RequestHandle`; local variants act directly
/// on the filesystem when executed and carry no handle.
pub enum Command {
	LocalUpload(Box<LocalUploadCmd>),
	LocalUpdate(Box<LocalUpdateCmd>),
	LocalMove(Box<LocalMoveCmd>),
	LocalDelete(Box<LocalDeleteCmd>),
	CloudUpload(Box<CloudUploadCmd>),
	CloudUpdate(Box<CloudUpdateCmd>),
	CloudMove(Box<CloudMoveCmd>),
	CloudDelete(Box<CloudDeleteCmd>),
	CloudDownloadNew(Box<CloudDownloadCmd>),
	CloudDownloadUpdate(Box<CloudDownloadCmd>),
}

pub struct LocalUploadCmd {
	pub dto: FileRecordDto,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}
pub struct LocalUpdateCmd {
	pub dto: FileUpdatedDto,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}
pub struct LocalMoveCmd {
	pub dto: FileMovedDto,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}
pub struct LocalDeleteCmd {
	pub dto: FileDeletedDto,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}

pub struct CloudUploadCmd {
	pub dto: FileRecordDto,
	pub cloud_id: i32,
	pub handle: RequestHandle,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}
pub struct CloudUpdateCmd {
	pub dto: FileUpdatedDto,
	pub cloud_id: i32,
	pub handle: RequestHandle,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}
pub struct CloudMoveCmd {
	pub dto: FileMovedDto,
	pub cloud_id: i32,
	pub handle: RequestHandle,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}
pub struct CloudDeleteCmd {
	pub dto: FileDeletedDto,
	pub cloud_id: i32,
	pub handle: RequestHandle,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}
/// Covers both `CloudDownloadNew` and `CloudDownloadUpdate` (original's two near-identical
/// subclasses differed only in whether a `FileRecord` row already existed); the distinction is
/// carried by which `Command` variant wraps this struct rather than a field.
pub struct CloudDownloadCmd {
	pub dto: FileRecordDto,
	pub cloud_id: i32,
	pub handle: RequestHandle,
	pub staging_path: std::path::PathBuf,
	pub final_path: std::path::PathBuf,
	pub change: ChangeRef,
	pub next: Option<Box<Command>>,
}

/// What the callback dispatcher should do once this command's side effect has been applied.
pub enum Completion {
	/// The command's mutation was applied. `next_links` (0 or 1 command, but a `Vec` keeps the
	/// dispatcher uniform) should be dispatched next; `change_done` is set iff this was the
	/// chain's last link.
	Done {
		next_links: Vec<Command>,
		change_done: Option<ChangeDoneInfo>,
	},
	/// `needRepeat`: the command must be re-submitted unchanged (e.g. a cloud quota/lock
	/// response that isn't a plain retryable HTTP status but still means "try again later").
	Repeat,
}

pub struct ChangeDoneInfo {
	pub global_id: i32,
	pub change_type: crate::shared::types::ChangeType,
}

impl Command {
	pub fn is_cloud(&self) -> bool {
		matches!(
			self,
			Command::CloudUpload(_)
				| Command::CloudUpdate(_)
				| Command::CloudMove(_)
				| Command::CloudDelete(_)
				| Command::CloudDownloadNew(_)
				| Command::CloudDownloadUpdate(_)
		)
	}

	pub fn target(&self) -> &str {
		match self {
			Command::LocalUpload(c) => &c.dto.rel_path,
			Command::LocalUpdate(c) => &c.dto.rel_path,
			Command::LocalMove(c) => &c.dto.new_rel_path,
			Command::LocalDelete(c) => &c.dto.rel_path,
			Command::CloudUpload(c) => &c.dto.rel_path,
			Command::CloudUpdate(c) => &c.dto.rel_path,
			Command::CloudMove(c) => &c.dto.new_rel_path,
			Command::CloudDelete(c) => &c.dto.rel_path,
			Command::CloudDownloadNew(c) => &c.dto.rel_path,
			Command::CloudDownloadUpdate(c) => &c.dto.rel_path,
		}
	}

	fn change_ref(&self) -> &ChangeRef {
		match self {
			Command::LocalUpload(c) => &c.change,
			Command::LocalUpdate(c) => &c.change,
			Command::LocalMove(c) => &c.change,
			Command::LocalDelete(c) => &c.change,
			Command::CloudUpload(c) => &c.change,
			Command::CloudUpdate(c) => &c.change,
			Command::CloudMove(c) => &c.change,
			Command::CloudDelete(c) => &c.change,
			Command::CloudDownloadNew(c) => &c.change,
			Command::CloudDownloadUpdate(c) => &c.change,
		}
	}

	fn take_next(&mut self) -> Option<Box<Command>> {
		match self {
			Command::LocalUpload(c) => c.next.take(),
			Command::LocalUpdate(c) => c.next.take(),
			Command::LocalMove(c) => c.next.take(),
			Command::LocalDelete(c) => c.next.take(),
			Command::CloudUpload(c) => c.next.take(),
			Command::CloudUpdate(c) => c.next.take(),
			Command::CloudMove(c) => c.next.take(),
			Command::CloudDelete(c) => c.next.take(),
			Command::CloudDownloadNew(c) => c.next.take(),
			Command::CloudDownloadUpdate(c) => c.next.take(),
		}
	}

	/// Applies this command's index mutation, then reports whether the owning Change is done
	/// and what (if anything) should be dispatched next. This is the Rust shape of the
	/// original's `completionCallback(response)` virtual method. `clouds` is consulted only by
	/// Cloud* variants carrying a response, to parse the provider-assigned id(s) via the
	/// matching `CloudAdapter::process_*_response` before the DTO is persisted.
	pub async fn completion_callback(&mut self, index: &Arc<Index>, response: Option<&[u8]>, clouds: &[Arc<dyn CloudAdapter>]) -> Result<Completion> {
		self.apply(index, response, clouds).await?;

		let next = self.take_next();
		let change = self.change_ref().upgrade();
		let change_done = match &change {
			Some(change) if change.link_completed() => Some(ChangeDoneInfo {
				global_id: change.global_id,
				change_type: change.change_type,
			}),
			_ => None,
		};
		let next_links = match next {
			Some(boxed) => vec![*boxed],
			None => Vec::new(),
		};
		Ok(Completion::Done { next_links, change_done })
	}

	async fn apply(&mut self, index: &Arc<Index>, response: Option<&[u8]>, clouds: &[Arc<dyn CloudAdapter>]) -> Result<()> {
		let adapter_for = |cloud_id: i32| clouds.iter().find(|a| a.cloud_id() == cloud_id);
		match self {
			Command::LocalUpload(c) => {
				let global_id = index
					.insert_file_record(
						&c.dto.kind.to_string(),
						&c.dto.rel_path,
						c.dto.size as i64,
						c.dto.hash.as_ref().map(|h| match h {
							crate::shared::types::Hash::Num(n) => *n as i64,
							crate::shared::types::Hash::Str(_) => 0,
						}),
						c.dto.modified_time,
						c.dto.file_id.map(|f| f as i64),
					)
					.await?;
				c.dto.global_id = Some(global_id);
				Ok(())
			}
			Command::LocalUpdate(c) => {
				index
					.update_file_content(
						c.dto.global_id,
						c.dto.size as i64,
						match &c.dto.hash {
							crate::shared::types::Hash::Num(n) => *n as i64,
							crate::shared::types::Hash::Str(_) => 0,
						},
						c.dto.modified_time,
					)
					.await
			}
			Command::LocalMove(c) => index.update_file_path(c.dto.global_id, &c.dto.new_rel_path).await,
			Command::LocalDelete(c) => index.delete_file_cascade(c.dto.global_id).await,
			Command::CloudUpload(c) => {
				if let (Some(bytes), Some(adapter)) = (response, adapter_for(c.cloud_id)) {
					adapter.process_upload_response(c.as_mut(), bytes)?;
				}
				let global_id = c.dto.global_id.ok_or_else(|| Error::Protocol("cloud upload missing global_id".into()))?;
				index
					.upsert_file_link(
						global_id,
						c.cloud_id,
						c.dto.cloud_file_id.as_deref(),
						c.dto.cloud_parent_id.as_deref(),
						c.dto.hash.as_ref(),
						Some(c.dto.size as i64),
						Some(c.dto.modified_time),
					)
					.await
			}
			Command::CloudUpdate(c) => {
				if let (Some(bytes), Some(adapter)) = (response, adapter_for(c.cloud_id)) {
					adapter.process_update_response(c.as_mut(), bytes)?;
				}
				index
					.upsert_file_link(
						c.dto.global_id,
						c.cloud_id,
						c.dto.cloud_file_id.as_deref(),
						c.dto.cloud_parent_id.as_deref(),
						Some(&c.dto.hash),
						Some(c.dto.size as i64),
						Some(c.dto.modified_time),
					)
					.await
			}
			Command::CloudMove(c) => {
				if let (Some(bytes), Some(adapter)) = (response, adapter_for(c.cloud_id)) {
					adapter.process_move_response(c.as_mut(), bytes)?;
				}
				index
					.upsert_file_link(
						c.dto.global_id,
						c.cloud_id,
						c.dto.cloud_file_id.as_deref(),
						c.dto.new_cloud_parent_id.as_deref(),
						None,
						None,
						Some(c.dto.modified_time),
					)
					.await
			}
			Command::CloudDelete(c) => {
				if let (Some(bytes), Some(adapter)) = (response, adapter_for(c.cloud_id)) {
					adapter.process_delete_response(c.as_mut(), bytes)?;
				}
				Ok(())
			}
			Command::CloudDownloadNew(c) | Command::CloudDownloadUpdate(c) => {
				tokio::fs::rename(&c.staging_path, &c.final_path)
					.await
					.map_err(|e| Error::filesystem(c.final_path.clone(), e))?;
				let global_id = match c.dto.global_id {
					Some(id) => id,
					None => {
						let id = index
							.insert_file_record(
								&c.dto.kind.to_string(),
								&c.dto.rel_path,
								c.dto.size as i64,
								None,
								c.dto.modified_time,
								None,
							)
							.await?;
						c.dto.global_id = Some(id);
						id
					}
				};
				index
					.upsert_file_link(
						global_id,
						c.cloud_id,
						c.dto.cloud_file_id.as_deref(),
						c.dto.cloud_parent_id.as_deref(),
						c.dto.hash.as_ref(),
						Some(c.dto.size as i64),
						Some(c.dto.modified_time),
					)
					.await
			}
		}
	}
}

impl HttpExecutable for Command {
	fn request_handle_mut(&mut self) -> &mut RequestHandle {
		match self {
			Command::CloudUpload(c) => &mut c.handle,
			Command::CloudUpdate(c) => &mut c.handle,
			Command::CloudMove(c) => &mut c.handle,
			Command::CloudDelete(c) => &mut c.handle,
			Command::CloudDownloadNew(c) => &mut c.handle,
			Command::CloudDownloadUpdate(c) => &mut c.handle,
			_ => unreachable!("local commands never enter the HTTP multiplexer"),
		}
	}

	fn cloud_id(&self) -> i32 {
		match self {
			Command::CloudUpload(c) => c.cloud_id,
			Command::CloudUpdate(c) => c.cloud_id,
			Command::CloudMove(c) => c.cloud_id,
			Command::CloudDelete(c) => c.cloud_id,
			Command::CloudDownloadNew(c) => c.cloud_id,
			Command::CloudDownloadUpdate(c) => c.cloud_id,
			_ => 0,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::infrastructure::database::Database;
	use crate::shared::types::{ChangeType, EntryType, Hash};
	use crate::sync::change::Change;
	use pretty_assertions::assert_eq;

	async fn test_index() -> Arc<Index> {
		let dir = tempfile::tempdir().unwrap();
		let db = Database::create(&dir.path().join("index.db")).await.unwrap();
		std::mem::forget(dir); // keep the tempdir alive for the life of the connection
		Arc::new(Index::new(db))
	}

	fn handle() -> RequestHandle {
		RequestHandle::new(reqwest::Method::POST, "")
	}

	#[tokio::test]
	async fn local_upload_assigns_a_global_id_and_reports_change_done_on_last_link() {
		let index = test_index().await;
		let change = Change::new(0, ChangeType::New, "a/b.txt".into(), 1);
		let mut cmd = Command::LocalUpload(Box::new(LocalUploadCmd {
			dto: FileRecordDto::local_new(EntryType::File, "a/b.txt".into(), 10, 100, 42, 7),
			change: Arc::downgrade(&change),
			next: None,
		}));

		let completion = cmd.completion_callback(&index, None, &[]).await.unwrap();
		match completion {
			Completion::Done { next_links, change_done } => {
				assert!(next_links.is_empty());
				let done = change_done.expect("single-link change should complete immediately");
				assert_eq!(done.change_type, ChangeType::New);
			}
			Completion::Repeat => panic!("expected Done"),
		}

		let record = index.file_by_path("a/b.txt").await.unwrap().expect("record inserted");
		assert_eq!(record.path, "a/b.txt");
	}

	#[tokio::test]
	async fn chain_only_reports_change_done_once_every_link_completes() {
		let index = test_index().await;
		let change = Change::new(0, ChangeType::New, "a/b.txt".into(), 2);

		let tail = Command::CloudUpload(Box::new(CloudUploadCmd {
			dto: FileRecordDto::local_new(EntryType::File, "a/b.txt".into(), 10, 100, 42, 7),
			cloud_id: 1,
			handle: handle(),
			change: Arc::downgrade(&change),
			next: None,
		}));
		let mut head = Command::LocalUpload(Box::new(LocalUploadCmd {
			dto: FileRecordDto::local_new(EntryType::File, "a/b.txt".into(), 10, 100, 42, 7),
			change: Arc::downgrade(&change),
			next: Some(Box::new(tail)),
		}));

		let first = head.completion_callback(&index, None, &[]).await.unwrap();
		let mut next_cmd = match first {
			Completion::Done { mut next_links, change_done } => {
				assert!(change_done.is_none(), "chain has one link left");
				next_links.pop().expect("tail link present")
			}
			Completion::Repeat => panic!("expected Done"),
		};

		// the tail's dto carries no global_id yet; the cloud upload step needs one assigned by
		// the local link that ran first, mirroring what ChangeFactory's head does in practice
		if let Command::CloudUpload(c) = &mut next_cmd {
			c.dto.global_id = Some(1);
		}
		let second = next_cmd.completion_callback(&index, None, &[]).await.unwrap();
		match second {
			Completion::Done { next_links, change_done } => {
				assert!(next_links.is_empty());
				assert!(change_done.is_some(), "final link should complete the change");
			}
			Completion::Repeat => panic!("expected Done"),
		}
	}

	#[tokio::test]
	async fn local_update_overwrites_size_and_hash() {
		let index = test_index().await;
		let global_id = index
			.insert_file_record("file", "a/b.txt", 10, Some(42), 100, Some(7))
			.await
			.unwrap();
		let change = Change::new(global_id, ChangeType::Update, "a/b.txt".into(), 1);
		let mut cmd = Command::LocalUpdate(Box::new(LocalUpdateCmd {
			dto: FileUpdatedDto {
				global_id,
				cloud_id: 0,
				kind: EntryType::File,
				rel_path: "a/b.txt".into(),
				cloud_file_id: None,
				cloud_parent_id: None,
				size: 99,
				hash: Hash::Num(555),
				modified_time: 200,
				local_path: None,
			},
			change: Arc::downgrade(&change),
			next: None,
		}));

		cmd.completion_callback(&index, None, &[]).await.unwrap();
		let record = index.file_by_global_id(global_id).await.unwrap().unwrap();
		assert_eq!(record.size, 99);
	}
}

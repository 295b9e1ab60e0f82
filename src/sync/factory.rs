//! Builds a Change plus its full command chain in one shot (C6 construction half).
//! Grounded on `examples/original_source/include/change-factory.h`'s six named constructors
//! (`makeCloudNew`/`makeLocalNew`/`makeCloudMove`/`makeLocalMove`/`makeCloudUpdate`/
//! `makeLocalUpdate`) plus `makeDelete`. Fan-out rule: a change detected on cloud
//! `src_cloud_id` (or locally, `src_cloud_id = 0`) propagates to every other enrolled cloud and,
//! if the source wasn't local, to local too — local is always cloud id `0` in the chain.

use crate::infrastructure::http::RequestHandle;
use crate::shared::types::ChangeType;
use crate::sync::change::Change;
use crate::sync::command::*;
use crate::sync::dto::{FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
use std::sync::Arc;

/// The clouds a chain must reach, built from `enrolled_cloud_ids` minus the source.
fn fan_out_targets(enrolled_cloud_ids: &[i32], src_cloud_id: i32) -> Vec<i32> {
	let mut targets: Vec<i32> = Vec::new();
	if src_cloud_id != 0 {
		targets.push(0); // always propagate back to local unless local was the source
	}
	for &id in enrolled_cloud_ids {
		if id != src_cloud_id && id != 0 {
			targets.push(id);
		}
	}
	targets
}

pub struct ChangeFactory;

impl ChangeFactory {
	/// A brand-new file discovered locally: head is the `LocalUpload`'s index-assignment step
	/// represented as the already-applied local record, chained into one `CloudUpload` per
	/// enrolled cloud.
	pub fn make_local_new(dto: FileRecordDto, enrolled_cloud_ids: &[i32], handle_for: impl Fn(i32, &FileRecordDto) -> RequestHandle) -> (Arc<Change>, Command) {
		let targets = fan_out_targets(enrolled_cloud_ids, 0);
		let change = Change::new(0, ChangeType::New, dto.rel_path.clone(), 1 + targets.len() as u32);

		let mut chain: Option<Box<Command>> = None;
		for &cloud_id in targets.iter().rev() {
			let handle = handle_for(cloud_id, &dto);
			chain = Some(Box::new(Command::CloudUpload(Box::new(CloudUploadCmd {
				dto: dto.clone(),
				cloud_id,
				handle,
				change: Arc::downgrade(&change),
				next: chain,
			}))));
		}

		let head = Command::LocalUpload(Box::new(LocalUploadCmd {
			dto,
			change: Arc::downgrade(&change),
			next: chain,
		}));
		(change, head)
	}

	/// A brand-new file discovered on a cloud: head persists the local record, then a
	/// `CloudUpload` per remaining cloud (never re-uploads to its own source).
	pub fn make_cloud_new(
		dto: FileRecordDto,
		src_cloud_id: i32,
		enrolled_cloud_ids: &[i32],
		handle_for: impl Fn(i32, &FileRecordDto) -> RequestHandle,
	) -> (Arc<Change>, Command) {
		let targets = fan_out_targets(enrolled_cloud_ids, src_cloud_id);
		let change = Change::new(0, ChangeType::New, dto.rel_path.clone(), 1 + targets.len() as u32);

		let mut chain: Option<Box<Command>> = None;
		for &cloud_id in targets.iter().rev() {
			if cloud_id == 0 {
				continue;
			}
			let handle = handle_for(cloud_id, &dto);
			chain = Some(Box::new(Command::CloudUpload(Box::new(CloudUploadCmd {
				dto: dto.clone(),
				cloud_id,
				handle,
				change: Arc::downgrade(&change),
				next: chain,
			}))));
		}

		let mut local_dto = dto.clone();
		local_dto.cloud_id = 0;
		let head = Command::LocalUpload(Box::new(LocalUploadCmd {
			dto: local_dto,
			change: Arc::downgrade(&change),
			next: chain,
		}));
		(change, head)
	}

	pub fn make_local_update(dto: FileUpdatedDto, enrolled_cloud_ids: &[i32], handle_for: impl Fn(i32, &FileUpdatedDto) -> RequestHandle) -> (Arc<Change>, Command) {
		let targets = fan_out_targets(enrolled_cloud_ids, 0);
		let change = Change::new(dto.global_id, ChangeType::Update, dto.rel_path.clone(), 1 + targets.len() as u32);

		let mut chain: Option<Box<Command>> = None;
		for &cloud_id in targets.iter().rev() {
			let handle = handle_for(cloud_id, &dto);
			chain = Some(Box::new(Command::CloudUpdate(Box::new(CloudUpdateCmd {
				dto: dto.clone(),
				cloud_id,
				handle,
				change: Arc::downgrade(&change),
				next: chain,
			}))));
		}
		let head = Command::LocalUpdate(Box::new(LocalUpdateCmd {
			dto,
			change: Arc::downgrade(&change),
			next: chain,
		}));
		(change, head)
	}

	pub fn make_cloud_update(
		dto: FileUpdatedDto,
		src_cloud_id: i32,
		enrolled_cloud_ids: &[i32],
		handle_for: impl Fn(i32, &FileUpdatedDto) -> RequestHandle,
	) -> (Arc<Change>, Command) {
		let targets = fan_out_targets(enrolled_cloud_ids, src_cloud_id);
		let change = Change::new(dto.global_id, ChangeType::Update, dto.rel_path.clone(), 1 + targets.len() as u32);

		let mut chain: Option<Box<Command>> = None;
		for &cloud_id in targets.iter().rev() {
			if cloud_id == 0 {
				continue;
			}
			let handle = handle_for(cloud_id, &dto);
			chain = Some(Box::new(Command::CloudUpdate(Box::new(CloudUpdateCmd {
				dto: dto.clone(),
				cloud_id,
				handle,
				change: Arc::downgrade(&change),
				next: chain,
			}))));
		}
		let head = Command::LocalUpdate(Box::new(LocalUpdateCmd {
			dto,
			change: Arc::downgrade(&change),
			next: chain,
		}));
		(change, head)
	}

	pub fn make_local_move(dto: FileMovedDto, enrolled_cloud_ids: &[i32], handle_for: impl Fn(i32, &FileMovedDto) -> RequestHandle) -> (Arc<Change>, Command) {
		let targets = fan_out_targets(enrolled_cloud_ids, 0);
		let change = Change::new(dto.global_id, ChangeType::Move, dto.new_rel_path.clone(), 1 + targets.len() as u32);

		let mut chain: Option<Box<Command>> = None;
		for &cloud_id in targets.iter().rev() {
			let handle = handle_for(cloud_id, &dto);
			chain = Some(Box::new(Command::CloudMove(Box::new(CloudMoveCmd {
				dto: dto.clone(),
				cloud_id,
				handle,
				change: Arc::downgrade(&change),
				next: chain,
			}))));
		}
		let head = Command::LocalMove(Box::new(LocalMoveCmd {
			dto,
			change: Arc::downgrade(&change),
			next: chain,
		}));
		(change, head)
	}

	pub fn make_cloud_move(
		dto: FileMovedDto,
		src_cloud_id: i32,
		enrolled_cloud_ids: &[i32],
		handle_for: impl Fn(i32, &FileMovedDto) -> RequestHandle,
	) -> (Arc<Change>, Command) {
		let targets = fan_out_targets(enrolled_cloud_ids, src_cloud_id);
		let change = Change::new(dto.global_id, ChangeType::Move, dto.new_rel_path.clone(), 1 + targets.len() as u32);

		let mut chain: Option<Box<Command>> = None;
		for &cloud_id in targets.iter().rev() {
			if cloud_id == 0 {
				continue;
			}
			let handle = handle_for(cloud_id, &dto);
			chain = Some(Box::new(Command::CloudMove(Box::new(CloudMoveCmd {
				dto: dto.clone(),
				cloud_id,
				handle,
				change: Arc::downgrade(&change),
				next: chain,
			}))));
		}
		let head = Command::LocalMove(Box::new(LocalMoveCmd {
			dto,
			change: Arc::downgrade(&change),
			next: chain,
		}));
		(change, head)
	}

	/// Deletion always heads with `LocalDelete`, regardless of which endpoint originated it:
	/// the index cascade (FileRecord + every FileLink) lives only in `LocalDelete::apply`, so
	/// a cloud-originated delete still needs it run first. The remaining enrolled clouds (never
	/// the source cloud, never local) fan out after.
	pub fn make_delete(
		dto: FileDeletedDto,
		src_cloud_id: i32,
		enrolled_cloud_ids: &[i32],
		handle_for: impl Fn(i32, &FileDeletedDto) -> RequestHandle,
	) -> (Arc<Change>, Command) {
		let cloud_targets: Vec<i32> = enrolled_cloud_ids.iter().copied().filter(|&id| id != 0 && id != src_cloud_id).collect();
		let change = Change::new(dto.global_id, ChangeType::Delete, dto.rel_path.clone(), 1 + cloud_targets.len() as u32);

		let mut chain: Option<Box<Command>> = None;
		for &cloud_id in cloud_targets.iter().rev() {
			let handle = handle_for(cloud_id, &dto);
			chain = Some(Box::new(Command::CloudDelete(Box::new(CloudDeleteCmd {
				dto: dto.clone(),
				cloud_id,
				handle,
				change: Arc::downgrade(&change),
				next: chain,
			}))));
		}

		let head = Command::LocalDelete(Box::new(LocalDeleteCmd {
			dto,
			change: Arc::downgrade(&change),
			next: chain,
		}));
		(change, head)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::shared::types::EntryType;

	fn noop_handle<T>(_cloud_id: i32, _dto: &T) -> RequestHandle {
		RequestHandle::new(reqwest::Method::POST, "")
	}

	fn sample_record(rel_path: &str) -> FileRecordDto {
		FileRecordDto::local_new(EntryType::File, rel_path.to_string(), 10, 0, 42, 7)
	}

    #[test]
    fn fan_out_from_local_reaches_every_enrolled_cloud() {
        let targets = fan_out_targets(&[1, 2, 3], 0);
        assert_eq!(targets, vec![1, 2, 3]);
    }

    #[test]
    fn fan_out_from_a_cloud_reaches_local_and_the_other_clouds() {
        let targets = fan_out_targets(&[1, 2, 3], 2);
        assert_eq!(targets, vec![0, 1, 3]);
    }

	#[test]
	fn make_local_new_chain_has_one_link_per_enrolled_cloud_plus_head() {
		let dto = sample_record("a/b.txt");
		let (change, head) = ChangeFactory::make_local_new(dto, &[1, 2], noop_handle);
		assert_eq!(change.pending_count(), 3);
		match head {
			Command::LocalUpload(c) => {
				let mut depth = 0;
				let mut next = c.next;
				while let Some(boxed) = next {
					depth += 1;
					next = match *boxed {
						Command::CloudUpload(c) => c.next,
						_ => panic!("expected CloudUpload link"),
					};
				}
				assert_eq!(depth, 2);
			}
			_ => panic!("expected LocalUpload head"),
		}
	}

	#[test]
	fn make_cloud_new_never_targets_its_own_source_cloud() {
		let dto = sample_record("a/b.txt");
		let (change, head) = ChangeFactory::make_cloud_new(dto, 1, &[1, 2, 3], noop_handle);
		assert_eq!(change.pending_count(), 3); // local + clouds 2,3 (not 1)
		match head {
			Command::LocalUpload(c) => {
				let mut ids = Vec::new();
				let mut next = c.next;
				while let Some(boxed) = next {
					next = match *boxed {
						Command::CloudUpload(c) => {
							ids.push(c.cloud_id);
							c.next
						}
						_ => panic!("expected CloudUpload link"),
					};
				}
				assert_eq!(ids, vec![2, 3]);
			}
			_ => panic!("expected LocalUpload head"),
		}
	}

	#[test]
	fn make_delete_with_local_source_heads_with_local_delete() {
		let dto = FileDeletedDto { global_id: 5, cloud_id: 0, rel_path: "a/b.txt".into(), cloud_file_id: None, when: 0 };
		let (change, head) = ChangeFactory::make_delete(dto, 0, &[1], noop_handle);
		assert_eq!(change.pending_count(), 2); // local cascade + the one enrolled cloud
		assert!(matches!(head, Command::LocalDelete(_)), "local delete must own the index cascade, even with clouds enrolled");
	}

	#[test]
	fn make_delete_with_cloud_source_still_heads_with_local_delete_and_skips_the_source_cloud() {
		let dto = FileDeletedDto { global_id: 5, cloud_id: 1, rel_path: "a/b.txt".into(), cloud_file_id: None, when: 0 };
		let (change, head) = ChangeFactory::make_delete(dto, 1, &[1, 2], noop_handle);
		assert_eq!(change.pending_count(), 2); // local cascade + cloud 2 (not the source, cloud 1)
		match head {
			Command::LocalDelete(c) => match c.next {
				Some(boxed) => match *boxed {
					Command::CloudDelete(c) => assert_eq!(c.cloud_id, 2),
					_ => panic!("expected CloudDelete link"),
				},
				None => panic!("expected one CloudDelete link"),
			},
			_ => panic!("expected LocalDelete head"),
		}
	}

	#[test]
	fn make_delete_with_no_enrolled_clouds_heads_with_local_delete() {
		let dto = FileDeletedDto { global_id: 5, cloud_id: 0, rel_path: "a/b.txt".into(), cloud_file_id: None, when: 0 };
		let (change, head) = ChangeFactory::make_delete(dto, 0, &[], noop_handle);
		assert_eq!(change.pending_count(), 1);
		assert!(matches!(head, Command::LocalDelete(_)));
	}
}

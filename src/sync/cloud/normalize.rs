//! Provider-agnostic classification of one delta/changes page into dispatchable Changes (C9).
//! Grounded on `examples/original_source/include/BaseStorage.h`'s change-normalization pass: a
//! concrete adapter's job ends at turning its provider's raw response into a [`DeltaPage`];
//! everything below is shared regardless of which cloud produced it.

use super::{cloud_handle, CloudAdapter};
use crate::error::Result;
use crate::infrastructure::database::Index;
use crate::shared::types::ChangeType;
use crate::sync::change::Change;
use crate::sync::command::Command;
use crate::sync::dto::{DeltaEntry, FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
use crate::sync::expected_events::ExpectedEventsRegistry;
use crate::sync::factory::ChangeFactory;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Folds one delta page's entries into dispatchable `(Change, Command)` pairs.
///
/// An entry whose parent hasn't been classified yet in this page, and isn't already indexed
/// either, is deferred until that parent resolves (a `New` entry for a file nested inside a
/// folder the provider also just created in the same page). Entries still waiting once nothing
/// else can resolve are dropped with a warning — the provider's next page carries their parent.
///
/// A `trashed` entry sharing its id with a live entry elsewhere in the page is elided: that is
/// a rename/reparent represented by the provider as delete-old + add-new, and the live entry's
/// own path/hash diff against the index already turns it into a Move (optionally with a
/// dependent Update), so surfacing the trashed half too would double-report the same mutation.
pub async fn normalize_delta_page(
	entries: Vec<DeltaEntry>,
	cloud_id: i32,
	index: &Index,
	expected: &ExpectedEventsRegistry,
	enrolled_cloud_ids: &[i32],
	clouds: &[Arc<dyn CloudAdapter>],
) -> Result<Vec<(Arc<Change>, Command)>> {
	let live_ids: HashSet<String> = entries.iter().filter(|e| !e.trashed).map(|e| e.cloud_file_id.clone()).collect();

	let mut out = Vec::new();
	let mut resolved: HashSet<String> = HashSet::new();
	let mut deferred: HashMap<String, Vec<DeltaEntry>> = HashMap::new();
	let mut queue: VecDeque<DeltaEntry> = entries.into_iter().collect();
	let mut stalled = 0usize;

	while let Some(entry) = queue.pop_front() {
		if entry.trashed {
			if let Some(pair) = classify_trashed(&entry, cloud_id, index, expected, enrolled_cloud_ids, clouds, &live_ids).await? {
				out.push(pair);
			}
			stalled = 0;
			continue;
		}

		let parent_ready = entry.cloud_parent_id.is_empty()
			|| resolved.contains(&entry.cloud_parent_id)
			|| index.link_by_cloud_file_id(cloud_id, &entry.cloud_parent_id).await?.is_some();

		if !parent_ready {
			deferred.entry(entry.cloud_parent_id.clone()).or_default().push(entry);
			stalled += 1;
			if stalled > queue.len() {
				break; // everything left in the queue is waiting on a parent this page never carried
			}
			continue;
		}

		stalled = 0;
		let settled_id = entry.cloud_file_id.clone();
		out.extend(classify_present(&entry, cloud_id, index, expected, enrolled_cloud_ids, clouds).await?);
		resolved.insert(settled_id.clone());
		if let Some(waiting) = deferred.remove(&settled_id) {
			queue.extend(waiting);
		}
	}

	if !deferred.is_empty() {
		warn!(cloud_id, waiting = deferred.values().map(Vec::len).sum::<usize>(), "delta entries deferred past end of page, retrying next poll");
	}

	Ok(out)
}

async fn classify_trashed(
	entry: &DeltaEntry,
	cloud_id: i32,
	index: &Index,
	expected: &ExpectedEventsRegistry,
	enrolled_cloud_ids: &[i32],
	clouds: &[Arc<dyn CloudAdapter>],
	live_ids: &HashSet<String>,
) -> Result<Option<(Arc<Change>, Command)>> {
	if live_ids.contains(&entry.cloud_file_id) {
		return Ok(None);
	}
	let Some(link) = index.link_by_cloud_file_id(cloud_id, &entry.cloud_file_id).await? else {
		return Ok(None); // trashed before we ever learned of it
	};
	if expected.check_and_clear(&entry.cloud_file_id, ChangeType::Delete) {
		return Ok(None);
	}
	let dto = FileDeletedDto {
		global_id: link.global_id,
		cloud_id,
		rel_path: entry.rel_path.clone(),
		cloud_file_id: Some(entry.cloud_file_id.clone()),
		when: entry.modified_time,
	};
	Ok(Some(ChangeFactory::make_delete(dto, cloud_id, enrolled_cloud_ids, |target, dto| {
		cloud_handle(clouds, reqwest::Method::DELETE, target, dto, |a, h, d| a.setup_delete_handle(h, d))
	})))
}

async fn classify_present(
	entry: &DeltaEntry,
	cloud_id: i32,
	index: &Index,
	expected: &ExpectedEventsRegistry,
	enrolled_cloud_ids: &[i32],
	clouds: &[Arc<dyn CloudAdapter>],
) -> Result<Vec<(Arc<Change>, Command)>> {
	let Some(link) = index.link_by_cloud_file_id(cloud_id, &entry.cloud_file_id).await? else {
		if expected.check_and_clear(&entry.rel_path, ChangeType::New) {
			return Ok(Vec::new());
		}
		let dto = FileRecordDto::cloud_new(
			cloud_id,
			entry.kind,
			entry.rel_path.clone(),
			entry.cloud_file_id.clone(),
			entry.cloud_parent_id.clone(),
			entry.size,
			entry.modified_time,
			entry.hash.clone(),
		);
		return Ok(vec![ChangeFactory::make_cloud_new(dto, cloud_id, enrolled_cloud_ids, |target, dto| {
			cloud_handle(clouds, reqwest::Method::POST, target, dto, |a, h, d| a.setup_upload_handle(h, d))
		})]);
	};

	let Some(record) = index.file_by_global_id(link.global_id).await? else {
		return Ok(Vec::new()); // dangling link; next poll re-derives it once the index catches up
	};

	let moved = record.path != entry.rel_path;
	let content_changed = link.cloud_hash_check_sum.as_deref() != Some(entry.hash.to_column().as_str());
	let mut out = Vec::new();

	if moved && !expected.check_and_clear(&entry.cloud_file_id, ChangeType::Move) {
		let kind = crate::shared::types::EntryType::from_str(&record.kind).unwrap_or(entry.kind);
		let dto = FileMovedDto {
			global_id: link.global_id,
			cloud_id,
			kind,
			old_rel_path: record.path.clone(),
			new_rel_path: entry.rel_path.clone(),
			cloud_file_id: Some(entry.cloud_file_id.clone()),
			old_cloud_parent_id: link.cloud_parent_id.clone(),
			new_cloud_parent_id: Some(entry.cloud_parent_id.clone()),
			modified_time: entry.modified_time,
		};
		out.push(ChangeFactory::make_cloud_move(dto, cloud_id, enrolled_cloud_ids, |target, dto| {
			cloud_handle(clouds, reqwest::Method::PATCH, target, dto, |a, h, d| a.setup_move_handle(h, d))
		}));
	}

	if content_changed && !expected.check_and_clear(&entry.cloud_file_id, ChangeType::Update) {
		let dto = FileUpdatedDto {
			global_id: link.global_id,
			cloud_id,
			kind: entry.kind,
			rel_path: entry.rel_path.clone(),
			cloud_file_id: Some(entry.cloud_file_id.clone()),
			cloud_parent_id: Some(entry.cloud_parent_id.clone()),
			size: entry.size,
			hash: entry.hash.clone(),
			modified_time: entry.modified_time,
			local_path: None,
		};
		out.push(ChangeFactory::make_cloud_update(dto, cloud_id, enrolled_cloud_ids, |target, dto| {
			cloud_handle(clouds, reqwest::Method::PATCH, target, dto, |a, h, d| a.setup_update_handle(h, d))
		}));
	}

	Ok(out) // neither moved nor changed: noise, nothing to report
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::infrastructure::database::{Database, Index};
	use crate::shared::types::{EntryType, Hash};

	async fn test_index() -> Index {
		let dir = tempfile::tempdir().unwrap();
		let db = Database::create(&dir.path().join("index.db")).await.unwrap();
		std::mem::forget(dir);
		Index::new(db)
	}

	fn entry(id: &str, parent: &str, rel_path: &str, hash: u64) -> DeltaEntry {
		DeltaEntry {
			cloud_file_id: id.into(),
			cloud_parent_id: parent.into(),
			rel_path: rel_path.into(),
			kind: EntryType::File,
			size: 10,
			modified_time: 100,
			hash: Hash::Num(hash),
			trashed: false,
		}
	}

	#[tokio::test]
	async fn brand_new_entry_at_root_becomes_a_cloud_new_change() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		let pairs = normalize_delta_page(vec![entry("f1", "", "a.txt", 1)], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert_eq!(pairs.len(), 1);
		assert!(matches!(pairs[0].1, Command::LocalUpload(_)));
	}

	#[tokio::test]
	async fn entry_nested_under_an_unresolved_folder_is_deferred_and_dropped() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		// "child" claims parent "folder-1", which never appears in this page and isn't indexed.
		let pairs = normalize_delta_page(vec![entry("child", "folder-1", "d/a.txt", 1)], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert!(pairs.is_empty());
	}

	#[tokio::test]
	async fn unchanged_entry_is_noise() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		let global_id = index.insert_file_record("File", "a.txt", 10, Some(1), 100, None).await.unwrap();
		index.upsert_file_link(global_id, 1, Some("f1"), Some(""), Some(&Hash::Num(1)), Some(10), Some(100)).await.unwrap();

		let pairs = normalize_delta_page(vec![entry("f1", "", "a.txt", 1)], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert!(pairs.is_empty());
	}

	#[tokio::test]
	async fn content_change_on_an_indexed_entry_becomes_an_update() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		let global_id = index.insert_file_record("File", "a.txt", 10, Some(1), 100, None).await.unwrap();
		index.upsert_file_link(global_id, 1, Some("f1"), Some(""), Some(&Hash::Num(1)), Some(10), Some(100)).await.unwrap();

		let pairs = normalize_delta_page(vec![entry("f1", "", "a.txt", 2)], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert_eq!(pairs.len(), 1);
		assert!(matches!(pairs[0].1, Command::LocalUpdate(_)));
	}

	#[tokio::test]
	async fn move_and_content_change_together_produce_a_move_and_a_dependent_update() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		let global_id = index.insert_file_record("File", "a.txt", 10, Some(1), 100, None).await.unwrap();
		index.upsert_file_link(global_id, 1, Some("f1"), Some(""), Some(&Hash::Num(1)), Some(10), Some(100)).await.unwrap();

		let pairs = normalize_delta_page(vec![entry("f1", "", "b.txt", 2)], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert_eq!(pairs.len(), 2);
		assert!(matches!(pairs[0].1, Command::LocalMove(_)));
		assert!(matches!(pairs[1].1, Command::LocalUpdate(_)));
	}

	#[tokio::test]
	async fn trashed_entry_sharing_an_id_with_a_live_entry_is_elided_as_a_move() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		let global_id = index.insert_file_record("File", "a.txt", 10, Some(1), 100, None).await.unwrap();
		index.upsert_file_link(global_id, 1, Some("f1"), Some(""), Some(&Hash::Num(1)), Some(10), Some(100)).await.unwrap();

		let mut trashed = entry("f1", "", "a.txt", 1);
		trashed.trashed = true;
		let live = entry("f1", "", "b.txt", 1);
		let pairs = normalize_delta_page(vec![trashed, live], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert_eq!(pairs.len(), 1, "only the live entry's Move should surface, not a separate Delete");
		assert!(matches!(pairs[0].1, Command::LocalMove(_)));
	}

	#[tokio::test]
	async fn a_genuinely_trashed_entry_becomes_a_delete() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		let global_id = index.insert_file_record("File", "a.txt", 10, Some(1), 100, None).await.unwrap();
		index.upsert_file_link(global_id, 1, Some("f1"), Some(""), Some(&Hash::Num(1)), Some(10), Some(100)).await.unwrap();

		let mut trashed = entry("f1", "", "a.txt", 1);
		trashed.trashed = true;
		let pairs = normalize_delta_page(vec![trashed], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert_eq!(pairs.len(), 1);
		assert!(matches!(pairs[0].1, Command::LocalDelete(_)));
	}

	#[tokio::test]
	async fn expected_self_echo_suppresses_the_new_entry() {
		let index = test_index().await;
		let expected = ExpectedEventsRegistry::new();
		expected.add("a.txt", ChangeType::New);
		let pairs = normalize_delta_page(vec![entry("f1", "", "a.txt", 1)], 1, &index, &expected, &[1], &[]).await.unwrap();
		assert!(pairs.is_empty());
	}
}

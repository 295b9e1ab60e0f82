//! The sync manager (C10): wires every other component together, runs initial-sync
//! reconciliation once, then drives the daemon's watcher/poll/dispatch tasks until shutdown.
//! Grounded on `examples/original_source/include/sync-manager.h`.

use crate::error::{Error, Result};
use crate::infrastructure::database::Index;
use crate::infrastructure::dispatcher::{CallbackDispatcher, Completed};
use crate::infrastructure::events::{Event, EventBus};
use crate::infrastructure::http::{HttpMultiplexer, Outcome};
use crate::shared::types::ChangeType;
use crate::sync::change::Change;
use crate::sync::cloud::{cloud_handle, CloudAdapter};
use crate::sync::command::Command;
use crate::sync::dto::FileUpdatedDto;
use crate::sync::factory::ChangeFactory;
use crate::sync::local::LocalAdapter;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};

/// Keeps only the highest-precedence pair per target path within one poll's batch. A Move
/// paired with its dependent Update (same file, same batch — normalization's own Move+Update
/// combination) is exempt: both target the file's new path but are not competing changes.
fn resolve_batch_conflicts(pairs: Vec<(Arc<Change>, Command)>) -> Vec<(Arc<Change>, Command)> {
	let mut by_path: HashMap<String, Vec<(Arc<Change>, Command)>> = HashMap::new();
	for pair in pairs {
		by_path.entry(pair.1.target().to_string()).or_default().push(pair);
	}

	let mut out = Vec::new();
	for (_path, mut group) in by_path {
		if group.len() == 2 {
			let types = (group[0].0.change_type, group[1].0.change_type);
			let same_file = group[0].0.global_id == group[1].0.global_id;
			if same_file && matches!(types, (ChangeType::Move, ChangeType::Update) | (ChangeType::Update, ChangeType::Move)) {
				out.extend(group);
				continue;
			}
		}
		group.sort_by_key(|(change, _)| std::cmp::Reverse(change.change_type.precedence()));
		out.push(group.into_iter().next().expect("group is non-empty"));
	}
	out
}

pub struct SyncManagerConfig {
	pub poll_interval: Duration,
	pub http_concurrency: usize,
}

pub struct SyncManager {
	index: Arc<Index>,
	events: Arc<EventBus>,
	local: Arc<LocalAdapter>,
	clouds: Vec<Arc<dyn CloudAdapter>>,
	config: SyncManagerConfig,
	quarantined: Mutex<HashSet<i32>>,
	shutting_down: Arc<AtomicBool>,
}

impl SyncManager {
	pub fn new(index: Arc<Index>, events: Arc<EventBus>, local: Arc<LocalAdapter>, clouds: Vec<Arc<dyn CloudAdapter>>, config: SyncManagerConfig) -> Self {
		Self { index, events, local, clouds, config, quarantined: Mutex::new(HashSet::new()), shutting_down: Arc::new(AtomicBool::new(false)) }
	}

	fn enrolled_cloud_ids(&self) -> Vec<i32> {
		let quarantined = self.quarantined.lock().expect("lock poisoned");
		self.clouds.iter().map(|c| c.cloud_id()).filter(|id| !quarantined.contains(id)).collect()
	}

	fn is_quarantined(&self, cloud_id: i32) -> bool {
		self.quarantined.lock().expect("lock poisoned").contains(&cloud_id)
	}

	fn quarantine(&self, cloud_id: i32, reason: String) {
		if self.quarantined.lock().expect("lock poisoned").insert(cloud_id) {
			self.events.emit(Event::CloudQuarantined { cloud_id, reason });
		}
	}

	/// Called when an operator-supplied corrected `config_data` has been written through the
	/// index; the next poll tick calling this lifts quarantine.
	pub fn reinstate(&self, cloud_id: i32) {
		if self.quarantined.lock().expect("lock poisoned").remove(&cloud_id) {
			self.events.emit(Event::CloudReinstated { cloud_id });
		}
	}

	/// Builds the one-time reconciliation table and applies it, then marks `initial_sync_done`.
	/// A no-op if that flag is already set (a restart after the first successful run).
	pub async fn run_initial_sync(&self) -> Result<()> {
		if self.index.is_initial_sync_done().await? {
			return Ok(());
		}
		self.events.emit(Event::InitialSyncStarted);
		let span = info_span!("initial_sync");
		async {
			self.local.preflight().await?;

			for cloud in &self.clouds {
				if let Err(e) = cloud.refresh_access_token().await {
					self.quarantine(cloud.cloud_id(), e.to_string());
					continue;
				}
				if let Err(e) = cloud.ensure_root_exists().await {
					self.quarantine(cloud.cloud_id(), e.to_string());
				}
			}

			let mut by_path: HashMap<String, crate::sync::dto::FileRecordDto> = HashMap::new();
			for cloud in &self.clouds {
				if self.is_quarantined(cloud.cloud_id()) {
					continue;
				}
				for dto in cloud.initial_files().await? {
					match by_path.get(&dto.rel_path) {
						Some(existing) if existing.modified_time >= dto.modified_time => {}
						_ => {
							by_path.insert(dto.rel_path.clone(), dto);
						}
					}
				}
			}

			let local_files = self.local.initial_files()?;
			let local_by_path: HashMap<String, _> = local_files.into_iter().map(|f| (f.rel_path.clone(), f)).collect();

			let enrolled = self.enrolled_cloud_ids();
			let mut all_paths: HashSet<String> = by_path.keys().cloned().collect();
			all_paths.extend(local_by_path.keys().cloned());

			for path in all_paths {
				let cloud_entry = by_path.get(&path);
				let local_entry = local_by_path.get(&path);
				match (cloud_entry, local_entry) {
					(Some(cloud_dto), None) => {
						// fan-out targets here are the *other* enrolled clouds the adopted file
						// also needs to reach; `apply_reconciliation_step` applies the resulting
						// chain's index mutation directly rather than through the multiplexer, so
						// these handles are never actually sent (matching the local-only branch).
						let (_change, head) = ChangeFactory::make_cloud_new(cloud_dto.clone(), cloud_dto.cloud_id, &enrolled, |cloud_id, dto| {
							cloud_handle(&self.clouds, reqwest::Method::POST, cloud_id, dto, |a, h, d| a.setup_upload_handle(h, d))
						});
						self.apply_reconciliation_step(head).await?;
					}
					(None, Some(local_dto)) => {
						let (_change, head) = ChangeFactory::make_local_new(local_dto.clone(), &enrolled, |cloud_id, dto| {
							cloud_handle(&self.clouds, reqwest::Method::POST, cloud_id, dto, |a, h, d| a.setup_upload_handle(h, d))
						});
						self.apply_reconciliation_step(head).await?;
					}
					(Some(cloud_dto), Some(local_dto)) => {
						self.reconcile_both_sides(&path, cloud_dto, local_dto).await?;
					}
					(None, None) => unreachable!("path came from one of the two maps"),
				}
			}

			self.index.mark_initial_sync_done().await?;
			self.events.emit(Event::InitialSyncCompleted);
			Ok(())
		}
		.instrument(span)
		.await
	}

	/// Gets `local_dto`'s `global_id`, inserting its FileRecord if this is the first time the
	/// index has seen it (the same lazy-insert the hashes-match branch already needed).
	async fn ensure_local_record(&self, local_dto: &crate::sync::dto::FileRecordDto) -> Result<i32> {
		match local_dto.global_id {
			Some(id) => Ok(id),
			None => {
				self.index
					.insert_file_record(
						&local_dto.kind.to_string(),
						&local_dto.rel_path,
						local_dto.size as i64,
						None,
						local_dto.modified_time,
						local_dto.file_id.map(|f| f as i64),
					)
					.await
			}
		}
	}

	async fn reconcile_both_sides(&self, path: &str, cloud_dto: &crate::sync::dto::FileRecordDto, local_dto: &crate::sync::dto::FileRecordDto) -> Result<()> {
		let hashes_match = matches!(&cloud_dto.hash, Some(h) if local_dto.hash.as_ref() == Some(h));
		if hashes_match {
			let global_id = self.ensure_local_record(local_dto).await?;
			self.index
				.upsert_file_link(
					global_id,
					cloud_dto.cloud_id,
					cloud_dto.cloud_file_id.as_deref(),
					cloud_dto.cloud_parent_id.as_deref(),
					cloud_dto.hash.as_ref(),
					Some(cloud_dto.size as i64),
					Some(cloud_dto.modified_time),
				)
				.await?;
			return Ok(());
		}

		let global_id = self.ensure_local_record(local_dto).await?;
		let enrolled = self.enrolled_cloud_ids();

		if cloud_dto.modified_time > local_dto.modified_time {
			info!(path, "initial sync: cloud copy newer, pulling");
			let Some(hash) = cloud_dto.hash.clone() else { return Ok(()) };
			let dto = FileUpdatedDto {
				global_id,
				cloud_id: cloud_dto.cloud_id,
				kind: cloud_dto.kind,
				rel_path: path.to_string(),
				cloud_file_id: cloud_dto.cloud_file_id.clone(),
				cloud_parent_id: cloud_dto.cloud_parent_id.clone(),
				size: cloud_dto.size,
				hash,
				modified_time: cloud_dto.modified_time,
				local_path: None,
			};
			let (_change, head) = ChangeFactory::make_cloud_update(dto, cloud_dto.cloud_id, &enrolled, |cloud_id, dto| {
				cloud_handle(&self.clouds, reqwest::Method::PATCH, cloud_id, dto, |a, h, d| a.setup_update_handle(h, d))
			});
			self.apply_reconciliation_step(head).await?;
		} else {
			info!(path, "initial sync: local copy newer, pushing");
			let Some(hash) = local_dto.hash.clone() else { return Ok(()) };
			let dto = FileUpdatedDto {
				global_id,
				cloud_id: 0,
				kind: local_dto.kind,
				rel_path: path.to_string(),
				cloud_file_id: None,
				cloud_parent_id: None,
				size: local_dto.size,
				hash,
				modified_time: local_dto.modified_time,
				local_path: local_dto.local_path.clone(),
			};
			let (_change, head) = ChangeFactory::make_local_update(dto, &enrolled, |cloud_id, dto| {
				cloud_handle(&self.clouds, reqwest::Method::PATCH, cloud_id, dto, |a, h, d| a.setup_update_handle(h, d))
			});
			self.apply_reconciliation_step(head).await?;
		}
		Ok(())
	}

	/// Initial sync already knows the final state from enumeration, so a reconciliation step
	/// applies its head command's index mutation directly rather than going through the HTTP
	/// multiplexer or the callback dispatcher's queue.
	async fn apply_reconciliation_step(&self, mut head: Command) -> Result<()> {
		head.completion_callback(&self.index, None, &self.clouds).await?;
		Ok(())
	}

	/// Starts the daemon: watcher, poll loop, HTTP multiplexer, and the callback dispatcher,
	/// all as tokio tasks, until [`Self::shutdown`] is called. Shutdown order is local watcher,
	/// then polling, then the HTTP multiplexer, then the callback dispatcher — each given a
	/// chance to drain before the next is torn down.
	pub async fn run_daemon(self: Arc<Self>) -> Result<()> {
		let (_watcher_guard, mut watcher_rx) = self.local.start_watching()?;
		let (multiplexer, mut http_outbound) = HttpMultiplexer::<Command>::new(self.config.http_concurrency);
		let http_submit = multiplexer.submitter();
		let multiplexer_task = tokio::spawn(multiplexer.run());

		let (to_cloud_tx, mut to_cloud_rx) = mpsc::channel::<Command>(256);
		let (dispatcher, completed_tx) = CallbackDispatcher::new(self.index.clone(), self.events.clone(), to_cloud_tx, self.clouds.clone());
		let dispatcher_task = tokio::spawn(dispatcher.clone().run());

		let http_submit_for_relay = http_submit.clone();
		let cloud_relay_task = tokio::spawn(async move {
			while let Some(cmd) = to_cloud_rx.recv().await {
				let _ = http_submit_for_relay.send(cmd).await;
			}
		});

		let completed_tx_for_http = completed_tx.clone();
		let outbound_drain_task = tokio::spawn(async move {
			while let Some(outcome) = http_outbound.recv().await {
				match outcome {
					Outcome::Success(cmd, bytes) => {
						let _ = completed_tx_for_http.send(Completed { command: cmd, response: Some(bytes) }).await;
					}
					Outcome::Failed(cmd, reason) => {
						warn!(cmd_target = cmd.target(), %reason, "command failed permanently");
					}
				}
			}
		});

		let watcher_manager = self.clone();
		let http_submit_for_watcher = http_submit.clone();
		let completed_tx_for_watcher = completed_tx.clone();
		let mut watcher_task = tokio::spawn(async move {
			while let Some(event) = watcher_rx.recv().await {
				if watcher_manager.shutting_down.load(Ordering::Relaxed) {
					break;
				}
				let enrolled = watcher_manager.enrolled_cloud_ids();
				match watcher_manager.local.handle_event(event, &enrolled, &watcher_manager.clouds).await {
					Ok(Some((_change, head))) => {
						if head.is_cloud() {
							let _ = http_submit_for_watcher.send(head).await;
						} else {
							let _ = completed_tx_for_watcher.send(Completed { command: head, response: None }).await;
						}
					}
					Ok(None) => {}
					Err(e) => warn!(%e, "local event handling failed"),
				}
			}
		});

		let poll_manager = self.clone();
		let http_submit_for_poll = http_submit.clone();
		let completed_tx_for_poll = completed_tx.clone();
		let mut poll_task = tokio::spawn(async move {
			loop {
				if poll_manager.shutting_down.load(Ordering::Relaxed) {
					break;
				}
				let enrolled = poll_manager.enrolled_cloud_ids();
				for cloud in &poll_manager.clouds {
					if poll_manager.is_quarantined(cloud.cloud_id()) {
						continue;
					}
					match cloud.poll_changes(&poll_manager.index, &enrolled, &poll_manager.clouds).await {
						Ok((pairs, token)) => {
							for (_change, head) in resolve_batch_conflicts(pairs) {
								if let Some(missing) = poll_manager.index.missing_path_part(Path::new(head.target())).await.unwrap_or(None) {
									if let Err(e) = poll_manager.local.create_path(&missing).await {
										warn!(%e, path = %missing.display(), "failed to create missing local directory for cloud-originated change");
										continue;
									}
								}
								if head.is_cloud() {
									let _ = http_submit_for_poll.send(head).await;
								} else {
									let _ = completed_tx_for_poll.send(Completed { command: head, response: None }).await;
								}
							}
							cloud.set_delta_token(token);
						}
						Err(e @ Error::Configuration(_)) => poll_manager.quarantine(cloud.cloud_id(), e.to_string()),
						Err(e) => warn!(cloud_id = cloud.cloud_id(), %e, "poll failed"),
					}
				}
				tokio::time::sleep(poll_manager.config.poll_interval).await;
			}
		});

		tokio::select! {
			_ = &mut watcher_task => {}
			_ = &mut poll_task => {}
		}

		self.shutdown();
		watcher_task.abort();
		poll_task.abort();
		cloud_relay_task.abort();
		multiplexer_task.abort();
		outbound_drain_task.abort();
		dispatcher_task.abort();
		Ok(())
	}

	pub fn shutdown(&self) {
		self.shutting_down.store(true, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::infrastructure::database::Database;
	use crate::shared::types::{EntryType, Hash};
	use crate::sync::command::{CloudDeleteCmd, CloudMoveCmd, CloudUpdateCmd, CloudUploadCmd};
	use crate::sync::dto::{FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
	use async_trait::async_trait;
	use std::path::Path;

	/// An in-memory [`CloudAdapter`] that only ever returns a fixed enumeration, for exercising
	/// initial-sync reconciliation without a real provider.
	struct FakeCloudAdapter {
		id: i32,
		files: Vec<FileRecordDto>,
		fail_auth: bool,
	}

	#[async_trait]
	impl CloudAdapter for FakeCloudAdapter {
		fn cloud_id(&self) -> i32 {
			self.id
		}
		fn build_auth_url(&self, _local_port: u16) -> String {
			String::new()
		}
		async fn exchange_auth_code(&self, _code: &str, _local_port: u16) -> Result<String> {
			Ok(String::new())
		}
		async fn refresh_access_token(&self) -> Result<()> {
			if self.fail_auth {
				Err(Error::Configuration("fake auth failure".into()))
			} else {
				Ok(())
			}
		}
		async fn ensure_root_exists(&self) -> Result<()> {
			Ok(())
		}
		async fn initial_files(&self) -> Result<Vec<crate::sync::dto::FileRecordDto>> {
			Ok(self.files.clone())
		}
		fn delta_token(&self) -> Option<String> {
			None
		}
		fn set_delta_token(&self, _token: Option<String>) {}
		async fn poll_changes(&self, _index: &Index, _enrolled_cloud_ids: &[i32], _clouds: &[Arc<dyn CloudAdapter>]) -> Result<(Vec<(Arc<Change>, Command)>, Option<String>)> {
			Ok((Vec::new(), None))
		}
		fn setup_upload_handle(&self, _handle: &mut crate::infrastructure::http::RequestHandle, _dto: &crate::sync::dto::FileRecordDto) {}
		fn setup_update_handle(&self, _handle: &mut crate::infrastructure::http::RequestHandle, _dto: &FileUpdatedDto) {}
		fn setup_download_handle(&self, _handle: &mut crate::infrastructure::http::RequestHandle, _dto: &crate::sync::dto::FileRecordDto, _staging_path: &Path) {}
		fn setup_delete_handle(&self, _handle: &mut crate::infrastructure::http::RequestHandle, _dto: &FileDeletedDto) {}
		fn setup_move_handle(&self, _handle: &mut crate::infrastructure::http::RequestHandle, _dto: &FileMovedDto) {}
		fn process_upload_response(&self, _cmd: &mut CloudUploadCmd, _response: &[u8]) -> Result<()> {
			Ok(())
		}
		fn process_update_response(&self, _cmd: &mut CloudUpdateCmd, _response: &[u8]) -> Result<()> {
			Ok(())
		}
		fn process_move_response(&self, _cmd: &mut CloudMoveCmd, _response: &[u8]) -> Result<()> {
			Ok(())
		}
		fn process_delete_response(&self, _cmd: &mut CloudDeleteCmd, _response: &[u8]) -> Result<()> {
			Ok(())
		}
		async fn create_path(&self, _missing: &Path) -> Result<Vec<crate::sync::dto::FileRecordDto>> {
			Ok(Vec::new())
		}
	}

	async fn test_manager(sync_root: std::path::PathBuf, clouds: Vec<Arc<dyn CloudAdapter>>) -> SyncManager {
		let db_dir = tempfile::tempdir().unwrap();
		let db = Database::create(&db_dir.path().join("index.db")).await.unwrap();
		std::mem::forget(db_dir);
		let index = Arc::new(Index::new(db));
		let events = Arc::new(EventBus::default());
		let local = Arc::new(LocalAdapter::new(sync_root, index.clone(), events.clone()));
		SyncManager::new(index, events, local, clouds, SyncManagerConfig { poll_interval: Duration::from_secs(60), http_concurrency: 4 })
	}

	#[tokio::test]
	async fn initial_sync_adopts_a_cloud_only_file_without_a_local_copy() {
		let root = tempfile::tempdir().unwrap();
		let cloud = Arc::new(FakeCloudAdapter {
			id: 1,
			files: vec![crate::sync::dto::FileRecordDto::cloud_new(
				1,
				EntryType::File,
				"only-on-cloud.txt".into(),
				"cloud-id-1".into(),
				"root".into(),
				10,
				100,
				Hash::Num(42),
			)],
			fail_auth: false,
		});
		let manager = test_manager(root.path().to_path_buf(), vec![cloud]).await;

		manager.run_initial_sync().await.unwrap();

		let record = manager.index.file_by_path("only-on-cloud.txt").await.unwrap();
		assert!(record.is_some(), "cloud-only file should be adopted into the index");
		assert!(manager.index.is_initial_sync_done().await.unwrap());
	}

	#[tokio::test]
	async fn initial_sync_is_a_no_op_on_a_second_run() {
		let root = tempfile::tempdir().unwrap();
		let manager = test_manager(root.path().to_path_buf(), Vec::new()).await;
		manager.run_initial_sync().await.unwrap();
		manager.run_initial_sync().await.unwrap(); // must not re-enumerate or error
		assert!(manager.index.is_initial_sync_done().await.unwrap());
	}

	#[tokio::test]
	async fn a_cloud_whose_auth_fails_during_initial_sync_is_quarantined_not_fatal() {
		let root = tempfile::tempdir().unwrap();
		let cloud = Arc::new(FakeCloudAdapter { id: 9, files: Vec::new(), fail_auth: true });
		let manager = test_manager(root.path().to_path_buf(), vec![cloud]).await;

		manager.run_initial_sync().await.unwrap();

		assert!(manager.is_quarantined(9));
		assert!(manager.enrolled_cloud_ids().is_empty());
	}

	#[tokio::test]
	async fn reinstate_clears_quarantine_and_emits_event() {
		let root = tempfile::tempdir().unwrap();
		let manager = test_manager(root.path().to_path_buf(), Vec::new()).await;
		manager.quarantine(3, "boom".into());
		assert!(manager.is_quarantined(3));
		manager.reinstate(3);
		assert!(!manager.is_quarantined(3));
	}
}

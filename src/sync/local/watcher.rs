//! Recursive filesystem watcher. Grounded on `LocalStorage.h`'s use of `wtr::watcher` (a
//! cross-platform native-events watcher); `notify`'s `RecommendedWatcher` plays the same role
//! here, each native event normalized into a [`FileEvent`] the adapter's pipeline consumes,
//! matching the original's `onFsEvent(const wtr::event&)` boundary.

use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub enum FileEvent {
	Created(PathBuf),
	Modified(PathBuf),
	Removed(PathBuf),
	/// `notify`'s rename-pair events collapse into one `Renamed { from, to }` when both halves
	/// of the pair are observed; a lone rename-half (the other side outside the watched root)
	/// degrades to `Created`/`Removed` by the caller.
	Renamed { from: PathBuf, to: PathBuf },
}

pub struct LocalWatcher {
	_inner: notify::RecommendedWatcher,
}

impl LocalWatcher {
	/// Starts watching `root` recursively; normalized events are sent on the returned channel
	/// until the watcher (and this struct) is dropped.
	pub fn spawn(root: &std::path::Path) -> crate::error::Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
		let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Result<NotifyEvent>>();
		let mut watcher = notify::recommended_watcher(move |res| {
			let _ = raw_tx.send(res);
		})
		.map_err(|e| crate::error::Error::Configuration(format!("watcher init failed: {e}")))?;

		watcher
			.watch(root, RecursiveMode::Recursive)
			.map_err(|e| crate::error::Error::Configuration(format!("watcher attach failed: {e}")))?;

		let (out_tx, out_rx) = mpsc::unbounded_channel();
		std::thread::spawn(move || {
			let mut pending_rename_from: Option<PathBuf> = None;
			while let Ok(result) = raw_rx.recv() {
				let Ok(event) = result else { continue };
				for normalized in normalize(event, &mut pending_rename_from) {
					if out_tx.send(normalized).is_err() {
						return;
					}
				}
			}
		});

		Ok((Self { _inner: watcher }, out_rx))
	}
}

fn normalize(event: NotifyEvent, pending_rename_from: &mut Option<PathBuf>) -> Vec<FileEvent> {
	use notify::event::{ModifyKind, RenameMode};

	match event.kind {
		EventKind::Create(_) => event.paths.into_iter().map(FileEvent::Created).collect(),
		EventKind::Remove(_) => event.paths.into_iter().map(FileEvent::Removed).collect(),
		EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
			if let Some(path) = event.paths.into_iter().next() {
				*pending_rename_from = Some(path);
			}
			Vec::new()
		}
		EventKind::Modify(ModifyKind::Name(RenameMode::To)) => match (pending_rename_from.take(), event.paths.into_iter().next()) {
			(Some(from), Some(to)) => vec![FileEvent::Renamed { from, to }],
			(None, Some(to)) => vec![FileEvent::Created(to)],
			_ => Vec::new(),
		},
		EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
			let mut paths = event.paths.into_iter();
			match (paths.next(), paths.next()) {
				(Some(from), Some(to)) => vec![FileEvent::Renamed { from, to }],
				_ => Vec::new(),
			}
		}
		EventKind::Modify(_) => event.paths.into_iter().map(FileEvent::Modified).collect(),
		_ => Vec::new(),
	}
}

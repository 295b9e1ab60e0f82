//! A multi-cloud file synchronization engine: one local directory kept in sync with any
//! number of enrolled cloud storage providers through a single index keyed by a logical
//! `global_id` that spans every endpoint.

pub mod config;
pub mod error;
pub mod infrastructure;
pub mod shared;
pub mod sync;

use crate::config::BootstrapConfig;
use crate::error::Result;
use crate::infrastructure::database::{Database, Index};
use crate::infrastructure::events::EventBus;
use crate::sync::cloud::drive_style::{DriveStyleAdapter, DriveStyleConfig};
use crate::sync::cloud::dropbox_style::{DropboxStyleAdapter, DropboxStyleConfig};
use crate::sync::cloud::CloudAdapter;
use crate::sync::local::LocalAdapter;
use crate::sync::manager::{SyncManager, SyncManagerConfig};
use std::sync::Arc;
use std::time::Duration;

/// Builds a fully-wired [`SyncManager`] from a [`BootstrapConfig`]: construction does I/O (opens
/// the database, constructs provider adapters) but starts nothing — the caller decides when to
/// run initial sync and the daemon.
pub async fn build(config: BootstrapConfig) -> Result<Arc<SyncManager>> {
	let db = Database::open_or_create(&config.db_path).await?;
	let index = Arc::new(Index::new(db));
	let events = Arc::new(EventBus::default());
	let local = Arc::new(LocalAdapter::new(config.sync_root.clone(), index.clone(), events.clone()));

	let mut clouds: Vec<Arc<dyn CloudAdapter>> = Vec::new();
	for (i, entry) in config.clouds.iter().enumerate() {
		let cloud_id = (i + 1) as i32;
		let adapter: Arc<dyn CloudAdapter> = match entry.kind.as_str() {
			"drive" => Arc::new(DriveStyleAdapter::new(
				DriveStyleConfig {
					cloud_id,
					client_id: String::new(),
					client_secret: String::new(),
					api_base: "https://www.googleapis.com/drive/v3".to_string(),
					auth_base: "https://oauth2.googleapis.com".to_string(),
				},
				Some(entry.config_data.clone()),
				None,
			)),
			"dropbox" => Arc::new(DropboxStyleAdapter::new(
				DropboxStyleConfig { cloud_id, app_key: String::new(), app_secret: String::new(), api_base: "https://api.dropboxapi.com".to_string() },
				Some(entry.config_data.clone()),
				None,
			)),
			other => return Err(crate::error::Error::Configuration(format!("unknown cloud kind {other:?} for {:?}", entry.name))),
		};
		clouds.push(adapter);
	}

	Ok(Arc::new(SyncManager::new(
		index,
		events,
		local,
		clouds,
		SyncManagerConfig { poll_interval: Duration::from_secs(config.poll_interval_secs), http_concurrency: config.http_concurrency },
	)))
}

//! Cloud storage adapters (C9). Grounded on `examples/original_source/include/BaseStorage.h`
//! (the common interface every provider implements) and `google.h`/`dropbox.h` for the two
//! concrete provider shapes: parent-id addressed (Drive-like) versus path-addressed
//! (Dropbox-like). Wire formats are provider-specific and out of scope; these
//! adapters are structurally complete against the trait and exercised by the sync manager, but
//! each provider's actual request/response schema is abstracted behind `reqwest` calls a real
//! implementation would fill in.

pub mod drive_style;
pub mod dropbox_style;
pub mod normalize;
pub mod wake;

use crate::error::Result;
use crate::infrastructure::database::Index;
use crate::infrastructure::http::RequestHandle;
use crate::sync::change::Change;
use crate::sync::command::{Command, CloudDeleteCmd, CloudMoveCmd, CloudUpdateCmd, CloudUploadCmd};
use crate::sync::dto::{FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Looks up the adapter for `cloud_id` and lets it fill in provider-specific headers/body on an
/// otherwise-bare handle; a cloud absent from `clouds` (shouldn't happen — callers pass the
/// enrolled set) just gets the bare handle back.
pub fn cloud_handle<D>(clouds: &[Arc<dyn CloudAdapter>], method: reqwest::Method, cloud_id: i32, dto: &D, setup: impl Fn(&dyn CloudAdapter, &mut RequestHandle, &D)) -> RequestHandle {
	let mut handle = RequestHandle::new(method, "");
	if let Some(adapter) = clouds.iter().find(|c| c.cloud_id() == cloud_id) {
		setup(adapter.as_ref(), &mut handle, dto);
	}
	handle
}

/// Everything the sync manager needs from one enrolled cloud endpoint. One instance per
/// `cloud_configs` row.
#[async_trait]
pub trait CloudAdapter: Send + Sync {
	fn cloud_id(&self) -> i32;

	/// Builds the request for a not-yet-authenticated adapter's OAuth authorization step.
	fn build_auth_url(&self, local_port: u16) -> String;

	/// Exchanges an authorization code for a refresh token (first-run enrollment).
	async fn exchange_auth_code(&self, code: &str, local_port: u16) -> Result<String>;

	/// Refreshes the short-lived access token; called proactively before expiry and reactively
	/// on a 401.
	async fn refresh_access_token(&self) -> Result<()>;

	/// Verifies the provider-side sync root exists, creating it if this is first enrollment.
	async fn ensure_root_exists(&self) -> Result<()>;

	/// Full enumeration used once, during initial sync reconciliation.
	async fn initial_files(&self) -> Result<Vec<FileRecordDto>>;

	/// Opaque cursor identifying "everything since here"; persisted in `cloud_configs.config_data`.
	fn delta_token(&self) -> Option<String>;

	/// Advances the in-memory cursor after a successful poll, mirroring how
	/// `refresh_access_token` swaps in a new access token: the adapter's own state is the source
	/// of truth for the next call, not a value threaded back in by the caller.
	fn set_delta_token(&self, token: Option<String>);

	/// Polls the provider's delta/changes endpoint since the last token, normalizes the page into
	/// dispatchable (Change, Command) pairs — classification, deferred-parent resolution, and
	/// Move/Update/Delete combination all live in [`normalize::normalize_delta_page`], which is
	/// the same regardless of provider — and returns the new token to persist.
	async fn poll_changes(&self, index: &Index, enrolled_cloud_ids: &[i32], clouds: &[Arc<dyn CloudAdapter>]) -> Result<(Vec<(Arc<Change>, Command)>, Option<String>)>;

	/// Fills in a handle for uploading a brand-new file.
	fn setup_upload_handle(&self, handle: &mut RequestHandle, dto: &FileRecordDto);
	/// Fills in a handle for pushing updated content to an existing cloud file.
	fn setup_update_handle(&self, handle: &mut RequestHandle, dto: &FileUpdatedDto);
	/// Fills in a handle to download a file's bytes to `staging_path`.
	fn setup_download_handle(&self, handle: &mut RequestHandle, dto: &FileRecordDto, staging_path: &Path);
	fn setup_delete_handle(&self, handle: &mut RequestHandle, dto: &FileDeletedDto);
	fn setup_move_handle(&self, handle: &mut RequestHandle, dto: &FileMovedDto);

	/// Parses an upload response and fills in the cloud-assigned id(s) on the dto.
	fn process_upload_response(&self, cmd: &mut CloudUploadCmd, response: &[u8]) -> Result<()>;
	fn process_update_response(&self, cmd: &mut CloudUpdateCmd, response: &[u8]) -> Result<()>;
	fn process_move_response(&self, cmd: &mut CloudMoveCmd, response: &[u8]) -> Result<()>;
	fn process_delete_response(&self, cmd: &mut CloudDeleteCmd, response: &[u8]) -> Result<()>;

	/// Creates the provider-side ancestor directories for `missing`, returning the
	/// newly-created directory records so the index can learn their cloud ids.
	async fn create_path(&self, missing: &Path) -> Result<Vec<FileRecordDto>>;
}

//! A path-addressed provider adapter (grounded on `dropbox.h`): entries are located by their
//! full path string rather than a parent-id chain, and deltas are served against a single
//! opaque cursor from a `list_folder/continue`-style endpoint.

use super::CloudAdapter;
use crate::error::{Error, Result};
use crate::infrastructure::database::Index;
use crate::infrastructure::http::RequestHandle;
use crate::shared::types::{ChangeType, EntryType, Hash};
use crate::sync::change::Change;
use crate::sync::command::{Command, CloudDeleteCmd, CloudMoveCmd, CloudUpdateCmd, CloudUploadCmd};
use crate::sync::dto::{DeltaEntry, FileDeletedDto, FileMovedDto, FileRecordDto, FileUpdatedDto};
use crate::sync::expected_events::ExpectedEventsRegistry;
use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, RwLock};

pub struct DropboxStyleConfig {
	pub cloud_id: i32,
	pub app_key: String,
	pub app_secret: String,
	pub api_base: String,
}

pub struct DropboxStyleAdapter {
	config: DropboxStyleConfig,
	client: reqwest::Client,
	access_token: RwLock<Option<String>>,
	refresh_token: RwLock<Option<String>>,
	cursor: RwLock<Option<String>>,
	expected: ExpectedEventsRegistry,
}

impl DropboxStyleAdapter {
	pub fn new(config: DropboxStyleConfig, refresh_token: Option<String>, cursor: Option<String>) -> Self {
		Self { config, client: reqwest::Client::new(), access_token: RwLock::new(None), refresh_token: RwLock::new(refresh_token), cursor: RwLock::new(cursor), expected: ExpectedEventsRegistry::new() }
	}

	/// Path-addressed entries carry no stable parent id the way Drive's do; the entry's own
	/// containing directory (its path minus the last component) stands in for one, so the
	/// normalization pass's parent-readiness check still has something to key on.
	fn parse_delta_entry(&self, raw: &serde_json::Value) -> Option<DeltaEntry> {
		let path = raw["path_display"].as_str()?;
		let rel_path = path.trim_start_matches('/').to_string();
		let parent = Path::new(&rel_path).parent().map(|p| p.to_string_lossy().into_owned()).filter(|p| !p.is_empty()).unwrap_or_default();
		if raw[".tag"].as_str() == Some("deleted") {
			return Some(DeltaEntry { cloud_file_id: path.to_string(), cloud_parent_id: parent, rel_path, kind: EntryType::File, size: 0, modified_time: 0, hash: Hash::Str(String::new()), trashed: true });
		}
		let is_dir = raw[".tag"].as_str() == Some("folder");
		let hash = raw["content_hash"].as_str().map(|h| Hash::Str(h.to_string())).unwrap_or(Hash::Str(String::new()));
		Some(DeltaEntry {
			cloud_file_id: path.to_string(),
			cloud_parent_id: parent,
			rel_path,
			kind: if is_dir { EntryType::Directory } else { EntryType::File },
			size: raw["size"].as_u64().unwrap_or(0),
			modified_time: 0,
			hash,
			trashed: false,
		})
	}

	fn bearer(&self) -> Result<String> {
		self.access_token
			.read()
			.expect("lock poisoned")
			.clone()
			.ok_or_else(|| Error::Configuration("dropbox adapter has no access token; refresh_access_token() first".into()))
	}
}

#[async_trait]
impl CloudAdapter for DropboxStyleAdapter {
	fn cloud_id(&self) -> i32 {
		self.config.cloud_id
	}

	fn build_auth_url(&self, local_port: u16) -> String {
		format!("https://www.dropbox.com/oauth2/authorize?client_id={}&redirect_uri=http://localhost:{}/callback&response_type=code&token_access_type=offline", self.config.app_key, local_port)
	}

	async fn exchange_auth_code(&self, code: &str, local_port: u16) -> Result<String> {
		let resp = self
			.client
			.post("https://api.dropboxapi.com/oauth2/token")
			.form(&[
				("code", code),
				("client_id", &self.config.app_key),
				("client_secret", &self.config.app_secret),
				("redirect_uri", &format!("http://localhost:{local_port}/callback")),
				("grant_type", "authorization_code"),
			])
			.send()
			.await
			.map_err(|e| Error::transient(e.to_string()))?;
		let body: serde_json::Value = resp.json().await.map_err(|e| Error::Protocol(e.to_string()))?;
		let refresh = body["refresh_token"].as_str().ok_or_else(|| Error::Protocol("token exchange response missing refresh_token".into()))?.to_string();
		*self.refresh_token.write().expect("lock poisoned") = Some(refresh.clone());
		Ok(refresh)
	}

	async fn refresh_access_token(&self) -> Result<()> {
		let refresh_token = self.refresh_token.read().expect("lock poisoned").clone().ok_or_else(|| Error::Configuration("dropbox adapter not enrolled".into()))?;
		let resp = self
			.client
			.post("https://api.dropboxapi.com/oauth2/token")
			.form(&[("refresh_token", refresh_token.as_str()), ("client_id", &self.config.app_key), ("client_secret", &self.config.app_secret), ("grant_type", "refresh_token")])
			.send()
			.await
			.map_err(|e| Error::transient(e.to_string()))?;
		let body: serde_json::Value = resp.json().await.map_err(|e| Error::Protocol(e.to_string()))?;
		let token = body["access_token"].as_str().ok_or_else(|| Error::Protocol("refresh response missing access_token".into()))?.to_string();
		*self.access_token.write().expect("lock poisoned") = Some(token);
		Ok(())
	}

	async fn ensure_root_exists(&self) -> Result<()> {
		Ok(()) // the app folder always exists once the app is authorized; nothing to create
	}

	async fn initial_files(&self) -> Result<Vec<FileRecordDto>> {
		let bearer = self.bearer()?;
		let resp = self
			.client
			.post(format!("{}/2/files/list_folder", self.config.api_base))
			.bearer_auth(bearer)
			.json(&serde_json::json!({ "path": "", "recursive": true }))
			.send()
			.await
			.map_err(|e| Error::transient(e.to_string()))?;
		let body: serde_json::Value = resp.json().await.map_err(|e| Error::Protocol(e.to_string()))?;
		let mut out = Vec::new();
		for entry in body["entries"].as_array().into_iter().flatten() {
			let Some(path) = entry["path_display"].as_str() else { continue };
			let is_dir = entry[".tag"].as_str() == Some("folder");
			let hash = entry["content_hash"].as_str().map(|h| Hash::Str(h.to_string())).unwrap_or(Hash::Str(String::new()));
			out.push(FileRecordDto::cloud_new(
				self.config.cloud_id,
				if is_dir { EntryType::Directory } else { EntryType::File },
				path.trim_start_matches('/').to_string(),
				path.to_string(),
				String::new(),
				entry["size"].as_u64().unwrap_or(0),
				0,
				hash,
			));
		}
		Ok(out)
	}

	fn delta_token(&self) -> Option<String> {
		self.cursor.read().expect("lock poisoned").clone()
	}

	fn set_delta_token(&self, token: Option<String>) {
		*self.cursor.write().expect("lock poisoned") = token;
	}

	async fn poll_changes(&self, index: &Index, enrolled_cloud_ids: &[i32], clouds: &[Arc<dyn CloudAdapter>]) -> Result<(Vec<(Arc<Change>, Command)>, Option<String>)> {
		let bearer = self.bearer()?;
		let Some(cursor) = self.delta_token() else {
			return Ok((Vec::new(), None)); // no starting cursor yet; initial sync assigns one
		};
		let resp = self
			.client
			.post(format!("{}/2/files/list_folder/continue", self.config.api_base))
			.bearer_auth(bearer)
			.json(&serde_json::json!({ "cursor": cursor }))
			.send()
			.await
			.map_err(|e| Error::transient(e.to_string()))?;
		let body: serde_json::Value = resp.json().await.map_err(|e| Error::Protocol(e.to_string()))?;
		let entries: Vec<DeltaEntry> = body["entries"].as_array().into_iter().flatten().filter_map(|raw| self.parse_delta_entry(raw)).collect();
		let next_token = body["cursor"].as_str().map(str::to_string);

		let pairs = super::normalize::normalize_delta_page(entries, self.config.cloud_id, index, &self.expected, enrolled_cloud_ids, clouds).await?;
		Ok((pairs, next_token))
	}

	fn setup_upload_handle(&self, handle: &mut RequestHandle, dto: &FileRecordDto) {
		self.expected.add(dto.rel_path.clone(), ChangeType::New);
		handle.add_header("Dropbox-API-Arg", format!("{{\"path\":\"/{}\",\"mode\":\"add\"}}", dto.rel_path));
		handle.add_header("Content-Type", "application/octet-stream");
		if let Some(path) = &dto.local_path {
			handle.body = crate::infrastructure::http::BodySource::File(path.clone());
		}
	}

	fn setup_update_handle(&self, handle: &mut RequestHandle, dto: &FileUpdatedDto) {
		if let Some(id) = &dto.cloud_file_id {
			self.expected.add(id.clone(), ChangeType::Update);
		}
		handle.add_header("Dropbox-API-Arg", format!("{{\"path\":\"/{}\",\"mode\":\"overwrite\"}}", dto.rel_path));
		handle.add_header("Content-Type", "application/octet-stream");
		if let Some(path) = &dto.local_path {
			handle.body = crate::infrastructure::http::BodySource::File(path.clone());
		}
	}

	fn setup_download_handle(&self, handle: &mut RequestHandle, dto: &FileRecordDto, staging_path: &Path) {
		handle.add_header("Dropbox-API-Arg", format!("{{\"path\":\"/{}\"}}", dto.rel_path));
		handle.stream_response_to_file(staging_path.to_path_buf());
	}

	fn setup_delete_handle(&self, handle: &mut RequestHandle, dto: &FileDeletedDto) {
		if let Some(id) = &dto.cloud_file_id {
			self.expected.add(id.clone(), ChangeType::Delete);
		}
		handle.add_header("Content-Type", "application/json");
	}

	fn setup_move_handle(&self, handle: &mut RequestHandle, dto: &FileMovedDto) {
		if let Some(id) = &dto.cloud_file_id {
			self.expected.add(id.clone(), ChangeType::Move);
		}
		handle.add_header("Content-Type", "application/json");
	}

	fn process_upload_response(&self, cmd: &mut CloudUploadCmd, response: &[u8]) -> Result<()> {
		let body: serde_json::Value = serde_json::from_slice(response)?;
		cmd.dto.cloud_file_id = body["path_display"].as_str().map(str::to_string);
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

	async fn create_path(&self, missing: &Path) -> Result<Vec<FileRecordDto>> {
		let bearer = self.bearer()?;
		let path = format!("/{}", missing.to_string_lossy());
		self.client
			.post(format!("{}/2/files/create_folder_v2", self.config.api_base))
			.bearer_auth(bearer)
			.json(&serde_json::json!({ "path": path }))
			.send()
			.await
			.map_err(|e| Error::transient(e.to_string()))?;
		Ok(vec![FileRecordDto::cloud_new(self.config.cloud_id, EntryType::Directory, missing.to_string_lossy().into_owned(), path, String::new(), 0, 0, Hash::Str(String::new()))])
	}
}

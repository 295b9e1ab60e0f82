use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_poll_interval_secs() -> u64 {
	60
}

fn default_http_concurrency() -> usize {
	120
}

/// One cloud to enroll, as given at process start. `config_data` is opaque to
/// the bootstrap layer — it is handed verbatim to the matching provider adapter, typically
/// containing a pre-obtained refresh token since the interactive OAuth wizard is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudBootstrapEntry {
	pub name: String,
	pub kind: String,
	pub config_data: String,
}

/// The JSON file read once at process start (`load`/`load_from`/`default_with_dir`/
/// `ensure_directories`); deserialization failure is a [`Error::Configuration`] raised before
/// any daemon thread starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
	pub sync_root: PathBuf,
	pub db_path: PathBuf,
	#[serde(default)]
	pub clouds: Vec<CloudBootstrapEntry>,
	#[serde(default = "default_poll_interval_secs")]
	pub poll_interval_secs: u64,
	#[serde(default = "default_http_concurrency")]
	pub http_concurrency: usize,
}

impl BootstrapConfig {
	pub fn load_from(path: &Path) -> Result<Self> {
		let text = std::fs::read_to_string(path).map_err(|e| Error::filesystem(path, e))?;
		let config: BootstrapConfig = serde_json::from_str(&text)?;
		config.validate()?;
		Ok(config)
	}

	fn validate(&self) -> Result<()> {
		if self.poll_interval_secs == 0 {
			return Err(Error::Configuration("poll_interval_secs must be non-zero".into()));
		}
		if self.http_concurrency == 0 {
			return Err(Error::Configuration("http_concurrency must be non-zero".into()));
		}
		let mut seen = std::collections::HashSet::new();
		for cloud in &self.clouds {
			if !seen.insert(cloud.name.as_str()) {
				return Err(Error::Configuration(format!("duplicate cloud name {:?}", cloud.name)));
			}
		}
		Ok(())
	}

	pub fn default_config_path() -> Result<PathBuf> {
		let dir = dirs::config_dir().ok_or_else(|| Error::Configuration("could not determine platform config directory".into()))?;
		Ok(dir.join("sync-core").join("config.json"))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_zero_poll_interval() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"sync_root":"/tmp/x","db_path":"/tmp/x.db","poll_interval_secs":0}"#).unwrap();
		assert!(BootstrapConfig::load_from(&path).is_err());
	}

	#[test]
	fn defaults_fill_in_missing_optional_fields() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(&path, r#"{"sync_root":"/tmp/x","db_path":"/tmp/x.db"}"#).unwrap();
		let config = BootstrapConfig::load_from(&path).unwrap();
		assert_eq!(config.poll_interval_secs, 60);
		assert_eq!(config.http_concurrency, 120);
		assert!(config.clouds.is_empty());
	}

	#[test]
	fn rejects_duplicate_cloud_names() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("config.json");
		std::fs::write(
			&path,
			r#"{"sync_root":"/tmp/x","db_path":"/tmp/x.db","clouds":[{"name":"a","kind":"drive","config_data":""},{"name":"a","kind":"dropbox","config_data":""}]}"#,
		)
		.unwrap();
		assert!(BootstrapConfig::load_from(&path).is_err());
	}
}

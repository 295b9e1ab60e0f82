//! Path normalization and editor/atomic-save tmp-name classification (step 3).

use std::path::{Component, Path, PathBuf};

const TMP_PREFIXES: &[&str] = &[".-tmp-SyncHarbor-", ".goutputstream-", ".kate-swp", ".#", ".~lock."];
const TMP_SUFFIXES: &[&str] = &[".swp", ".swo", ".swx", ".tmp", ".temp", ".bak", ".orig", "~"];

/// The staging prefix this engine's own downloads and atomic updates write under; listed
/// verbatim in [`TMP_PREFIXES`] so the resulting watcher events are suppressed like any other
/// editor tmp file.
pub const DOWNLOAD_STAGING_PREFIX: &str = ".-tmp-SyncHarbor-";

/// True if `name` (a bare filename, not a path) matches a known editor or transfer staging
/// pattern by prefix or suffix.
pub fn is_tmp_name(name: &str) -> bool {
	TMP_PREFIXES.iter().any(|p| name.starts_with(p)) || TMP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Builds the sibling staging path this engine downloads into before an atomic rename.
pub fn staging_path_for(target: &Path) -> PathBuf {
	let file_name = target.file_name().and_then(|n| n.to_str()).unwrap_or_default();
	target.with_file_name(format!("{DOWNLOAD_STAGING_PREFIX}{file_name}"))
}

/// Normalizes a path to POSIX-style forward-slash separators relative to `root`, with no
/// leading slash and no trailing slash, matching the `rel_path` convention used throughout the
/// index and the cloud provider contract.
pub fn normalize_rel_path(root: &Path, absolute: &Path) -> Option<String> {
	let rel = absolute.strip_prefix(root).ok()?;
	if rel.as_os_str().is_empty() {
		return None;
	}
	let mut parts = Vec::new();
	for component in rel.components() {
		match component {
			Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
			Component::CurDir => {}
			_ => return None,
		}
	}
	if parts.is_empty() {
		return None;
	}
	Some(parts.join("/"))
}

/// True for the degenerate relative paths the normalization pipeline must drop outright
/// (empty string or `.`).
pub fn is_degenerate_rel_path(rel_path: &str) -> bool {
	rel_path.is_empty() || rel_path == "."
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classifies_known_prefixes_and_suffixes() {
		assert!(is_tmp_name(".-tmp-SyncHarbor-report.docx"));
		assert!(is_tmp_name(".goutputstream-XYZ123"));
		assert!(is_tmp_name("notes.txt.swp"));
		assert!(is_tmp_name("report.docx~"));
		assert!(!is_tmp_name("report.docx"));
	}

	#[test]
	fn normalizes_nested_path_to_posix_form() {
		let root = Path::new("/sync/root");
		let abs = Path::new("/sync/root/dir1/dir2/file.txt");
		assert_eq!(normalize_rel_path(root, abs).as_deref(), Some("dir1/dir2/file.txt"));
	}

	#[test]
	fn rejects_root_itself() {
		let root = Path::new("/sync/root");
		assert_eq!(normalize_rel_path(root, root), None);
	}

	#[test]
	fn staging_path_keeps_directory_and_prefixes_filename() {
		let target = Path::new("/sync/root/dir/report.docx");
		let staging = staging_path_for(target);
		assert_eq!(staging, Path::new("/sync/root/dir/.-tmp-SyncHarbor-report.docx"));
	}

	#[test]
	fn degenerate_rel_paths_are_flagged() {
		assert!(is_degenerate_rel_path(""));
		assert!(is_degenerate_rel_path("."));
		assert!(!is_degenerate_rel_path("a"));
	}
}
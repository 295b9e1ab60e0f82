//! Shared enums and the `Hash` tagged union, used by the index, the DTOs, and both adapters.

use serde::{Deserialize, Serialize};

/// What kind of filesystem entry a `FileRecord` describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
pub enum EntryType {
	File,
	Directory,
	/// A provider's "online-only" document type (e.g. a native word-processor doc with no
	/// native file bytes); fetched through an export endpoint producing a concrete format.
	Document,
}

/// The logical mutation kind. Precedence for same-batch conflict resolution is
/// `Delete > Move > Update > New`, reflected by this enum's declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
	New,
	Update,
	Move,
	Delete,
}

impl ChangeType {
	/// Precedence rank used when two Changes in the same batch target the same path;
	/// higher wins.
	pub fn precedence(self) -> u8 {
		match self {
			ChangeType::Delete => 3,
			ChangeType::Move => 2,
			ChangeType::Update => 1,
			ChangeType::New => 0,
		}
	}
}

/// A provider's content hash is either a string digest or a 64-bit integer, depending on
/// endpoint; equality is strictly by variant (a `Str` never equals a `Num` even if their
/// textual forms coincide). See "Hash variant".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Hash {
	Str(String),
	Num(u64),
}

impl Hash {
	/// Round-trip to the single TEXT column `file_links.cloud_hash_check_sum` stores both
	/// variants in: numeric hashes are serialized as decimal text and parsed back greedily.
	pub fn to_column(&self) -> String {
		match self {
			Hash::Str(s) => s.clone(),
			Hash::Num(n) => n.to_string(),
		}
	}

	/// Inverse of [`Hash::to_column`]. Since the column has no type tag, a value that parses
	/// as a plain `u64` is always reconstructed as `Num`; this matches the source's own
	/// adapters, which never emit numeric-looking string hashes for a provider that hashes
	/// with `Str`.
	pub fn from_column(raw: &str) -> Self {
		match raw.parse::<u64>() {
			Ok(n) => Hash::Num(n),
			Err(_) => Hash::Str(raw.to_string()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hash_variant_equality_is_strict() {
		assert_ne!(Hash::Str("42".to_string()), Hash::Num(42));
		assert_eq!(Hash::Num(42), Hash::Num(42));
	}

	#[test]
	fn hash_column_round_trip_numeric() {
		let h = Hash::Num(123456789);
		assert_eq!(Hash::from_column(&h.to_column()), h);
	}

	#[test]
	fn hash_column_round_trip_string() {
		let h = Hash::Str("md5:abcdef".to_string());
		assert_eq!(Hash::from_column(&h.to_column()), h);
	}

	#[test]
	fn change_type_precedence_orders_delete_highest() {
		assert!(ChangeType::Delete.precedence() > ChangeType::Move.precedence());
		assert!(ChangeType::Move.precedence() > ChangeType::Update.precedence());
		assert!(ChangeType::Update.precedence() > ChangeType::New.precedence());
	}
}

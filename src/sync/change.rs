//! A Change (C6): one logical mutation (New/Update/Move/Delete) fanned out into a chain of
//! per-endpoint Commands. Grounded on `examples/original_source/include/change.h`'s atomic
//! pending-counter design — the original used a `std::atomic<int>` decremented by each
//! command's callback; here that becomes `AtomicU32` guarded the same way.

use crate::shared::types::ChangeType;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Owns the commands belonging to one logical mutation and tracks how many are still
/// in flight. When `pending` reaches zero the change is complete and `global_id`/`change_type`
/// are reported to the event bus by the callback dispatcher.
pub struct Change {
	pub global_id: i32,
	pub change_type: ChangeType,
	/// Display path for logging/events; the *target* of the head command, not necessarily
	/// any single command's path once a move is involved.
	pub target_path: String,
	pending: AtomicU32,
}

impl Change {
	pub fn new(global_id: i32, change_type: ChangeType, target_path: String, link_count: u32) -> Arc<Self> {
		Arc::new(Self {
			global_id,
			change_type,
			target_path,
			pending: AtomicU32::new(link_count),
		})
	}

	/// Called once per completed command in this change's chain. Returns `true` exactly once,
	/// the time the counter reaches zero — the caller uses that to emit `Event::ChangeCompleted`.
	pub fn link_completed(&self) -> bool {
		self.pending.fetch_sub(1, Ordering::AcqRel) == 1
	}

	pub fn pending_count(&self) -> u32 {
		self.pending.load(Ordering::Acquire)
	}
}

/// A weak back-reference a Command holds to its owning Change, mirroring the original's
/// raw back-pointer (never owns; the Change owns the chain, not the reverse).
pub type ChangeRef = Weak<Change>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn link_completed_returns_true_only_on_final_link() {
		let change = Change::new(1, ChangeType::New, "a/b.txt".into(), 3);
		assert!(!change.link_completed());
		assert_eq!(change.pending_count(), 2);
		assert!(!change.link_completed());
		assert_eq!(change.pending_count(), 1);
		assert!(change.link_completed());
		assert_eq!(change.pending_count(), 0);
	}

	#[test]
	fn single_link_change_completes_immediately() {
		let change = Change::new(1, ChangeType::Delete, "a/b.txt".into(), 1);
		assert!(change.link_completed());
	}

	#[test]
	fn change_ref_upgrades_while_change_is_alive_and_fails_once_dropped() {
		let change = Change::new(1, ChangeType::Update, "a/b.txt".into(), 1);
		let weak: ChangeRef = Arc::downgrade(&change);
		assert!(weak.upgrade().is_some());
		drop(change);
		assert!(weak.upgrade().is_none());
	}
}

//! Self-echo suppression (C7). Before an adapter mutates its own endpoint on behalf of a
//! Change, it registers the mutation here; when the resulting filesystem/API notification
//! arrives, the adapter checks-and-clears instead of generating a redundant Change. Grounded on
//! `examples/original_source/include/ExpectedEventsRegistry.h` (there, one registry instance
//! per `BaseStorage`; the same shape applies here, one per adapter).

use crate::shared::types::ChangeType;
use std::collections::HashMap;
use std::sync::Mutex;

/// Keyed by whatever the adapter considers a stable per-entry identity: a relative path for
/// the local adapter, a cloud file id for cloud adapters.
#[derive(Default)]
pub struct ExpectedEventsRegistry {
	inner: Mutex<HashMap<String, ChangeType>>,
}

impl ExpectedEventsRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Call before performing a mutation that will itself be observed as a native event.
	pub fn add(&self, key: impl Into<String>, change_type: ChangeType) {
		let mut guard = self.inner.lock().expect("expected-events mutex poisoned");
		guard.insert(key.into(), change_type);
	}

	/// Call when a native event arrives. Returns `true` (and clears the entry) iff it matches
	/// an expectation registered by [`Self::add`] — the adapter should then drop the event
	/// instead of turning it into a new Change.
	pub fn check_and_clear(&self, key: &str, change_type: ChangeType) -> bool {
		let mut guard = self.inner.lock().expect("expected-events mutex poisoned");
		match guard.get(key) {
			Some(expected) if *expected == change_type => {
				guard.remove(key);
				true
			}
			_ => false,
		}
	}

	/// Periodic maintenance: entries older than one poll cycle with no matching
	/// native event indicate the adapter's own write never got echoed back (e.g. the watcher
	/// coalesced it away) and would otherwise leak forever. Called by the owning adapter on a
	/// timer; snapshots and clears everything outstanding.
	pub fn snapshot_and_clear(&self) -> HashMap<String, ChangeType> {
		let mut guard = self.inner.lock().expect("expected-events mutex poisoned");
		std::mem::take(&mut *guard)
	}

	pub fn len(&self) -> usize {
		self.inner.lock().expect("expected-events mutex poisoned").len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matching_event_is_consumed_once() {
		let registry = ExpectedEventsRegistry::new();
		registry.add("a/b.txt", ChangeType::Update);
		assert!(registry.check_and_clear("a/b.txt", ChangeType::Update));
		assert!(!registry.check_and_clear("a/b.txt", ChangeType::Update));
	}

	#[test]
	fn mismatched_change_type_does_not_consume() {
		let registry = ExpectedEventsRegistry::new();
		registry.add("a/b.txt", ChangeType::Update);
		assert!(!registry.check_and_clear("a/b.txt", ChangeType::New));
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn snapshot_and_clear_drains_registry() {
		let registry = ExpectedEventsRegistry::new();
		registry.add("a/b.txt", ChangeType::New);
		registry.add("c/d.txt", ChangeType::Delete);
		let snap = registry.snapshot_and_clear();
		assert_eq!(snap.len(), 2);
		assert!(registry.is_empty());
	}
}

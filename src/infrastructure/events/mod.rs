//! Event bus for decoupled observation of the sync engine's lifecycle (C14). Purely an
//! observation channel — no component's correctness depends on a subscriber existing or
//! keeping up.

use tokio::sync::broadcast;

/// Lifecycle events emitted as changes are queued, completed, or fail, and as clouds are
/// quarantined or reinstated.
#[derive(Debug, Clone)]
pub enum Event {
	InitialSyncStarted,
	InitialSyncCompleted,

	ChangeQueued {
		target_path: String,
		change_type: crate::shared::types::ChangeType,
	},

	ChangeCompleted {
		global_id: i32,
		change_type: crate::shared::types::ChangeType,
	},

	ChangeFailed {
		target_path: String,
		reason: String,
	},

	CloudQuarantined {
		cloud_id: i32,
		reason: String,
	},

	CloudReinstated {
		cloud_id: i32,
	},
}

/// Broadcasts [`Event`]s to any number of subscribers.
pub struct EventBus {
	sender: broadcast::Sender<Event>,
}

impl EventBus {
	/// Create a new event bus with specified capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	/// Emit an event. Never blocks; ignored if there are no receivers.
	pub fn emit(&self, event: Event) {
		let _ = self.sender.send(event);
	}

	/// Subscribe to events.
	pub fn subscribe(&self) -> broadcast::Receiver<Event> {
		self.sender.subscribe()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(1024)
	}
}

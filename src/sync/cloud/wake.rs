//! Token-refresh wake signal. The poll loop normally sleeps
//! between cycles; a 401 on any in-flight request needs to interrupt that sleep immediately so
//! the affected adapter can refresh its token and retry, rather than waiting out the rest of
//! the poll interval. Grounded on the original's `RawSignal`/`anyStorageHasRaw`-style
//! wake primitive, translated into a `tokio::sync::Notify`.

use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct WakeSignal(Arc<Notify>);

impl WakeSignal {
	pub fn new() -> Self {
		Self(Arc::new(Notify::new()))
	}

	/// Called by an adapter when it needs the poll loop to stop sleeping right now.
	pub fn wake(&self) {
		self.0.notify_one();
	}

	/// Resolves either when woken or when `duration` elapses, whichever comes first —
	/// the poll loop's sleep primitive.
	pub async fn wait_or_timeout(&self, duration: std::time::Duration) {
		tokio::select! {
			_ = self.0.notified() => {}
			_ = tokio::time::sleep(duration) => {}
		}
	}
}

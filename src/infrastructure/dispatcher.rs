//! Callback dispatcher (C4): the single task that owns every database write. Consumes
//! completed Commands, applies their mutation, propagates DTO fields along the chain, and
//! re-enqueues next-link commands on the correct executor. No single original-source file
//! owns this role directly; closest analogue is the single-writer discipline implied by
//! `database.h` plus `command.h`'s `completionCallback` contract.

use crate::infrastructure::database::Index;
use crate::infrastructure::events::{Event, EventBus};
use crate::sync::cloud::CloudAdapter;
use crate::sync::command::{Command, Completion};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info};

/// A completed Command plus the raw bytes its HTTP response carried (empty for local
/// commands, which never go through the multiplexer).
pub struct Completed {
	pub command: Command,
	pub response: Option<bytes::Bytes>,
}

pub struct CallbackDispatcher {
	index: Arc<Index>,
	events: Arc<EventBus>,
	/// Guarantees total write ordering: every mutation this task performs holds this mutex
	/// for the duration of one Command's `completionCallback`.
	write_lock: Mutex<()>,
	inbound_tx: mpsc::Sender<Completed>,
	inbound_rx: Mutex<Option<mpsc::Receiver<Completed>>>,
	to_cloud_tx: mpsc::Sender<Command>,
	/// Looked up by cloud id so a Cloud* command's response can be parsed by the adapter that
	/// actually speaks that provider's wire format.
	clouds: Vec<Arc<dyn CloudAdapter>>,
}

impl CallbackDispatcher {
	/// `to_cloud_tx` feeds the HTTP multiplexer. A local next-link has no network step, so
	/// "dispatching" it means completing it immediately — it is fed straight back into this
	/// dispatcher's own inbound queue rather than through a separate executor.
	pub fn new(index: Arc<Index>, events: Arc<EventBus>, to_cloud_tx: mpsc::Sender<Command>, clouds: Vec<Arc<dyn CloudAdapter>>) -> (Arc<Self>, mpsc::Sender<Completed>) {
		let (inbound_tx, inbound_rx) = mpsc::channel(256);
		let dispatcher = Arc::new(Self {
			index,
			events,
			write_lock: Mutex::new(()),
			inbound_tx: inbound_tx.clone(),
			inbound_rx: Mutex::new(Some(inbound_rx)),
			to_cloud_tx,
			clouds,
		});
		(dispatcher, inbound_tx)
	}

	/// Drains the dispatcher queue before acquiring the write mutex, so a side-band write
	/// (e.g. the local adapter persisting a just-hashed record) is globally ordered against
	/// in-flight chain completions.
	pub async fn side_band_write<F, Fut, R>(&self, f: F) -> R
	where
		F: FnOnce(Arc<Index>) -> Fut,
		Fut: std::future::Future<Output = R>,
	{
		while self.inbound_tx.capacity() != self.inbound_tx.max_capacity() {
			tokio::task::yield_now().await;
		}
		let _guard = self.write_lock.lock().await;
		f(self.index.clone()).await
	}

	pub async fn run(self: Arc<Self>) {
		let mut rx = self.inbound_rx.lock().await.take().expect("run() called once");
		while let Some(completed) = rx.recv().await {
			let _guard = self.write_lock.lock().await;
			self.complete_one(completed).await;
		}
	}

	async fn complete_one(&self, completed: Completed) {
		let Completed { mut command, response } = completed;

		match command.completion_callback(&self.index, response.as_deref(), &self.clouds).await {
			Ok(Completion::Done { next_links, change_done }) => {
				for next in next_links {
					if next.is_cloud() {
						if self.to_cloud_tx.send(next).await.is_err() {
							error!("http executor channel closed while releasing next-link command");
						}
					} else if self.inbound_tx.send(Completed { command: next, response: None }).await.is_err() {
						error!("dispatcher inbound channel closed while completing local next-link command");
					}
				}
				if let Some(change) = change_done {
					self.events.emit(Event::ChangeCompleted {
						global_id: change.global_id,
						change_type: change.change_type,
					});
				}
			}
			Ok(Completion::Repeat) => {
				// `needRepeat`: hand back to the cloud executor rather than dropping it.
				if self.to_cloud_tx.send(command).await.is_err() {
					error!("executor channel closed while repeating command");
				}
			}
			Err(e) => {
				info!(error = %e, "command failed permanently, change marked failed");
				self.events.emit(Event::ChangeFailed {
					target_path: command.target().to_string(),
					reason: e.to_string(),
				});
			}
		}
	}
}

//! Bounded-concurrency HTTP executor (C3). The original `HttpClient` drives a single
//! libcurl-multi loop on one dedicated thread; here one dedicated tokio task owns a
//! `tokio::sync::Semaphore`-bounded set of request futures instead, which is the idiomatic
//! tokio translation of "one worker, N concurrent transfers" and keeps the same policy: a
//! bounded FIFO in, completions classified by status code, retries parked until their
//! deadline, non-retryable failures dropped. Grounded on
//! `examples/original_source/Networking.h`/`.cpp`.

use super::handle::RequestHandle;
use crate::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info_span, warn, Instrument};

/// Anything the multiplexer can execute: a cloud-side Command exposing its `RequestHandle`.
/// Implemented by `sync::command::Command` for the cloud variants; local variants never enter
/// the multiplexer.
pub trait HttpExecutable: Send + 'static {
	fn request_handle_mut(&mut self) -> &mut RequestHandle;
	fn cloud_id(&self) -> i32;
}

/// What happened to one submitted item.
pub enum Outcome<T> {
	/// HTTP 200: hand off to the callback dispatcher (C4) to parse and apply.
	Success(T, bytes::Bytes),
	/// Retry budget not yet exhausted and the failure was transient: re-queued internally,
	/// never surfaced to the caller.
	Failed(T, Error),
}

struct Shared {
	active: AtomicUsize,
	delayed: AtomicUsize,
}

pub struct HttpMultiplexer<T: HttpExecutable> {
	client: reqwest::Client,
	concurrency: usize,
	inbound_tx: mpsc::Sender<T>,
	inbound_rx: Option<mpsc::Receiver<T>>,
	outbound_tx: mpsc::Sender<Outcome<T>>,
	shared: Arc<Shared>,
}

impl<T: HttpExecutable> HttpMultiplexer<T> {
	/// `concurrency` is the in-flight handle cap.
	pub fn new(concurrency: usize) -> (Self, mpsc::Receiver<Outcome<T>>) {
		let (inbound_tx, inbound_rx) = mpsc::channel(concurrency * 4);
		let (outbound_tx, outbound_rx) = mpsc::channel(concurrency * 4);
		let client = reqwest::Client::builder()
			.gzip(true)
			.http2_prior_knowledge()
			.redirect(reqwest::redirect::Policy::limited(10))
			.build()
			.expect("reqwest client config is static and always valid");
		(
			Self {
				client,
				concurrency,
				inbound_tx,
				inbound_rx: Some(inbound_rx),
				outbound_tx,
				shared: Arc::new(Shared { active: AtomicUsize::new(0), delayed: AtomicUsize::new(0) }),
			},
			outbound_rx,
		)
	}

	pub fn submitter(&self) -> mpsc::Sender<T> {
		self.inbound_tx.clone()
	}

	/// `isIdle()`: zero active, zero delayed, empty input queue.
	pub fn is_idle(&self) -> bool {
		self.shared.active.load(Ordering::SeqCst) == 0
			&& self.shared.delayed.load(Ordering::SeqCst) == 0
			&& self.inbound_tx.capacity() == self.inbound_tx.max_capacity()
	}

	/// The multiplexer's main loop. Runs until the input queue is closed and drained, then
	/// waits for zero active/delayed before returning (shutdown).
	pub async fn run(mut self) {
		let mut inbound = self.inbound_rx.take().expect("run() called once");
		let semaphore = Arc::new(Semaphore::new(self.concurrency));
		let mut joins = tokio::task::JoinSet::new();

		loop {
			tokio::select! {
				item = inbound.recv(), if !inbound.is_closed() || !joins.is_empty() => {
					match item {
						Some(item) => {
							let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");
							self.shared.active.fetch_add(1, Ordering::SeqCst);
							let client = self.client.clone();
							let outbound = self.outbound_tx.clone();
							let shared = self.shared.clone();
							let resubmit = self.inbound_tx.clone();
							joins.spawn(async move {
								let _permit = permit;
								execute_one(client, item, outbound, resubmit, shared).await;
							}.instrument(info_span!("http_command")));
						}
						None => {
							if joins.is_empty() {
								break;
							}
						}
					}
				}
				Some(_) = joins.join_next(), if !joins.is_empty() => {}
			}
		}
	}
}

async fn execute_one<T: HttpExecutable>(
	client: reqwest::Client,
	mut item: T,
	outbound: mpsc::Sender<Outcome<T>>,
	resubmit: mpsc::Sender<T>,
	shared: Arc<Shared>,
) {
	let handle = item.request_handle_mut();
	let method = handle.method.clone();
	let url = handle.url.clone();
	let headers = handle.headers.clone();
	let body_source = handle.body.clone();
	let body = match body_source {
		super::handle::BodySource::None => None,
		super::handle::BodySource::Bytes(bytes) => Some(bytes),
		super::handle::BodySource::File(path) => match tokio::fs::read(&path).await {
			Ok(bytes) => Some(bytes),
			Err(e) => {
				shared.active.fetch_sub(1, Ordering::SeqCst);
				let _ = outbound.send(Outcome::Failed(item, Error::permanent(format!("reading request body {}: {e}", path.display())))).await;
				return;
			}
		},
	};

	let mut req = client.request(method, &url);
	for (k, v) in &headers {
		req = req.header(k, v);
	}
	if let Some(bytes) = body {
		req = req.body(bytes);
	}

	let result = req.send().await;
	shared.active.fetch_sub(1, Ordering::SeqCst);

	match classify(result).await {
		Classification::Success(bytes) => {
			let _ = outbound.send(Outcome::Success(item, bytes)).await;
		}
		Classification::Retryable(reason) => {
			let handle = item.request_handle_mut();
			match handle.schedule_retry() {
				Ok(()) => {
					let deadline = handle.deadline().expect("schedule_retry sets a deadline");
					shared.delayed.fetch_add(1, Ordering::SeqCst);
					tokio::spawn(async move {
						tokio::time::sleep_until(deadline.into()).await;
						shared.delayed.fetch_sub(1, Ordering::SeqCst);
						let _ = resubmit.send(item).await;
					});
				}
				Err(exhausted) => {
					warn!(cloud_id = item.cloud_id(), %reason, "retry budget exhausted");
					let _ = outbound.send(Outcome::Failed(item, exhausted)).await;
				}
			}
		}
		Classification::Permanent(reason) => {
			let _ = outbound.send(Outcome::Failed(item, reason)).await;
		}
	}
}

enum Classification {
	Success(bytes::Bytes),
	Retryable(Error),
	Permanent(Error),
}

async fn classify(result: std::result::Result<reqwest::Response, reqwest::Error>) -> Classification {
	match result {
		Ok(response) => {
			let status = response.status().as_u16();
			match status {
				200 => match response.bytes().await {
					Ok(bytes) => Classification::Success(bytes),
					Err(e) => Classification::Permanent(Error::permanent(e.to_string())),
				},
				403 | 408 | 429 => Classification::Retryable(Error::transient(format!("status {status}"))),
				500..=599 => Classification::Retryable(Error::transient(format!("status {status}"))),
				_ => Classification::Permanent(Error::permanent(format!("status {status}"))),
			}
		}
		Err(e) => Classification::Permanent(Error::permanent(e.to_string())),
	}
}

//! One in-flight HTTP transaction (C2). Grounded on
//! `examples/original_source/include/request-handle.h`: the CURL handle's mutable state
//! (retry counter, deadline, response buffer) becomes a plain struct with move-only semantics,
//! since `reqwest` owns the transport instead of libcurl.

use crate::error::{Error, Result};
use rand::Rng;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const BASE_BACKOFF: Duration = Duration::from_secs(1);
const MAX_ATTEMPTS: u32 = 6;
const STREAM_BUFFER: usize = 128 * 1024;

/// Where a request body comes from, if any.
#[derive(Clone)]
pub enum BodySource {
	None,
	Bytes(Vec<u8>),
	File(PathBuf),
}

/// Where a response is written: buffered in memory for small responses, or streamed to a file
/// for downloads.
pub enum ResponseSink {
	Buffer(Vec<u8>),
	File(PathBuf),
}

/// Move-only: a handle mid-flight is never cloned, matching the deleted copy-constructor in
/// the original `RequestHandle`.
pub struct RequestHandle {
	pub method: reqwest::Method,
	pub url: String,
	pub headers: Vec<(String, String)>,
	pub body: BodySource,
	pub response: ResponseSink,
	attempt: u32,
	deadline: Option<Instant>,
}

impl RequestHandle {
	pub fn new(method: reqwest::Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			headers: Vec::new(),
			body: BodySource::None,
			response: ResponseSink::Buffer(Vec::with_capacity(STREAM_BUFFER)),
			attempt: 0,
			deadline: None,
		}
	}

	pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.headers.push((key.into(), value.into()));
	}

	pub fn stream_response_to_file(&mut self, path: PathBuf) {
		self.response = ResponseSink::File(path);
	}

	pub fn attempt(&self) -> u32 {
		self.attempt
	}

	pub fn is_due(&self, now: Instant) -> bool {
		self.deadline.map(|d| now >= d).unwrap_or(true)
	}

	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Bumps the attempt counter, resets the response buffer, and sets a deadline at
	/// `BASE * 2^attempt + jitter(attempt·BASE)`. A seventh call is a fatal error.
	pub fn schedule_retry(&mut self) -> Result<()> {
		if self.attempt + 1 >= MAX_ATTEMPTS {
			return Err(Error::RetryExhausted { attempts: self.attempt + 1 });
		}
		self.attempt += 1;
		if let ResponseSink::Buffer(buf) = &mut self.response {
			buf.clear();
		}
		let backoff = BASE_BACKOFF * 2u32.pow(self.attempt);
		let jitter_bound = (BASE_BACKOFF.as_millis() as i64) * self.attempt as i64;
		let jitter_ms = rand::thread_rng().gen_range(-jitter_bound..=jitter_bound);
		let deadline_delay = if jitter_ms.is_negative() {
			backoff.saturating_sub(Duration::from_millis(jitter_ms.unsigned_abs()))
		} else {
			backoff + Duration::from_millis(jitter_ms as u64)
		};
		self.deadline = Some(Instant::now() + deadline_delay);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retry_hard_caps_at_six_attempts() {
		let mut handle = RequestHandle::new(reqwest::Method::GET, "https://example.invalid/x");
		for _ in 0..5 {
			handle.schedule_retry().expect("within budget");
		}
		assert!(handle.schedule_retry().is_err());
	}

	#[test]
	fn schedule_retry_sets_a_future_deadline() {
		let mut handle = RequestHandle::new(reqwest::Method::GET, "https://example.invalid/x");
		let before = Instant::now();
		handle.schedule_retry().unwrap();
		assert!(handle.deadline().unwrap() > before);
	}
}

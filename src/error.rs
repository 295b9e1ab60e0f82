//! Crate-wide error taxonomy. Every fallible public API returns `Result<T, Error>`.

use thiserror::Error;

/// A transport failure that the HTTP multiplexer has already classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
	/// 408/429/403/5xx or a dropped connection: retry with backoff.
	Transient,
	/// Any other non-2xx status, or a hard transport error: do not retry.
	Permanent,
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("transport error ({kind:?}): {message}")]
	Transport { kind: TransportKind, message: String },

	#[error("index error: {0}")]
	Index(#[from] sea_orm::DbErr),

	#[error("filesystem error at {path}: {source}")]
	Filesystem {
		path: std::path::PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("protocol error: {0}")]
	Protocol(String),

	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("retry budget exhausted after {attempts} attempts")]
	RetryExhausted { attempts: u32 },
}

impl Error {
	pub fn filesystem(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
		Error::Filesystem { path: path.into(), source }
	}

	pub fn transient(message: impl Into<String>) -> Self {
		Error::Transport { kind: TransportKind::Transient, message: message.into() }
	}

	pub fn permanent(message: impl Into<String>) -> Self {
		Error::Transport { kind: TransportKind::Permanent, message: message.into() }
	}

	/// Whether the HTTP multiplexer should schedule a retry for this error.
	pub fn is_retryable(&self) -> bool {
		matches!(self, Error::Transport { kind: TransportKind::Transient, .. })
	}
}

impl From<serde_json::Error> for Error {
	fn from(e: serde_json::Error) -> Self {
		Error::Protocol(e.to_string())
	}
}

pub type Result<T> = std::result::Result<T, Error>;

// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while syncing advisories into the record store.
///
/// `Config`, `Transport`, `Http`, `Api` and `Decode` abort the whole run.
/// `MalformedIdentifier` only excludes one advisory, and `Format`/`Io` only
/// fail the one package file they name.
#[derive(Error, Debug)]
pub enum SyncError {
	#[error("configuration error: {0}")]
	Config(String),

	#[error("GraphQL request to {url} failed with status {status}: {body}")]
	Transport {
		status: u16,
		url: String,
		body: String,
	},

	#[error("HTTP error: {0}")]
	Http(#[from] reqwest::Error),

	#[error("GraphQL API returned errors: {0}")]
	Api(String),

	#[error("unexpected response shape: {0}")]
	Decode(String),

	#[error("malformed identifier: {0}")]
	MalformedIdentifier(String),

	#[error("cannot parse record {path}: {reason}")]
	Format { path: PathBuf, reason: String },

	#[error("I/O error on {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to serialize record: {0}")]
	Serialize(String),
}

impl SyncError {
	pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		SyncError::Io {
			path: path.into(),
			source,
		}
	}
}

pub type SyncResult<T> = Result<T, SyncError>;

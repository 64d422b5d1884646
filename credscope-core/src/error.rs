//! # Error Types
//!
//! Errors surfaced at the seams of the credential core. A lookup that finds
//! nothing is never an error; these types cover I/O, wire format and
//! transport failures only.

use std::path::PathBuf;

use thiserror::Error;

pub use crate::job::JobIdError;
pub use crate::url::UrlError;

/// Failure reading or writing a store's backing file
#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("Store for {scope} has no backing file")]
  NoBackingFile { scope: String },

  #[error("Failed to {action} {path}")]
  Io {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to serialize credentials for {path}")]
  Serialize {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl PersistenceError {
  pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    PersistenceError::Io {
      action,
      path: path.into(),
      source,
    }
  }
}

/// Failure encoding or decoding a handoff snapshot
#[derive(Debug, Error)]
pub enum HandoffError {
  #[error("Failed to encode handoff snapshot")]
  Encode(#[source] serde_json::Error),

  #[error("Failed to decode handoff snapshot")]
  Decode(#[source] serde_json::Error),

  #[error("Unsupported handoff snapshot version {found} (expected {expected})")]
  UnsupportedVersion { found: u32, expected: u32 },

  #[error("Handoff snapshot is for job {found}, not {expected}")]
  JobMismatch { found: String, expected: String },

  #[error("Handoff snapshot carries an invalid scope")]
  InvalidScope(#[from] UrlError),
}

/// Failure reported by the version-control transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
  /// The repository refused every credential offered for `realm`
  #[error("Authentication rejected by {url} for realm {realm}")]
  AuthenticationRejected { realm: String, url: String },

  #[error("Repository {url} is unreachable: {reason}")]
  Unreachable { url: String, reason: String },
}

/// Failure of an explicit credential submission
#[derive(Debug, Error)]
pub enum SubmissionError {
  #[error("Submitted credential for realm {realm} was rejected by {url}")]
  Rejected { realm: String, url: String },

  #[error("Could not verify submitted credential")]
  Connection(#[source] ConnectionError),

  #[error("Credential accepted but could not be persisted")]
  Persistence(#[from] PersistenceError),
}

impl From<ConnectionError> for SubmissionError {
  fn from(error: ConnectionError) -> Self {
    match error {
      ConnectionError::AuthenticationRejected { realm, url } => SubmissionError::Rejected { realm, url },
      other => SubmissionError::Connection(other),
    }
  }
}

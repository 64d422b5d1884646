//! # Remote Handoff
//!
//! Wire format for moving credentials between the controller and a worker.
//! The message types here mirror the in-memory records but are versioned and
//! kept separate from them, so internal changes never alter what a worker
//! receives.
//!
//! A controller sends [`Resolver::snapshot_for`] to the worker. The worker
//! calls [`HandoffSnapshot::restore`] to get a detached resolver, builds, and
//! sends back [`Resolver::returned_snapshot`]. The controller then calls
//! [`Resolver::absorb`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HandoffError;
use crate::job::JobId;
use crate::record::{CreatedBy, CredentialRecord, Secret};
use crate::resolver::Resolver;
use crate::store::CredentialStore;
use crate::url::PathScope;

/// Current wire format version
pub const HANDOFF_FORMAT_VERSION: u32 = 1;

/// Credentials for one job, packaged for another process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffSnapshot {
  version: u32,
  job: JobId,
  #[serde(default)]
  scopes: Vec<ScopeSnapshot>,
  #[serde(default)]
  global: Vec<RecordMessage>,
}

/// Records of one job store; `scope` is the canonical URL string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSnapshot {
  pub scope: String,
  pub credentials: Vec<RecordMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMessage {
  pub realm: String,
  pub secret: SecretMessage,
  pub origin: OriginMessage,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SecretMessage {
  Password {
    username: String,
    password: String,
  },
  SshKey {
    username: String,
    private_key: String,
    #[serde(default)]
    passphrase: Option<String>,
  },
  SslClientCertificate {
    certificate: String,
    #[serde(default)]
    passphrase: Option<String>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginMessage {
  Acknowledged,
  Submitted,
}

#[derive(Deserialize)]
struct VersionHeader {
  version: u32,
}

impl From<&Secret> for SecretMessage {
  fn from(secret: &Secret) -> Self {
    match secret.clone() {
      Secret::Password { username, password } => SecretMessage::Password { username, password },
      Secret::SshKey {
        username,
        private_key,
        passphrase,
      } => SecretMessage::SshKey {
        username,
        private_key,
        passphrase,
      },
      Secret::SslClientCertificate { certificate, passphrase } => {
        SecretMessage::SslClientCertificate { certificate, passphrase }
      }
    }
  }
}

impl From<SecretMessage> for Secret {
  fn from(message: SecretMessage) -> Self {
    match message {
      SecretMessage::Password { username, password } => Secret::Password { username, password },
      SecretMessage::SshKey {
        username,
        private_key,
        passphrase,
      } => Secret::SshKey {
        username,
        private_key,
        passphrase,
      },
      SecretMessage::SslClientCertificate { certificate, passphrase } => {
        Secret::SslClientCertificate { certificate, passphrase }
      }
    }
  }
}

impl From<&CredentialRecord> for RecordMessage {
  fn from(record: &CredentialRecord) -> Self {
    Self {
      realm: record.realm.clone(),
      secret: SecretMessage::from(&record.secret),
      origin: match record.created_by {
        CreatedBy::Acknowledged => OriginMessage::Acknowledged,
        CreatedBy::Submitted => OriginMessage::Submitted,
      },
      created_at: record.created_at,
    }
  }
}

impl From<RecordMessage> for CredentialRecord {
  fn from(message: RecordMessage) -> Self {
    Self {
      realm: message.realm,
      secret: message.secret.into(),
      created_by: match message.origin {
        OriginMessage::Acknowledged => CreatedBy::Acknowledged,
        OriginMessage::Submitted => CreatedBy::Submitted,
      },
      created_at: message.created_at,
    }
  }
}

fn messages(store: &CredentialStore) -> Vec<RecordMessage> {
  store.records().iter().map(|record| RecordMessage::from(record.as_ref())).collect()
}

impl HandoffSnapshot {
  /// Package `scopes` of `job` plus, optionally, the global store
  pub(crate) fn capture(job: &JobId, scopes: &[CredentialStore], global: Option<&CredentialStore>) -> Self {
    let scopes = scopes
      .iter()
      .filter_map(|store| {
        let scope = store.scope().as_path()?;
        Some(ScopeSnapshot {
          scope: scope.to_string(),
          credentials: messages(store),
        })
      })
      .collect();

    Self {
      version: HANDOFF_FORMAT_VERSION,
      job: job.clone(),
      scopes,
      global: global.map(messages).unwrap_or_default(),
    }
  }

  pub fn job(&self) -> &JobId {
    &self.job
  }

  pub fn version(&self) -> u32 {
    self.version
  }

  pub fn scopes(&self) -> &[ScopeSnapshot] {
    &self.scopes
  }

  pub fn global(&self) -> &[RecordMessage] {
    &self.global
  }

  /// Total number of records carried
  pub fn record_count(&self) -> usize {
    self.global.len() + self.scopes.iter().map(|s| s.credentials.len()).sum::<usize>()
  }

  pub fn is_empty(&self) -> bool {
    self.record_count() == 0
  }

  pub fn encode(&self) -> Result<String, HandoffError> {
    serde_json::to_string_pretty(self).map_err(HandoffError::Encode)
  }

  /// Decode a snapshot, refusing versions this build does not understand
  pub fn decode(input: &str) -> Result<Self, HandoffError> {
    let header: VersionHeader = serde_json::from_str(input).map_err(HandoffError::Decode)?;
    if header.version != HANDOFF_FORMAT_VERSION {
      return Err(HandoffError::UnsupportedVersion {
        found: header.version,
        expected: HANDOFF_FORMAT_VERSION,
      });
    }
    serde_json::from_str(input).map_err(HandoffError::Decode)
  }

  pub(crate) fn check_version(&self) -> Result<(), HandoffError> {
    if self.version == HANDOFF_FORMAT_VERSION {
      Ok(())
    } else {
      Err(HandoffError::UnsupportedVersion {
        found: self.version,
        expected: HANDOFF_FORMAT_VERSION,
      })
    }
  }

  /// Fail unless this snapshot was made for `job`
  pub fn expect_job(&self, job: &JobId) -> Result<(), HandoffError> {
    if &self.job == job {
      Ok(())
    } else {
      Err(HandoffError::JobMismatch {
        found: self.job.to_string(),
        expected: job.to_string(),
      })
    }
  }

  /// Job scopes with their records, converted back from the wire form
  pub fn scoped_records(&self) -> Result<Vec<(PathScope, Vec<CredentialRecord>)>, HandoffError> {
    self
      .scopes
      .iter()
      .map(|snapshot| {
        let scope = PathScope::parse(&snapshot.scope)?;
        let records = snapshot.credentials.iter().cloned().map(CredentialRecord::from).collect();
        Ok((scope, records))
      })
      .collect()
  }

  pub fn global_records(&self) -> Vec<CredentialRecord> {
    self.global.iter().cloned().map(CredentialRecord::from).collect()
  }

  /// Rebuild the snapshot as a detached resolver.
  ///
  /// Records are replayed through the normal acknowledgment path and the
  /// stores are then marked clean, so anything the worker learns afterwards
  /// is exactly what [`Resolver::returned_snapshot`] sends back.
  pub fn restore(&self) -> Result<Resolver, HandoffError> {
    self.check_version()?;
    let resolver = Resolver::detached();
    resolver.seed(&self.job, self.scoped_records()?, self.global_records());
    Ok(resolver)
  }
}

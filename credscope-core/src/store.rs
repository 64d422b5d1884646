//! # Credential Store
//!
//! A scope-bound mapping from authentication realm to [`CredentialRecord`],
//! with dirty tracking against the last persisted state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::job::JobId;
use crate::persistence;
use crate::record::CredentialRecord;
use crate::url::{PathScope, RepositoryUrl, Scope};

/// Credentials learned for one scope.
///
/// Records are only changed through [`CredentialStore::acknowledge`] and
/// [`CredentialStore::forget`]. `is_dirty` stays true until a successful
/// [`CredentialStore::persist`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
  scope: Scope,
  owner: Option<JobId>,
  records: HashMap<String, Arc<CredentialRecord>>,
  dirty: bool,
  location: Option<PathBuf>,
}

impl CredentialStore {
  /// An empty, in-memory store owned by `owner` and scoped to `scope`
  pub fn new(scope: Scope, owner: Option<JobId>) -> Self {
    Self {
      scope,
      owner,
      records: HashMap::new(),
      dirty: false,
      location: None,
    }
  }

  /// An empty store for a job, restricted to `scope`
  pub fn for_job(job: JobId, scope: PathScope) -> Self {
    Self::new(Scope::Path(scope), Some(job))
  }

  /// An empty unscoped store with no owner
  pub fn global() -> Self {
    Self::new(Scope::Global, None)
  }

  /// Attach the file this store persists to
  pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
    self.location = Some(location.into());
    self
  }

  /// Build a clean store from previously persisted records
  pub(crate) fn restored(
    scope: Scope,
    owner: Option<JobId>,
    records: impl IntoIterator<Item = CredentialRecord>,
    location: Option<PathBuf>,
  ) -> Self {
    let records = records
      .into_iter()
      .map(|record| (record.realm.clone(), Arc::new(record)))
      .collect();
    Self {
      scope,
      owner,
      records,
      dirty: false,
      location,
    }
  }

  pub fn scope(&self) -> &Scope {
    &self.scope
  }

  pub fn owner(&self) -> Option<&JobId> {
    self.owner.as_ref()
  }

  pub fn location(&self) -> Option<&Path> {
    self.location.as_deref()
  }

  pub fn is_dirty(&self) -> bool {
    self.dirty
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  /// Realms with a stored record, sorted
  pub fn realms(&self) -> Vec<&str> {
    let mut realms: Vec<&str> = self.records.keys().map(String::as_str).collect();
    realms.sort_unstable();
    realms
  }

  /// Every stored record, sorted by realm
  pub fn records(&self) -> Vec<Arc<CredentialRecord>> {
    let mut records: Vec<Arc<CredentialRecord>> = self.records.values().cloned().collect();
    records.sort_by(|a, b| a.realm.cmp(&b.realm));
    records
  }

  /// Record a credential result for `realm`.
  ///
  /// `None` means the transport had nothing to report; it leaves both the
  /// records and the dirty flag untouched. Returns whether the store changed.
  pub fn acknowledge(&mut self, realm: &str, record: Option<CredentialRecord>) -> bool {
    let Some(record) = record else {
      debug!(realm, scope = %self.scope, "Ignoring empty acknowledgment");
      return false;
    };

    if let Some(existing) = self.records.get(realm)
      && existing.same_credential(&record)
    {
      debug!(realm, scope = %self.scope, "Credential already stored");
      return false;
    }

    let record = CredentialRecord {
      realm: realm.to_string(),
      ..record
    };
    info!(
      realm,
      scope = %self.scope,
      credential = %record.secret,
      "Stored credential"
    );
    self.records.insert(realm.to_string(), Arc::new(record));
    self.dirty = true;
    true
  }

  /// Remove the record for `realm`. Returns whether one was removed.
  pub fn forget(&mut self, realm: &str) -> bool {
    if self.records.remove(realm).is_some() {
      info!(realm, scope = %self.scope, "Forgot credential");
      self.dirty = true;
      true
    } else {
      false
    }
  }

  /// The record for `realm`, but only when this store's scope authorizes
  /// `url`
  pub fn lookup(&self, realm: &str, url: &RepositoryUrl) -> Option<Arc<CredentialRecord>> {
    if !self.scope.authorizes(url) {
      return None;
    }
    self.records.get(realm).cloned()
  }

  /// The record for `realm` regardless of scope
  pub fn get(&self, realm: &str) -> Option<Arc<CredentialRecord>> {
    self.records.get(realm).cloned()
  }

  /// Write every record to the backing file and clear the dirty flag.
  ///
  /// # Errors
  ///
  /// Fails for stores without a location and on any I/O error; the dirty flag
  /// is left set in both cases.
  pub fn persist(&mut self) -> Result<(), PersistenceError> {
    let location = self
      .location
      .clone()
      .ok_or_else(|| PersistenceError::NoBackingFile {
        scope: self.scope.to_string(),
      })?;
    persistence::write_store(&location, self)?;
    self.dirty = false;
    Ok(())
  }

  pub(crate) fn mark_clean(&mut self) {
    self.dirty = false;
  }
}

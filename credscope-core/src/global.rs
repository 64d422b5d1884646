//! # Global Store
//!
//! The unscoped fallback store shared by every job in a process. It is an
//! explicit value passed to each [`Resolver`](crate::resolver::Resolver), so
//! tests can build as many isolated instances as they need.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::error::PersistenceError;
use crate::record::CredentialRecord;
use crate::store::CredentialStore;
use crate::url::RepositoryUrl;

/// Process-wide store consulted after every job store.
///
/// Lookups share a read lock and always see whole records. `acknowledge`,
/// `forget` and `persist` additionally hold a writer lock, so at most one of
/// them touches the store or its file at a time.
#[derive(Debug)]
pub struct GlobalStore {
  store: RwLock<CredentialStore>,
  writer: Mutex<()>,
}

impl Default for GlobalStore {
  fn default() -> Self {
    Self::new(CredentialStore::global())
  }
}

impl GlobalStore {
  pub fn new(store: CredentialStore) -> Self {
    Self {
      store: RwLock::new(store),
      writer: Mutex::new(()),
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, CredentialStore> {
    self.store.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, CredentialStore> {
    self.store.write().unwrap_or_else(PoisonError::into_inner)
  }

  fn exclusive(&self) -> MutexGuard<'_, ()> {
    self.writer.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn lookup(&self, realm: &str, url: &RepositoryUrl) -> Option<Arc<CredentialRecord>> {
    self.read().lookup(realm, url)
  }

  /// Same contract as [`CredentialStore::acknowledge`]
  pub fn acknowledge(&self, realm: &str, record: Option<CredentialRecord>) -> bool {
    let _writer = self.exclusive();
    self.write().acknowledge(realm, record)
  }

  pub fn forget(&self, realm: &str) -> bool {
    let _writer = self.exclusive();
    self.write().forget(realm)
  }

  pub fn is_empty(&self) -> bool {
    self.read().is_empty()
  }

  pub fn is_dirty(&self) -> bool {
    self.read().is_dirty()
  }

  /// A point-in-time copy of the store
  pub fn snapshot(&self) -> CredentialStore {
    self.read().clone()
  }

  /// Write the store to its backing file.
  ///
  /// The file is written from a copy so lookups keep running during I/O;
  /// the writer lock keeps acknowledgments out until the dirty flag is
  /// cleared.
  pub fn persist(&self) -> Result<(), PersistenceError> {
    let _writer = self.exclusive();
    let mut copy = self.read().clone();
    if !copy.is_dirty() {
      debug!("Global store already persisted");
      return Ok(());
    }
    copy.persist()?;
    self.write().mark_clean();
    Ok(())
  }

  pub(crate) fn mark_clean(&self) {
    let _writer = self.exclusive();
    self.write().mark_clean();
  }
}

//! Credential storage roots for testing
//!
//! Every guard owns a fresh temporary directory that is removed when the guard
//! is dropped, so tests never touch a real credential root.

use std::path::{Path, PathBuf};

use credscope_core::{CredentialStore, JobId, PathScope, PersistenceLayer, Resolver};
use tempfile::TempDir;

/// A temporary storage root
pub struct StoreRootGuard {
  temp_dir: TempDir,
}

impl Default for StoreRootGuard {
  fn default() -> Self {
    Self::new()
  }
}

impl StoreRootGuard {
  pub fn new() -> Self {
    Self {
      temp_dir: TempDir::new().expect("Failed to create temporary directory"),
    }
  }

  /// The storage root
  pub fn root(&self) -> &Path {
    self.temp_dir.path()
  }

  pub fn layer(&self) -> PersistenceLayer {
    PersistenceLayer::new(self.root())
  }

  /// A fresh resolver over this root, as a restarted process would see it
  pub fn resolver(&self) -> Resolver {
    Resolver::open(self.layer())
  }

  /// The store of `job` for `scope` as currently persisted
  pub fn persisted_store(&self, job: &JobId, scope: &str) -> CredentialStore {
    let layer = self.layer();
    let scope = PathScope::parse(scope).expect("invalid test scope");
    layer.load(&layer.job_key(job, &scope))
  }

  /// The global store as currently persisted
  pub fn persisted_global(&self) -> CredentialStore {
    let layer = self.layer();
    layer.load(&layer.global_key())
  }

  /// Path of `name` inside the root
  pub fn path(&self, name: &str) -> PathBuf {
    self.root().join(name)
  }
}

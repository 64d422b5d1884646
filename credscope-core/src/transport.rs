//! # Transport Seam
//!
//! Interfaces between the credential core and the version-control client that
//! performs the actual network I/O. The client issues challenges through an
//! [`AuthenticationManager`]; the core asks the client to test a connection
//! through a [`ConnectionTester`].

use std::sync::Arc;

use crate::error::ConnectionError;
use crate::record::{CredentialRecord, Secret};
use crate::url::RepositoryUrl;

/// Called by the transport whenever a repository challenges for credentials
pub trait AuthenticationManager: Send + Sync {
  /// First credential to try for `realm` at `url`, or `None` to let the
  /// transport fall back to its own credential discovery
  fn first_authentication(&self, realm: &str, url: &RepositoryUrl) -> Option<Arc<CredentialRecord>>;

  /// Report the outcome of an authentication attempt.
  ///
  /// A rejected attempt (`accepted == false`) or one without a credential
  /// never removes anything previously learned.
  fn acknowledge_authentication(&self, accepted: bool, realm: &str, url: &RepositoryUrl, credential: Option<&Secret>);
}

/// The transport's ability to open a connection to a repository
pub trait ConnectionTester {
  /// Connect to `url`, answering every challenge through `auth`.
  ///
  /// # Errors
  ///
  /// [`ConnectionError::AuthenticationRejected`] when the repository refused the
  /// credentials offered; other variants for transport failures.
  fn test_connection(&self, url: &RepositoryUrl, auth: &dyn AuthenticationManager) -> Result<(), ConnectionError>;
}

/// An authentication manager that knows nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthentication;

impl AuthenticationManager for NoAuthentication {
  fn first_authentication(&self, _realm: &str, _url: &RepositoryUrl) -> Option<Arc<CredentialRecord>> {
    None
  }

  fn acknowledge_authentication(
    &self,
    _accepted: bool,
    _realm: &str,
    _url: &RepositoryUrl,
    _credential: Option<&Secret>,
  ) {
  }
}

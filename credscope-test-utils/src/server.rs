//! Simulated repository server
//!
//! [`FakeRepositoryServer`] stands in for a version-control server behind the
//! transport seam. It issues one realm, knows a set of accounts with
//! path-prefix access rules, and challenges every request through an
//! [`AuthenticationManager`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use credscope_core::{AuthenticationManager, CredentialRecord, ConnectionError, ConnectionTester, RepositoryUrl, Secret};

#[derive(Debug, Clone)]
struct Account {
  secret: Secret,
  /// Empty means every path on the server
  paths: Vec<RepositoryUrl>,
}

impl Account {
  fn can_read(&self, url: &RepositoryUrl) -> bool {
    self.paths.is_empty() || self.paths.iter().any(|path| url.starts_with(path))
  }
}

/// A single-realm repository server
#[derive(Debug)]
pub struct FakeRepositoryServer {
  base: RepositoryUrl,
  realm: String,
  accounts: Vec<Account>,
  anonymous: Vec<RepositoryUrl>,
  attempts: Mutex<Vec<String>>,
}

impl FakeRepositoryServer {
  /// A server rooted at `base` that issues the realm `<scheme://host:port>`
  pub fn new(base: &str) -> Self {
    let base = RepositoryUrl::parse(base).expect("invalid server URL");
    let port = base.port().unwrap_or(match base.scheme() {
      "svn" => 3690,
      "https" => 443,
      "http" => 80,
      _ => 22,
    });
    let realm = format!("<{}://{}:{port}>", base.scheme(), base.host());
    Self {
      base,
      realm,
      accounts: Vec::new(),
      anonymous: Vec::new(),
      attempts: Mutex::new(Vec::new()),
    }
  }

  /// Replace the realm string
  pub fn with_realm(mut self, realm: &str) -> Self {
    self.realm = realm.to_string();
    self
  }

  /// Add an account that may read `paths` (everything when empty)
  pub fn with_user(mut self, username: &str, password: &str, paths: &[&str]) -> Self {
    self.accounts.push(Account {
      secret: Secret::password(username, password),
      paths: paths
        .iter()
        .map(|path| RepositoryUrl::parse(path).expect("invalid account path"))
        .collect(),
    });
    self
  }

  /// Allow reads beneath `path` without credentials
  pub fn with_anonymous_read(mut self, path: &str) -> Self {
    self
      .anonymous
      .push(RepositoryUrl::parse(path).expect("invalid anonymous path"));
    self
  }

  pub fn realm(&self) -> &str {
    &self.realm
  }

  /// Usernames offered to this server, in order
  pub fn attempts(&self) -> Vec<String> {
    self.attempts.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Whether `secret` may read `url`
  pub fn accepts(&self, secret: &Secret, url: &RepositoryUrl) -> bool {
    let username = secret.username().unwrap_or("<certificate>").to_string();
    self
      .attempts
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(username);
    self
      .accounts
      .iter()
      .any(|account| &account.secret == secret && account.can_read(url))
  }

  fn check_reachable(&self, url: &RepositoryUrl) -> Result<(), ConnectionError> {
    if url.starts_with(&self.base) {
      Ok(())
    } else {
      Err(ConnectionError::Unreachable {
        url: url.to_string(),
        reason: format!("not served by {}", self.base),
      })
    }
  }

  fn rejected(&self, url: &RepositoryUrl) -> ConnectionError {
    ConnectionError::AuthenticationRejected {
      realm: self.realm.clone(),
      url: url.to_string(),
    }
  }

  /// Check out `url`, challenging once through `auth`
  pub fn checkout(&self, url: &RepositoryUrl, auth: &dyn AuthenticationManager) -> Result<(), ConnectionError> {
    self.check_reachable(url)?;
    if self.anonymous.iter().any(|path| url.starts_with(path)) {
      return Ok(());
    }

    let Some(record) = auth.first_authentication(&self.realm, url) else {
      return Err(self.rejected(url));
    };
    let accepted = self.accepts(&record.secret, url);
    auth.acknowledge_authentication(accepted, &self.realm, url, Some(&record.secret));
    if accepted { Ok(()) } else { Err(self.rejected(url)) }
  }

  /// Check out several locations, as a build with externals does
  pub fn checkout_all(&self, urls: &[RepositoryUrl], auth: &dyn AuthenticationManager) -> Result<(), ConnectionError> {
    urls.iter().try_for_each(|url| self.checkout(url, auth))
  }
}

impl ConnectionTester for FakeRepositoryServer {
  fn test_connection(&self, url: &RepositoryUrl, auth: &dyn AuthenticationManager) -> Result<(), ConnectionError> {
    self.checkout(url, auth)
  }
}

/// A transport client that keeps its own credential cache per realm.
///
/// A cached credential is always tried first. When the server rejects it, the
/// client asks the authentication manager; if that yields nothing new the
/// request fails and the stale entry stays cached.
#[derive(Debug)]
pub struct CachingClient<'a> {
  server: &'a FakeRepositoryServer,
  cache: Mutex<HashMap<String, Secret>>,
}

impl<'a> CachingClient<'a> {
  pub fn new(server: &'a FakeRepositoryServer) -> Self {
    Self {
      server,
      cache: Mutex::new(HashMap::new()),
    }
  }

  /// Seed the cache with `secret`, usually a wrong one
  pub fn poison(&self, secret: Secret) {
    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(self.server.realm().to_string(), secret);
  }

  pub fn cached(&self) -> Option<Secret> {
    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(self.server.realm())
      .cloned()
  }

  pub fn checkout(&self, url: &RepositoryUrl, auth: &dyn AuthenticationManager) -> Result<(), ConnectionError> {
    self.server.check_reachable(url)?;
    let realm = self.server.realm();

    let cached = self.cached();
    if let Some(secret) = &cached {
      if self.server.accepts(secret, url) {
        auth.acknowledge_authentication(true, realm, url, Some(secret));
        return Ok(());
      }
      auth.acknowledge_authentication(false, realm, url, Some(secret));
    }

    let offered: Option<Arc<CredentialRecord>> = auth.first_authentication(realm, url);
    let Some(record) = offered.filter(|record| Some(&record.secret) != cached.as_ref()) else {
      return Err(self.server.rejected(url));
    };

    let accepted = self.server.accepts(&record.secret, url);
    auth.acknowledge_authentication(accepted, realm, url, Some(&record.secret));
    if !accepted {
      return Err(self.server.rejected(url));
    }
    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(realm.to_string(), record.secret.clone());
    Ok(())
  }
}

//! # Repository URLs and Path Scopes
//!
//! Canonical repository locators and the directional prefix rule that decides
//! whether a credential registered against one location may serve a request
//! against another.
//!
//! A [`PathScope`] authorizes a URL when both share scheme, host and port and
//! the URL's path segments start with the scope's path segments. Matching is
//! segment-aligned: `svn://host/repo` authorizes `svn://host/repo/trunk` but
//! never `svn://host/repository`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Errors raised while turning user or transport input into a
/// [`RepositoryUrl`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
  #[error("Repository URL cannot be empty")]
  Empty,
  #[error("Failed to parse repository URL '{0}'. Ensure it is absolute and has a scheme.")]
  Invalid(String),
  #[error("Repository URL '{0}' has no host")]
  MissingHost(String),
  #[error("Repository URL '{0}' must not carry a query or fragment")]
  QueryOrFragment(String),
}

/// Ports that are implied by the scheme and therefore dropped from the
/// canonical form.
fn default_port(scheme: &str) -> Option<u16> {
  match scheme {
    "svn" => Some(3690),
    "svn+ssh" | "ssh" => Some(22),
    "http" => Some(80),
    "https" => Some(443),
    _ => None,
  }
}

/// A normalized, absolute repository locator.
///
/// Normalization lowercases scheme and host, drops user info and default
/// ports, resolves `.`/`..` segments, collapses empty segments and strips
/// trailing separators. Two inputs that name the same location compare equal
/// and print identically, which is what lets scope checks behave the same on
/// both sides of a handoff.
///
/// # Examples
///
/// ```
/// use credscope_core::url::RepositoryUrl;
///
/// let url = RepositoryUrl::parse("SVN://Host:3690/repo//trunk/").unwrap();
/// assert_eq!(url.to_string(), "svn://host/repo/trunk");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepositoryUrl {
  scheme: String,
  host: String,
  port: Option<u16>,
  segments: Vec<String>,
}

impl RepositoryUrl {
  /// Parse and normalize a repository URL.
  ///
  /// # Errors
  ///
  /// Returns [`UrlError`] for empty, relative or opaque input, for URLs
  /// without a host (other than `file:` URLs), and for URLs that carry a
  /// query string or fragment.
  pub fn parse(input: &str) -> Result<Self, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
      return Err(UrlError::Empty);
    }

    let url = Url::parse(trimmed).map_err(|_| UrlError::Invalid(trimmed.to_string()))?;
    if url.cannot_be_a_base() {
      return Err(UrlError::Invalid(trimmed.to_string()));
    }
    if url.query().is_some() || url.fragment().is_some() {
      return Err(UrlError::QueryOrFragment(trimmed.to_string()));
    }

    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    if host.is_empty() && scheme != "file" {
      return Err(UrlError::MissingHost(trimmed.to_string()));
    }

    let port = url.port().filter(|port| Some(*port) != default_port(&scheme));

    let mut segments: Vec<String> = Vec::new();
    for segment in url.path_segments().into_iter().flatten() {
      match segment {
        "" | "." => {}
        ".." => {
          segments.pop();
        }
        other => segments.push(other.to_string()),
      }
    }

    Ok(Self {
      scheme,
      host,
      port,
      segments,
    })
  }

  /// The lowercased scheme, e.g. `svn` or `https`
  pub fn scheme(&self) -> &str {
    &self.scheme
  }

  /// The lowercased host, empty for `file:` URLs
  pub fn host(&self) -> &str {
    &self.host
  }

  /// Explicit non-default port, if any
  pub fn port(&self) -> Option<u16> {
    self.port
  }

  /// Path segments in order, without empty or dot segments
  pub fn segments(&self) -> &[String] {
    &self.segments
  }

  /// Number of path segments below the repository root
  pub fn depth(&self) -> usize {
    self.segments.len()
  }

  /// Whether both URLs address the same server endpoint
  pub fn same_authority(&self, other: &RepositoryUrl) -> bool {
    self.scheme == other.scheme && self.host == other.host && self.port == other.port
  }

  /// Whether `self` equals `prefix` or lies beneath it.
  ///
  /// Comparison is per segment, never a raw string prefix.
  pub fn starts_with(&self, prefix: &RepositoryUrl) -> bool {
    self.same_authority(prefix)
      && prefix.segments.len() <= self.segments.len()
      && prefix.segments.iter().zip(&self.segments).all(|(a, b)| a == b)
  }

  /// Append relative path segments, normalizing the result.
  pub fn join(&self, relative: &str) -> RepositoryUrl {
    let mut joined = self.clone();
    for segment in relative.split('/') {
      match segment {
        "" | "." => {}
        ".." => {
          joined.segments.pop();
        }
        other => joined.segments.push(other.to_string()),
      }
    }
    joined
  }
}

impl fmt::Display for RepositoryUrl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}://{}", self.scheme, self.host)?;
    if let Some(port) = self.port {
      write!(f, ":{port}")?;
    }
    for segment in &self.segments {
      write!(f, "/{segment}")?;
    }
    Ok(())
  }
}

impl FromStr for RepositoryUrl {
  type Err = UrlError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

impl TryFrom<String> for RepositoryUrl {
  type Error = UrlError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    Self::parse(&value)
  }
}

impl From<RepositoryUrl> for String {
  fn from(url: RepositoryUrl) -> Self {
    url.to_string()
  }
}

/// The repository path a job-scoped credential was registered against.
///
/// A scope authorizes its own URL and everything beneath it, which is how a
/// credential registered against a repository root also serves externals
/// nested inside that repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathScope {
  base: RepositoryUrl,
}

impl PathScope {
  pub fn new(base: RepositoryUrl) -> Self {
    Self { base }
  }

  /// Parse a scope from a URL string
  pub fn parse(input: &str) -> Result<Self, UrlError> {
    RepositoryUrl::parse(input).map(Self::new)
  }

  /// The canonical base URL of this scope
  pub fn base(&self) -> &RepositoryUrl {
    &self.base
  }

  /// Directional prefix check: `true` iff `candidate` is the base URL or lies
  /// beneath it.
  pub fn authorizes(&self, candidate: &RepositoryUrl) -> bool {
    candidate.starts_with(&self.base)
  }

  /// Length of the scope's path; longer scopes are more specific.
  pub fn specificity(&self) -> usize {
    self.base.depth()
  }
}

impl fmt::Display for PathScope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.base.fmt(f)
  }
}

impl From<RepositoryUrl> for PathScope {
  fn from(base: RepositoryUrl) -> Self {
    Self::new(base)
  }
}

/// Where a store's credentials apply: beneath one repository path, or
/// everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
  /// The unscoped marker used by the global store
  Global,
  Path(PathScope),
}

impl Scope {
  pub fn authorizes(&self, candidate: &RepositoryUrl) -> bool {
    match self {
      Scope::Global => true,
      Scope::Path(scope) => scope.authorizes(candidate),
    }
  }

  pub fn as_path(&self) -> Option<&PathScope> {
    match self {
      Scope::Global => None,
      Scope::Path(scope) => Some(scope),
    }
  }

  pub fn is_global(&self) -> bool {
    matches!(self, Scope::Global)
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scope::Global => f.write_str("<global>"),
      Scope::Path(scope) => scope.fmt(f),
    }
  }
}

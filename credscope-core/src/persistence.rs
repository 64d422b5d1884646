//! # Persistence Layer
//!
//! Maps a store's identity (owner job plus scope) to a JSON file beneath a
//! storage root and moves stores in and out of those files.
//!
//! ```text
//! <root>/global/credentials.json
//! <root>/jobs/<job>/scopes/<encoded scope>/credentials.json
//! <root>/jobs/<job>/configurations/axis-<name>/<value>/scopes/<encoded scope>/credentials.json
//! ```
//!
//! Encoded scopes longer than one directory name allows are split over nested
//! directories of [`MAX_SCOPE_NAME_LEN`] bytes each.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::job::JobId;
use crate::record::CredentialRecord;
use crate::store::CredentialStore;
use crate::url::{PathScope, Scope};

/// Fixed name of every store file
pub const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Current on-disk document version
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Longest single directory name used for an encoded scope
pub const MAX_SCOPE_NAME_LEN: usize = 200;

const GLOBAL_DIR: &str = "global";
const SCOPES_DIR: &str = "scopes";

/// Identity of one persisted store and the file it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey {
  owner: Option<JobId>,
  scope: Scope,
  path: PathBuf,
}

impl StorageKey {
  pub fn owner(&self) -> Option<&JobId> {
    self.owner.as_ref()
  }

  pub fn scope(&self) -> &Scope {
    &self.scope
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

/// Owned form of the document read from disk
#[derive(Debug, Deserialize)]
struct StoreDocument {
  version: u32,
  #[serde(default)]
  scope: Option<PathScope>,
  #[serde(default)]
  owner: Option<JobId>,
  #[serde(default)]
  credentials: BTreeMap<String, CredentialRecord>,
}

/// Borrowed view of a store used for writing
#[derive(Serialize)]
struct StoreDocumentRef<'a> {
  version: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  scope: Option<&'a PathScope>,
  #[serde(skip_serializing_if = "Option::is_none")]
  owner: Option<&'a JobId>,
  credentials: BTreeMap<&'a str, &'a CredentialRecord>,
}

/// Encode a scope as a single directory name.
///
/// Form encoding escapes `/`, `:` and `%`, so distinct canonical scopes always
/// produce distinct names.
pub fn encode_scope(scope: &PathScope) -> String {
  url::form_urlencoded::byte_serialize(scope.to_string().as_bytes()).collect()
}

/// Inverse of [`encode_scope`]; `None` for names that are not a valid scope
pub fn decode_scope(name: &str) -> Option<PathScope> {
  let decoded: String = url::form_urlencoded::parse(format!("s={name}").as_bytes())
    .next()
    .map(|(_, value)| value.into_owned())?;
  let scope = PathScope::parse(&decoded).ok()?;
  // Only accept the canonical spelling so one scope never maps to two dirs.
  (encode_scope(&scope) == name).then_some(scope)
}

/// Directory of `scope` relative to a job's scopes directory.
///
/// The encoded name is ASCII without separators, so cutting it into
/// fixed-size pieces keeps the mapping injective.
pub fn scope_dir(scope: &PathScope) -> PathBuf {
  let encoded = encode_scope(scope);
  let mut dir = PathBuf::new();
  let mut rest = encoded.as_str();
  while rest.len() > MAX_SCOPE_NAME_LEN {
    let (head, tail) = rest.split_at(MAX_SCOPE_NAME_LEN);
    dir.push(head);
    rest = tail;
  }
  dir.push(rest);
  dir
}

/// Loads and saves credential stores beneath one storage root
#[derive(Debug, Clone)]
pub struct PersistenceLayer {
  root: PathBuf,
}

impl PersistenceLayer {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Key of the global store
  pub fn global_key(&self) -> StorageKey {
    StorageKey {
      owner: None,
      scope: Scope::Global,
      path: self.root.join(GLOBAL_DIR).join(CREDENTIALS_FILE_NAME),
    }
  }

  /// Key of `job`'s store for `scope`
  pub fn job_key(&self, job: &JobId, scope: &PathScope) -> StorageKey {
    StorageKey {
      owner: Some(job.clone()),
      scope: Scope::Path(scope.clone()),
      path: self.scopes_dir(job).join(scope_dir(scope)).join(CREDENTIALS_FILE_NAME),
    }
  }

  /// Directory holding every scope of `job`
  pub fn scopes_dir(&self, job: &JobId) -> PathBuf {
    self.root.join(job.relative_dir()).join(SCOPES_DIR)
  }

  /// Load the store behind `key`.
  ///
  /// A missing file yields an empty store. An unreadable, malformed or
  /// unknown-version file is logged and also yields an empty store.
  pub fn load(&self, key: &StorageKey) -> CredentialStore {
    let empty = || CredentialStore::new(key.scope.clone(), key.owner.clone()).with_location(&key.path);

    if !key.path.exists() {
      debug!(path = %key.path.display(), "No stored credentials");
      return empty();
    }

    let content = match fs::read_to_string(&key.path) {
      Ok(content) => content,
      Err(e) => {
        warn!(path = %key.path.display(), error = %e, "Failed to read credential store, starting empty");
        return empty();
      }
    };

    let document: StoreDocument = match serde_json::from_str(&content) {
      Ok(document) => document,
      Err(e) => {
        warn!(path = %key.path.display(), error = %e, "Corrupt credential store, starting empty");
        return empty();
      }
    };

    if document.version != STORE_FORMAT_VERSION {
      warn!(
        path = %key.path.display(),
        version = document.version,
        "Unsupported credential store version, starting empty"
      );
      return empty();
    }

    if let Some(stored_scope) = &document.scope
      && key.scope.as_path() != Some(stored_scope)
    {
      warn!(
        path = %key.path.display(),
        stored = %stored_scope,
        expected = %key.scope,
        "Credential store scope does not match its location, using location"
      );
    }
    if document.owner.is_some() && document.owner != key.owner {
      debug!(path = %key.path.display(), "Credential store owner differs from its location");
    }

    let records = document.credentials.into_iter().map(|(realm, record)| CredentialRecord { realm, ..record });
    CredentialStore::restored(key.scope.clone(), key.owner.clone(), records, Some(key.path.clone()))
  }

  /// Write `store` to the file behind `key`
  pub fn save(&self, key: &StorageKey, store: &CredentialStore) -> Result<(), PersistenceError> {
    write_store(&key.path, store)
  }

  /// Every scope persisted for `job`, sorted
  pub fn discover_scopes(&self, job: &JobId) -> Result<Vec<PathScope>, PersistenceError> {
    let dir = self.scopes_dir(job);
    if !dir.exists() {
      return Ok(Vec::new());
    }

    let mut scopes = Vec::new();
    let mut pending = vec![(dir.clone(), String::new())];
    while let Some((current, prefix)) = pending.pop() {
      let entries = fs::read_dir(&current).map_err(|e| PersistenceError::io("read", &current, e))?;
      for entry in entries {
        let entry = entry.map_err(|e| PersistenceError::io("read", &current, e))?;
        let path = entry.path();
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
          continue;
        };
        if !path.is_dir() {
          continue;
        }

        let encoded = format!("{prefix}{name}");
        if path.join(CREDENTIALS_FILE_NAME).is_file() {
          match decode_scope(&encoded) {
            Some(scope) if path.strip_prefix(&dir).is_ok_and(|relative| relative == scope_dir(&scope)) => {
              scopes.push(scope);
            }
            _ => warn!(dir = %path.display(), "Ignoring unrecognized scope directory"),
          }
        }
        // Only a full-length piece can continue into a longer name
        if name.len() == MAX_SCOPE_NAME_LEN {
          pending.push((path, encoded));
        }
      }
    }
    scopes.sort();
    Ok(scopes)
  }

  /// Load every persisted store of `job`
  pub fn load_job(&self, job: &JobId) -> Result<Vec<CredentialStore>, PersistenceError> {
    Ok(
      self
        .discover_scopes(job)?
        .iter()
        .map(|scope| self.load(&self.job_key(job, scope)))
        .collect(),
    )
  }
}

/// Serialize `store` and atomically replace the file at `path`
pub(crate) fn write_store(path: &Path, store: &CredentialStore) -> Result<(), PersistenceError> {
  let records = store.records();
  let document = StoreDocumentRef {
    version: STORE_FORMAT_VERSION,
    scope: store.scope().as_path(),
    owner: store.owner(),
    credentials: records.iter().map(|record| (record.realm.as_str(), record.as_ref())).collect(),
  };

  let content = serde_json::to_string_pretty(&document).map_err(|e| PersistenceError::Serialize {
    path: path.to_path_buf(),
    source: e,
  })?;

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|e| PersistenceError::io("create directory", parent, e))?;
  }

  let temp_path = path.with_extension("json.tmp");
  if let Err(e) = write_private(&temp_path, content.as_bytes()) {
    let _ = fs::remove_file(&temp_path);
    return Err(PersistenceError::io("write", &temp_path, e));
  }
  if let Err(e) = fs::rename(&temp_path, path) {
    let _ = fs::remove_file(&temp_path);
    return Err(PersistenceError::io("replace", path, e));
  }

  info!(path = %path.display(), records = records.len(), "Persisted credential store");
  Ok(())
}

/// Create `path` afresh, owner read/write only from the start, and fill it
fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
  // A leftover temp file may carry looser permissions; never reuse it.
  match fs::remove_file(path) {
    Ok(()) => {}
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
    Err(e) => return Err(e),
  }

  let mut options = fs::OpenOptions::new();
  options.write(true).create_new(true);
  #[cfg(unix)]
  {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600);
  }

  let mut file = options.open(path)?;
  file.write_all(content)?;
  file.sync_all()
}

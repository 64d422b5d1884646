//! # Credential Resolver
//!
//! Decides which store answers an authentication challenge. Job stores that
//! authorize the challenged URL are tried most specific first, then the
//! global store; if nothing matches the answer is [`Resolution::Unknown`] and
//! the transport falls back to its own discovery.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{HandoffError, PersistenceError, SubmissionError};
use crate::global::GlobalStore;
use crate::handoff::HandoffSnapshot;
use crate::job::JobId;
use crate::persistence::PersistenceLayer;
use crate::record::{CredentialRecord, Secret};
use crate::store::CredentialStore;
use crate::transport::{AuthenticationManager, ConnectionTester};
use crate::url::{PathScope, RepositoryUrl, Scope};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The stores of one job.
///
/// `stores` is only held briefly, so lookups never wait on disk I/O. Anything
/// that changes a store or writes its file holds `writer` first.
#[derive(Debug, Default)]
struct JobStores {
  stores: Mutex<Vec<CredentialStore>>,
  writer: Mutex<()>,
}

impl JobStores {
  fn new(stores: Vec<CredentialStore>) -> Self {
    Self {
      stores: Mutex::new(stores),
      writer: Mutex::new(()),
    }
  }

  fn stores(&self) -> MutexGuard<'_, Vec<CredentialStore>> {
    lock(&self.stores)
  }

  fn exclusive(&self) -> MutexGuard<'_, ()> {
    lock(&self.writer)
  }

  /// Write the store at `index` from a copy, then clear its dirty flag.
  /// Returns whether anything was written. The caller holds `writer`.
  fn persist_at(&self, index: usize) -> Result<bool, PersistenceError> {
    let mut copy = {
      let stores = self.stores();
      match stores.get(index) {
        Some(store) if store.is_dirty() => store.clone(),
        _ => return Ok(false),
      }
    };
    copy.persist()?;
    if let Some(store) = self.stores().get_mut(index) {
      store.mark_clean();
    }
    Ok(true)
  }
}

/// Outcome of resolving one challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// Found in the job store for `scope`
  Job {
    scope: PathScope,
    record: Arc<CredentialRecord>,
  },
  /// Found in the global store
  Global { record: Arc<CredentialRecord> },
  /// No store knows a credential for this challenge
  Unknown,
}

impl Resolution {
  pub fn record(&self) -> Option<&Arc<CredentialRecord>> {
    match self {
      Resolution::Job { record, .. } | Resolution::Global { record } => Some(record),
      Resolution::Unknown => None,
    }
  }

  pub fn into_record(self) -> Option<Arc<CredentialRecord>> {
    match self {
      Resolution::Job { record, .. } | Resolution::Global { record } => Some(record),
      Resolution::Unknown => None,
    }
  }

  pub fn is_unknown(&self) -> bool {
    matches!(self, Resolution::Unknown)
  }
}

/// An explicit credential submitted by an operator
#[derive(Debug, Clone)]
pub struct CredentialSubmission {
  /// Owning job, or `None` to submit into the global store
  pub job: Option<JobId>,
  pub url: RepositoryUrl,
  pub secret: Secret,
}

/// Successful outcome of [`Resolver::post_credential`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
  /// The repository accepted the credential and it was stored
  Stored { realm: String, scope: Scope },
  /// The repository never asked for credentials; nothing was stored
  NotRequired,
}

/// Result of [`Resolver::flush`]
#[derive(Debug, Default)]
pub struct FlushReport {
  /// Number of stores written
  pub persisted: usize,
  /// Stores that stayed dirty, by scope
  pub failures: Vec<(String, PersistenceError)>,
}

impl FlushReport {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }
}

/// Resolves challenges against per-job stores and the global fallback.
///
/// A resolver with a [`PersistenceLayer`] loads job stores from disk the first
/// time a job is seen and writes changes back. A detached resolver (see
/// [`Resolver::detached`]) keeps everything in memory; workers use one to
/// replay a handoff snapshot.
#[derive(Debug)]
pub struct Resolver {
  persistence: Option<PersistenceLayer>,
  global: Arc<GlobalStore>,
  jobs: Mutex<HashMap<JobId, Arc<JobStores>>>,
  autosave: bool,
}

impl Resolver {
  pub fn new(persistence: PersistenceLayer, global: Arc<GlobalStore>) -> Self {
    Self {
      persistence: Some(persistence),
      global,
      jobs: Mutex::new(HashMap::new()),
      autosave: true,
    }
  }

  /// A resolver whose global store is loaded from `persistence`
  pub fn open(persistence: PersistenceLayer) -> Self {
    let global = persistence.load(&persistence.global_key());
    Self::new(persistence, Arc::new(GlobalStore::new(global)))
  }

  /// An in-memory resolver with its own empty global store
  pub fn detached() -> Self {
    Self {
      persistence: None,
      global: Arc::new(GlobalStore::default()),
      jobs: Mutex::new(HashMap::new()),
      autosave: false,
    }
  }

  /// Whether state-changing acknowledgments are persisted immediately.
  /// When disabled, call [`Resolver::flush`] from the job's save cycle.
  pub fn with_autosave(mut self, autosave: bool) -> Self {
    self.autosave = autosave;
    self
  }

  pub fn global(&self) -> &Arc<GlobalStore> {
    &self.global
  }

  pub fn persistence(&self) -> Option<&PersistenceLayer> {
    self.persistence.as_ref()
  }

  pub fn is_detached(&self) -> bool {
    self.persistence.is_none()
  }

  /// The stores of `job`, loading them on first use
  fn job_stores(&self, job: &JobId) -> Arc<JobStores> {
    if let Some(stores) = lock(&self.jobs).get(job) {
      return Arc::clone(stores);
    }

    let loaded = match &self.persistence {
      Some(persistence) => persistence.load_job(job).unwrap_or_else(|e| {
        warn!(job = %job, error = %e, "Failed to discover stored credentials, starting empty");
        Vec::new()
      }),
      None => Vec::new(),
    };
    debug!(job = %job, stores = loaded.len(), "Loaded job credential stores");

    let mut jobs = lock(&self.jobs);
    Arc::clone(jobs.entry(job.clone()).or_insert_with(|| Arc::new(JobStores::new(loaded))))
  }

  /// Copies of every store `job` currently has, most specific first
  pub fn stores(&self, job: &JobId) -> Vec<CredentialStore> {
    let mut copies = self.job_stores(job).stores().clone();
    sort_most_specific_first(&mut copies);
    copies
  }

  /// Answer a challenge for `realm` at `url` on behalf of `job`
  pub fn resolve(&self, job: Option<&JobId>, realm: &str, url: &RepositoryUrl) -> Resolution {
    if let Some(job) = job {
      let entry = self.job_stores(job);
      let stores = entry.stores();
      let mut candidates: Vec<&CredentialStore> = stores.iter().filter(|s| s.scope().authorizes(url)).collect();
      candidates.sort_by_key(|s| std::cmp::Reverse(specificity(s)));

      for store in candidates {
        if let Some(record) = store.lookup(realm, url) {
          let Some(scope) = store.scope().as_path() else {
            continue;
          };
          debug!(job = %job, realm, %url, scope = %scope, "Resolved from job store");
          return Resolution::Job {
            scope: scope.clone(),
            record,
          };
        }
      }
    }

    if let Some(record) = self.global.lookup(realm, url) {
      debug!(realm, %url, "Resolved from global store");
      return Resolution::Global { record };
    }

    debug!(realm, %url, "No stored credential");
    Resolution::Unknown
  }

  /// An authentication manager bound to `job` for the transport to call
  pub fn authentication_manager(&self, job: Option<JobId>) -> JobAuthenticator<'_> {
    JobAuthenticator { resolver: self, job }
  }

  /// Learn from an authentication outcome reported by the transport.
  ///
  /// Rejections and empty credentials are ignored. A credential equal to the
  /// one resolution already yields is ignored too. Anything else goes into the
  /// most specific job store authorizing `url` (created for `url` when none
  /// does), or into the global store when there is no job. Returns whether a
  /// store changed.
  pub fn acknowledge(
    &self,
    job: Option<&JobId>,
    accepted: bool,
    realm: &str,
    url: &RepositoryUrl,
    credential: Option<&Secret>,
  ) -> bool {
    if !accepted {
      debug!(realm, %url, "Authentication rejected, keeping stored credentials");
      return false;
    }
    let Some(secret) = credential else {
      debug!(realm, %url, "Acknowledgment without credential");
      return false;
    };
    if let Some(current) = self.resolve(job, realm, url).record()
      && &current.secret == secret
    {
      return false;
    }

    let record = CredentialRecord::acknowledged(realm, secret.clone());
    match job {
      Some(job) => self.store_in_job(job, url, record, Placement::MostSpecific),
      None => self.store_in_global(record),
    }
  }

  /// Store an explicitly submitted credential after the transport has
  /// verified it.
  ///
  /// The submission is checked by connecting to its URL with a one-shot
  /// authentication manager that offers only the submitted secret, so
  /// whatever the transport has cached for the realm is never consulted. The
  /// accepted record goes into the job store scoped exactly to the URL, or
  /// into the global store when the submission has no job.
  ///
  /// # Errors
  ///
  /// [`SubmissionError::Rejected`] when the repository refuses the
  /// credential; nothing is stored in that case.
  pub fn post_credential(
    &self,
    submission: CredentialSubmission,
    tester: &dyn ConnectionTester,
  ) -> Result<Submission, SubmissionError> {
    let CredentialSubmission { job, url, secret } = submission;
    let authenticator = SubmissionAuthenticator::new(secret.clone());
    tester.test_connection(&url, &authenticator)?;

    let Some(realm) = authenticator.accepted_realm() else {
      info!(%url, "Repository did not ask for credentials");
      return Ok(Submission::NotRequired);
    };

    let record = CredentialRecord::submitted(&realm, secret);
    let scope = match &job {
      Some(job) => {
        let scope = PathScope::new(url.clone());
        self.store_in_job(job, &url, record, Placement::Exact);
        if let Some(failure) = self.persist_job_scope(job, &scope) {
          return Err(failure.into());
        }
        Scope::Path(scope)
      }
      None => {
        self.global.acknowledge(&realm, Some(record));
        if self.autosave && !self.is_detached() {
          self.global.persist()?;
        }
        Scope::Global
      }
    };

    info!(realm, scope = %scope, "Stored submitted credential");
    Ok(Submission::Stored { realm, scope })
  }

  fn store_in_global(&self, record: CredentialRecord) -> bool {
    let realm = record.realm.clone();
    let changed = self.global.acknowledge(&realm, Some(record));
    if changed
      && self.autosave
      && !self.is_detached()
      && let Err(e) = self.global.persist()
    {
      warn!(error = %e, "Failed to persist global credentials; they stay in memory");
    }
    changed
  }

  fn store_in_job(&self, job: &JobId, url: &RepositoryUrl, record: CredentialRecord, placement: Placement) -> bool {
    let entry = self.job_stores(job);
    let _writer = entry.exclusive();
    let stores = entry.stores();

    let position = match placement {
      Placement::MostSpecific => stores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.scope().authorizes(url))
        .max_by_key(|(_, s)| specificity(s))
        .map(|(i, _)| i),
      Placement::Exact => stores
        .iter()
        .position(|s| s.scope().as_path().is_some_and(|scope| scope.base() == url)),
    };

    let mut stores = match position {
      Some(_) => stores,
      None => {
        drop(stores);
        let scope = PathScope::new(url.clone());
        let store = match &self.persistence {
          Some(persistence) => persistence.load(&persistence.job_key(job, &scope)),
          None => CredentialStore::for_job(job.clone(), scope),
        };
        debug!(job = %job, scope = %store.scope(), "Created job credential store");
        let mut stores = entry.stores();
        stores.push(store);
        stores
      }
    };
    let index = position.unwrap_or(stores.len() - 1);

    let realm = record.realm.clone();
    let changed = stores[index].acknowledge(&realm, Some(record));
    let scope = stores[index].scope().clone();
    drop(stores);

    if changed
      && self.autosave
      && !self.is_detached()
      && let Err(e) = entry.persist_at(index)
    {
      warn!(job = %job, scope = %scope, error = %e, "Failed to persist job credentials; they stay in memory");
    }
    changed
  }

  /// Persist one job store if it is dirty and saving is automatic
  fn persist_job_scope(&self, job: &JobId, scope: &PathScope) -> Option<PersistenceError> {
    if !self.autosave || self.is_detached() {
      return None;
    }
    let entry = self.job_stores(job);
    let _writer = entry.exclusive();
    let index = entry.stores().iter().position(|s| s.scope().as_path() == Some(scope))?;
    entry.persist_at(index).err()
  }

  /// Persist every dirty store. Failed stores stay dirty and are reported.
  pub fn flush(&self) -> FlushReport {
    let mut report = FlushReport::default();
    if self.is_detached() {
      return report;
    }

    if self.global.is_dirty() {
      match self.global.persist() {
        Ok(()) => report.persisted += 1,
        Err(e) => {
          warn!(error = %e, "Failed to persist global credentials");
          report.failures.push((Scope::Global.to_string(), e));
        }
      }
    }

    let jobs: Vec<(JobId, Arc<JobStores>)> = lock(&self.jobs)
      .iter()
      .map(|(job, entry)| (job.clone(), Arc::clone(entry)))
      .collect();
    for (job, entry) in jobs {
      let _writer = entry.exclusive();
      let dirty: Vec<(usize, Scope)> = entry
        .stores()
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_dirty())
        .map(|(index, s)| (index, s.scope().clone()))
        .collect();
      for (index, scope) in dirty {
        match entry.persist_at(index) {
          Ok(true) => report.persisted += 1,
          Ok(false) => {}
          Err(e) => {
            warn!(job = %job, scope = %scope, error = %e, "Failed to persist job credentials");
            report.failures.push((format!("{job} {scope}"), e));
          }
        }
      }
    }

    report
  }

  /// Package what a worker needs to build `job` against `urls`: the job
  /// scopes that authorize any of them and every global record
  pub fn snapshot_for(&self, job: &JobId, urls: &[RepositoryUrl]) -> HandoffSnapshot {
    let scopes = self
      .stores(job)
      .into_iter()
      .filter(|store| !store.is_empty() && urls.iter().any(|url| store.scope().authorizes(url)))
      .collect::<Vec<_>>();
    HandoffSnapshot::capture(job, &scopes, Some(&self.global.snapshot()))
  }

  /// Package the stores of `job` that changed since this resolver was built,
  /// so the controller can [`absorb`](Resolver::absorb) them
  pub fn returned_snapshot(&self, job: &JobId) -> HandoffSnapshot {
    let dirty: Vec<CredentialStore> = self.stores(job).into_iter().filter(CredentialStore::is_dirty).collect();
    let global = self.global.snapshot();
    HandoffSnapshot::capture(job, &dirty, global.is_dirty().then_some(&global))
  }

  /// Merge a snapshot returned by a worker, through the same acknowledgment
  /// rules as local changes. Returns the number of records that changed.
  pub fn absorb(&self, snapshot: &HandoffSnapshot) -> Result<usize, HandoffError> {
    snapshot.check_version()?;
    let mut changed = 0;

    for (scope, records) in snapshot.scoped_records()? {
      for record in records {
        if self.store_in_job(snapshot.job(), scope.base(), record, Placement::Exact) {
          changed += 1;
        }
      }
    }
    for record in snapshot.global_records() {
      if self.store_in_global(record) {
        changed += 1;
      }
    }

    info!(job = %snapshot.job(), changed, "Absorbed returned credentials");
    Ok(changed)
  }

  /// Seed a detached resolver from a snapshot, leaving every store clean
  pub(crate) fn seed(&self, job: &JobId, scopes: Vec<(PathScope, Vec<CredentialRecord>)>, global: Vec<CredentialRecord>) {
    let entry = self.job_stores(job);
    let _writer = entry.exclusive();
    let mut stores = entry.stores();
    for (scope, records) in scopes {
      let mut store = CredentialStore::for_job(job.clone(), scope);
      for record in records {
        let realm = record.realm.clone();
        store.acknowledge(&realm, Some(record));
      }
      store.mark_clean();
      stores.push(store);
    }
    drop(stores);

    for record in global {
      let realm = record.realm.clone();
      self.global.acknowledge(&realm, Some(record));
    }
    self.global.mark_clean();
  }

  #[cfg(test)]
  fn job_count(&self) -> usize {
    lock(&self.jobs).len()
  }
}

#[derive(Debug, Clone, Copy)]
enum Placement {
  MostSpecific,
  Exact,
}

fn specificity(store: &CredentialStore) -> usize {
  store.scope().as_path().map_or(0, PathScope::specificity)
}

fn sort_most_specific_first(stores: &mut [CredentialStore]) {
  stores.sort_by(|a, b| {
    specificity(b)
      .cmp(&specificity(a))
      .then_with(|| a.scope().as_path().cmp(&b.scope().as_path()))
  });
}

/// The authentication manager handed to the transport for one job
#[derive(Debug)]
pub struct JobAuthenticator<'a> {
  resolver: &'a Resolver,
  job: Option<JobId>,
}

impl JobAuthenticator<'_> {
  pub fn job(&self) -> Option<&JobId> {
    self.job.as_ref()
  }
}

impl AuthenticationManager for JobAuthenticator<'_> {
  fn first_authentication(&self, realm: &str, url: &RepositoryUrl) -> Option<Arc<CredentialRecord>> {
    self.resolver.resolve(self.job.as_ref(), realm, url).into_record()
  }

  fn acknowledge_authentication(&self, accepted: bool, realm: &str, url: &RepositoryUrl, credential: Option<&Secret>) {
    self.resolver.acknowledge(self.job.as_ref(), accepted, realm, url, credential);
  }
}

/// Offers one secret, once per realm, and remembers which realm accepted it
#[derive(Debug)]
struct SubmissionAuthenticator {
  secret: Secret,
  offered: Mutex<HashSet<String>>,
  accepted: Mutex<Option<String>>,
}

impl SubmissionAuthenticator {
  fn new(secret: Secret) -> Self {
    Self {
      secret,
      offered: Mutex::new(HashSet::new()),
      accepted: Mutex::new(None),
    }
  }

  /// The realm that accepted the secret. A successful connection after an
  /// offer counts as acceptance even if the transport never acknowledged.
  fn accepted_realm(&self) -> Option<String> {
    if let Some(realm) = lock(&self.accepted).clone() {
      return Some(realm);
    }
    let offered = lock(&self.offered);
    let mut realms: Vec<&String> = offered.iter().collect();
    realms.sort();
    realms.first().map(|realm| realm.to_string())
  }
}

impl AuthenticationManager for SubmissionAuthenticator {
  fn first_authentication(&self, realm: &str, _url: &RepositoryUrl) -> Option<Arc<CredentialRecord>> {
    if !lock(&self.offered).insert(realm.to_string()) {
      return None;
    }
    Some(Arc::new(CredentialRecord::submitted(realm, self.secret.clone())))
  }

  fn acknowledge_authentication(&self, accepted: bool, realm: &str, _url: &RepositoryUrl, credential: Option<&Secret>) {
    if accepted && credential == Some(&self.secret) {
      *lock(&self.accepted) = Some(realm.to_string());
    }
  }
}

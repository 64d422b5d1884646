//! # Credscope Core
//!
//! Per-job, path-scoped credential stores for version-control access in build
//! automation, plus the resolver that answers a transport's authentication
//! challenges from them.
//!
//! Credentials are stored per job and per repository path. A credential
//! registered against a path serves every URL beneath it. Job credentials are
//! preferred over the process-wide [`GlobalStore`], which acts as a fallback
//! for every job and repository.

pub mod config;
pub mod error;
pub mod global;
pub mod handoff;
pub mod job;
pub mod persistence;
pub mod record;
pub mod resolver;
pub mod scm;
pub mod store;
pub mod transport;
pub mod url;

pub use config::{ConfigDirs, STORE_ROOT_ENV, Settings};
pub use error::{HandoffError, JobIdError, PersistenceError, ConnectionError, SubmissionError, UrlError};
pub use global::GlobalStore;
pub use handoff::HandoffSnapshot;
pub use job::JobId;
pub use persistence::{CREDENTIALS_FILE_NAME, PersistenceLayer, StorageKey};
pub use record::{CreatedBy, CredentialRecord, Secret};
pub use resolver::{CredentialSubmission, FlushReport, JobAuthenticator, Resolution, Resolver, Submission};
pub use scm::{ModuleLocation, ScmSettings, UpdatePlan, WorkspaceUpdater};
pub use store::CredentialStore;
pub use transport::{AuthenticationManager, NoAuthentication, ConnectionTester};
pub use crate::url::{PathScope, RepositoryUrl, Scope};

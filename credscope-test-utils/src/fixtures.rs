//! Small constructors that keep test bodies readable

use credscope_core::{JobId, RepositoryUrl};

/// Parse a repository URL, panicking on invalid test input
pub fn url(input: &str) -> RepositoryUrl {
  RepositoryUrl::parse(input).unwrap_or_else(|e| panic!("invalid test URL {input}: {e}"))
}

/// Parse a job name, panicking on invalid test input
pub fn job(name: &str) -> JobId {
  JobId::parse(name).unwrap_or_else(|e| panic!("invalid test job {name}: {e}"))
}

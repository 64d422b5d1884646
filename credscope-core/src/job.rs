//! # Job Identity
//!
//! Identifies the build job a credential store belongs to, including the
//! individual configurations a matrix job expands into. Every identity maps to
//! its own relative storage directory.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised for names that cannot safely become directory names
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobIdError {
  #[error("Job name cannot be empty")]
  Empty,
  #[error("Invalid job name segment '{0}': segments must not be '.', '..', or contain separators or control characters")]
  InvalidSegment(String),
  #[error("Invalid matrix axis '{0}': expected name=value")]
  InvalidAxis(String),
}

// Anything except separators, NUL and control characters.
static SEGMENT_PATTERN: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[^/\\\x00-\x1f\x7f]+$").expect("Failed to compile job segment regex"));

fn validate_segment(segment: &str) -> Result<(), JobIdError> {
  if segment == "." || segment == ".." || !SEGMENT_PATTERN.is_match(segment) {
    return Err(JobIdError::InvalidSegment(segment.to_string()));
  }
  Ok(())
}

/// One axis value of a matrix configuration, e.g. `db=mysql`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawAxis")]
pub struct Axis {
  pub name: String,
  pub value: String,
}

impl Axis {
  pub fn new(name: &str, value: &str) -> Result<Self, JobIdError> {
    validate_segment(name)?;
    validate_segment(value)?;
    Ok(Self {
      name: name.to_string(),
      value: value.to_string(),
    })
  }

  /// Parse `name=value`
  pub fn parse(input: &str) -> Result<Self, JobIdError> {
    let (name, value) = input
      .split_once('=')
      .ok_or_else(|| JobIdError::InvalidAxis(input.to_string()))?;
    Self::new(name.trim(), value.trim())
  }
}

#[derive(Deserialize)]
struct RawAxis {
  name: String,
  value: String,
}

impl TryFrom<RawAxis> for Axis {
  type Error = JobIdError;

  fn try_from(raw: RawAxis) -> Result<Self, Self::Error> {
    Self::new(&raw.name, &raw.value)
  }
}

/// Full identity of a job, or of one configuration of a matrix job.
///
/// # Examples
///
/// ```
/// use credscope_core::job::JobId;
///
/// let job = JobId::parse("team/matrix").unwrap();
/// let config = job.configuration(&[("db", "mysql")]).unwrap();
/// assert_eq!(config.to_string(), "team/matrix/db=mysql");
/// assert_eq!(
///   config.relative_dir(),
///   std::path::Path::new("jobs/team/jobs/matrix/configurations/axis-db/mysql")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawJobId")]
pub struct JobId {
  path: Vec<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  configuration: Vec<Axis>,
}

/// Serialized form, validated before it becomes a [`JobId`]
#[derive(Deserialize)]
struct RawJobId {
  path: Vec<String>,
  #[serde(default)]
  configuration: Vec<Axis>,
}

impl TryFrom<RawJobId> for JobId {
  type Error = JobIdError;

  fn try_from(raw: RawJobId) -> Result<Self, Self::Error> {
    if raw.path.is_empty() {
      return Err(JobIdError::Empty);
    }
    for segment in &raw.path {
      validate_segment(segment)?;
    }
    Ok(Self {
      path: raw.path,
      configuration: raw.configuration,
    })
  }
}

impl JobId {
  /// Parse a `/`-separated full job name (folders first, job last)
  pub fn parse(full_name: &str) -> Result<Self, JobIdError> {
    let trimmed = full_name.trim().trim_matches('/');
    if trimmed.is_empty() {
      return Err(JobIdError::Empty);
    }

    let path = trimmed
      .split('/')
      .map(|segment| {
        validate_segment(segment)?;
        Ok(segment.to_string())
      })
      .collect::<Result<Vec<_>, JobIdError>>()?;

    Ok(Self {
      path,
      configuration: Vec::new(),
    })
  }

  /// Derive the identity of one matrix configuration of this job.
  ///
  /// Axes keep the order given; the same combination must always be passed in
  /// the same order to reach the same storage.
  pub fn configuration(&self, axes: &[(&str, &str)]) -> Result<Self, JobIdError> {
    let mut configuration = self.configuration.clone();
    for (name, value) in axes {
      configuration.push(Axis::new(name, value)?);
    }
    Ok(Self {
      path: self.path.clone(),
      configuration,
    })
  }

  /// Like [`JobId::configuration`] but from already-validated axes
  pub fn with_axes(&self, axes: Vec<Axis>) -> Self {
    let mut configuration = self.configuration.clone();
    configuration.extend(axes);
    Self {
      path: self.path.clone(),
      configuration,
    }
  }

  /// The full job name without the configuration part
  pub fn full_name(&self) -> String {
    self.path.join("/")
  }

  pub fn is_configuration(&self) -> bool {
    !self.configuration.is_empty()
  }

  pub fn axes(&self) -> &[Axis] {
    &self.configuration
  }

  /// The matrix parent of a configuration, or `None` for a plain job
  pub fn parent(&self) -> Option<JobId> {
    if self.configuration.is_empty() {
      return None;
    }
    Some(Self {
      path: self.path.clone(),
      configuration: Vec::new(),
    })
  }

  /// Storage directory relative to the credential root.
  ///
  /// Nested jobs live under `jobs/` and matrix configurations under
  /// `configurations/axis-<name>/<value>`, so a folder named like a
  /// configuration can never land on the same directory.
  pub fn relative_dir(&self) -> PathBuf {
    let mut dir = PathBuf::new();
    for segment in &self.path {
      dir.push("jobs");
      dir.push(segment);
    }
    if !self.configuration.is_empty() {
      dir.push("configurations");
      for axis in &self.configuration {
        dir.push(format!("axis-{}", axis.name));
        dir.push(&axis.value);
      }
    }
    dir
  }
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.full_name())?;
    if !self.configuration.is_empty() {
      let combination: Vec<String> = self
        .configuration
        .iter()
        .map(|axis| format!("{}={}", axis.name, axis.value))
        .collect();
      write!(f, "/{}", combination.join(","))?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;

  #[test]
  fn test_parse_simple_job() {
    let job = JobId::parse("assembly").unwrap();
    assert_eq!(job.full_name(), "assembly");
    assert_eq!(job.relative_dir(), Path::new("jobs/assembly"));
    assert!(!job.is_configuration());
    assert!(job.parent().is_none());
  }

  #[test]
  fn test_parse_folder_job() {
    let job = JobId::parse("/team/backend/").unwrap();
    assert_eq!(job.to_string(), "team/backend");
    assert_eq!(job.relative_dir(), Path::new("jobs/team/jobs/backend"));
  }

  #[test]
  fn test_parse_rejects_empty_and_unsafe_segments() {
    assert_eq!(JobId::parse(""), Err(JobIdError::Empty));
    assert_eq!(JobId::parse("/"), Err(JobIdError::Empty));
    assert!(matches!(JobId::parse("team/../etc"), Err(JobIdError::InvalidSegment(_))));
    assert!(matches!(JobId::parse("team//job"), Err(JobIdError::InvalidSegment(_))));
    assert!(matches!(JobId::parse("a\\b"), Err(JobIdError::InvalidSegment(_))));
    assert!(matches!(JobId::parse("bad\nname"), Err(JobIdError::InvalidSegment(_))));
  }

  #[test]
  fn test_matrix_configurations_get_distinct_directories() {
    let matrix = JobId::parse("matrix").unwrap();
    let mysql = matrix.configuration(&[("db", "mysql")]).unwrap();
    let oracle = matrix.configuration(&[("db", "oracle")]).unwrap();

    assert_ne!(mysql.relative_dir(), oracle.relative_dir());
    assert_ne!(mysql.relative_dir(), matrix.relative_dir());
    assert_eq!(
      mysql.relative_dir(),
      Path::new("jobs/matrix/configurations/axis-db/mysql")
    );
    assert!(mysql.relative_dir().starts_with(matrix.relative_dir()));
    assert_eq!(mysql.parent(), Some(matrix));
  }

  #[test]
  fn test_folder_named_like_configuration_does_not_collide() {
    let folder_job = JobId::parse("matrix/configurations/axis-db/mysql").unwrap();
    let configuration = JobId::parse("matrix").unwrap().configuration(&[("db", "mysql")]).unwrap();
    assert_ne!(folder_job.relative_dir(), configuration.relative_dir());
  }

  #[test]
  fn test_axis_parse() {
    assert_eq!(Axis::parse("db=mysql").unwrap(), Axis::new("db", "mysql").unwrap());
    assert!(matches!(Axis::parse("db"), Err(JobIdError::InvalidAxis(_))));
    assert!(matches!(Axis::parse("db=.."), Err(JobIdError::InvalidSegment(_))));
  }

  // Tests for deserialization

  #[test]
  fn test_deserialize_valid_job() {
    let config: JobId =
      serde_json::from_str(r#"{"path":["team","matrix"],"configuration":[{"name":"db","value":"mysql"}]}"#).unwrap();
    assert_eq!(config, JobId::parse("team/matrix").unwrap().configuration(&[("db", "mysql")]).unwrap());
  }

  #[test]
  fn test_deserialize_rejects_unsafe_segments() {
    for input in [
      r#"{"path":[]}"#,
      r#"{"path":["/tmp/elsewhere"]}"#,
      r#"{"path":["team","a/../.."]}"#,
      r#"{"path":[".."]}"#,
      r#"{"path":[""]}"#,
      r#"{"path":["a\\b"]}"#,
      r#"{"path":["matrix"],"configuration":[{"name":"db","value":"/etc"}]}"#,
      r#"{"path":["matrix"],"configuration":[{"name":"..","value":"mysql"}]}"#,
    ] {
      assert!(serde_json::from_str::<JobId>(input).is_err(), "accepted {input}");
    }
  }

  #[test]
  fn test_display_includes_combination() {
    let config = JobId::parse("matrix")
      .unwrap()
      .configuration(&[("db", "mysql"), ("os", "linux")])
      .unwrap();
    assert_eq!(config.to_string(), "matrix/db=mysql,os=linux");
  }
}

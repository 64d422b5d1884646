//! # SCM Settings
//!
//! A job's repository configuration: which repository locations it checks
//! out, and how an existing workspace is brought up to date. The declared
//! locations are what a handoff snapshot is scoped to.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::url::RepositoryUrl;

/// How a workspace is brought up to date before a build.
///
/// Persisted as a string tag. Tags written by older releases that named the
/// strategy by class still load as the matching variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkspaceUpdater {
  /// Delete the workspace and check out fresh
  #[serde(alias = "hudson.scm.subversion.CheckoutUpdater")]
  Checkout,
  /// Update in place, keeping local changes
  #[default]
  #[serde(alias = "hudson.scm.subversion.UpdateUpdater")]
  Update,
  /// Update, then delete unversioned and ignored files
  #[serde(alias = "hudson.scm.subversion.UpdateWithCleanUpdater")]
  UpdateWithClean,
  /// Revert local modifications, then update
  #[serde(alias = "hudson.scm.subversion.UpdateWithRevertUpdater")]
  UpdateWithRevert,
}

/// Steps an executor performs for one [`WorkspaceUpdater`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdatePlan {
  pub fresh_checkout: bool,
  pub revert_local_changes: bool,
  pub remove_unversioned: bool,
}

impl WorkspaceUpdater {
  /// Map the pre-strategy boolean settings onto a variant
  pub fn from_legacy(use_update: bool, do_revert: bool) -> Self {
    if do_revert {
      WorkspaceUpdater::UpdateWithRevert
    } else if use_update {
      WorkspaceUpdater::Update
    } else {
      WorkspaceUpdater::Checkout
    }
  }

  pub fn plan(self) -> UpdatePlan {
    match self {
      WorkspaceUpdater::Checkout => UpdatePlan {
        fresh_checkout: true,
        revert_local_changes: false,
        remove_unversioned: false,
      },
      WorkspaceUpdater::Update => UpdatePlan {
        fresh_checkout: false,
        revert_local_changes: false,
        remove_unversioned: false,
      },
      WorkspaceUpdater::UpdateWithClean => UpdatePlan {
        fresh_checkout: false,
        revert_local_changes: false,
        remove_unversioned: true,
      },
      WorkspaceUpdater::UpdateWithRevert => UpdatePlan {
        fresh_checkout: false,
        revert_local_changes: true,
        remove_unversioned: false,
      },
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      WorkspaceUpdater::Checkout => "checkout",
      WorkspaceUpdater::Update => "update",
      WorkspaceUpdater::UpdateWithClean => "update-with-clean",
      WorkspaceUpdater::UpdateWithRevert => "update-with-revert",
    }
  }
}

/// One repository location checked out into the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLocation {
  pub remote: RepositoryUrl,
  /// Directory relative to the workspace; defaults to the last path segment
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub local: Option<String>,
}

impl ModuleLocation {
  pub fn new(remote: RepositoryUrl) -> Self {
    Self { remote, local: None }
  }

  pub fn local_dir(&self) -> String {
    self
      .local
      .clone()
      .or_else(|| self.remote.segments().last().cloned())
      .unwrap_or_else(|| ".".to_string())
  }
}

/// Repository configuration of one job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawScmSettings")]
pub struct ScmSettings {
  pub workspace_updater: WorkspaceUpdater,
  pub locations: Vec<ModuleLocation>,
}

/// Accepts both the strategy tag and the older boolean form
#[derive(Deserialize)]
struct RawScmSettings {
  #[serde(default)]
  locations: Vec<ModuleLocation>,
  workspace_updater: Option<WorkspaceUpdater>,
  use_update: Option<bool>,
  do_revert: Option<bool>,
}

impl From<RawScmSettings> for ScmSettings {
  fn from(raw: RawScmSettings) -> Self {
    let workspace_updater = match (raw.workspace_updater, raw.use_update, raw.do_revert) {
      (Some(updater), _, _) => updater,
      (None, None, None) => WorkspaceUpdater::default(),
      (None, use_update, do_revert) => {
        WorkspaceUpdater::from_legacy(use_update.unwrap_or(false), do_revert.unwrap_or(false))
      }
    };
    Self {
      locations: raw.locations,
      workspace_updater,
    }
  }
}

impl ScmSettings {
  pub fn from_toml(content: &str) -> Result<Self> {
    toml::from_str(content).context("Failed to parse SCM settings")
  }

  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Self::from_toml(&content).with_context(|| format!("Invalid SCM settings in {}", path.display()))
  }

  pub fn to_toml(&self) -> Result<String> {
    toml::to_string_pretty(self).context("Failed to serialize SCM settings")
  }

  /// Remote URLs of every location, in declaration order
  pub fn repository_urls(&self) -> Vec<RepositoryUrl> {
    self.locations.iter().map(|location| location.remote.clone()).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_legacy_class_tags() {
    for (tag, expected) in [
      ("hudson.scm.subversion.UpdateUpdater", WorkspaceUpdater::Update),
      ("hudson.scm.subversion.CheckoutUpdater", WorkspaceUpdater::Checkout),
      ("hudson.scm.subversion.UpdateWithRevertUpdater", WorkspaceUpdater::UpdateWithRevert),
      ("hudson.scm.subversion.UpdateWithCleanUpdater", WorkspaceUpdater::UpdateWithClean),
    ] {
      let settings = ScmSettings::from_toml(&format!("workspace_updater = \"{tag}\"")).unwrap();
      assert_eq!(settings.workspace_updater, expected, "tag {tag}");
    }
  }

  #[test]
  fn test_legacy_boolean_form() {
    let update = ScmSettings::from_toml("use_update = true").unwrap();
    assert_eq!(update.workspace_updater, WorkspaceUpdater::Update);

    let checkout = ScmSettings::from_toml("use_update = false").unwrap();
    assert_eq!(checkout.workspace_updater, WorkspaceUpdater::Checkout);

    let revert = ScmSettings::from_toml("use_update = true\ndo_revert = true").unwrap();
    assert_eq!(revert.workspace_updater, WorkspaceUpdater::UpdateWithRevert);
  }

  #[test]
  fn test_strategy_tag_wins_over_booleans() {
    let settings = ScmSettings::from_toml("workspace_updater = \"update-with-clean\"\nuse_update = false").unwrap();
    assert_eq!(settings.workspace_updater, WorkspaceUpdater::UpdateWithClean);
  }

  #[test]
  fn test_default_is_update() {
    let settings = ScmSettings::from_toml("").unwrap();
    assert_eq!(settings.workspace_updater, WorkspaceUpdater::Update);
    assert!(settings.locations.is_empty());
  }

  #[test]
  fn test_plans() {
    assert!(WorkspaceUpdater::Checkout.plan().fresh_checkout);
    assert!(WorkspaceUpdater::UpdateWithRevert.plan().revert_local_changes);
    assert!(WorkspaceUpdater::UpdateWithClean.plan().remove_unversioned);
    let update = WorkspaceUpdater::Update.plan();
    assert!(!update.fresh_checkout && !update.revert_local_changes && !update.remove_unversioned);
  }

  #[test]
  fn test_locations_and_round_trip() {
    let content = r#"
workspace_updater = "update-with-revert"

[[locations]]
remote = "svn://localhost/repo/assembly/"

[[locations]]
remote = "svn://localhost/repo/package/trunk"
local = "pkg"
"#;
    let settings = ScmSettings::from_toml(content).unwrap();
    assert_eq!(settings.locations.len(), 2);
    assert_eq!(settings.locations[0].remote.to_string(), "svn://localhost/repo/assembly");
    assert_eq!(settings.locations[0].local_dir(), "assembly");
    assert_eq!(settings.locations[1].local_dir(), "pkg");
    assert_eq!(settings.repository_urls().len(), 2);

    let written = settings.to_toml().unwrap();
    assert!(written.contains("update-with-revert"));
    assert_eq!(ScmSettings::from_toml(&written).unwrap(), settings);
  }

  #[test]
  fn test_invalid_location_is_rejected() {
    assert!(ScmSettings::from_toml("[[locations]]\nremote = \"not a url\"").is_err());
  }
}

//! # Configuration Management
//!
//! Platform directories and user settings, including where credential stores
//! live and whether changes are written immediately.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::persistence::PersistenceLayer;
use crate::resolver::Resolver;

/// Environment variable that overrides the credential storage root
pub const STORE_ROOT_ENV: &str = "CREDSCOPE_HOME";

/// Configuration directories for credscope
#[derive(Debug, Clone)]
pub struct ConfigDirs {
  pub config_dir: PathBuf,
  pub data_dir: PathBuf,
}

impl ConfigDirs {
  pub fn new() -> Result<Self> {
    let proj_dirs =
      ProjectDirs::from("eddieland", "", "credscope").context("Failed to determine project directories")?;

    Ok(Self {
      config_dir: proj_dirs.config_dir().to_path_buf(),
      data_dir: proj_dirs.data_dir().to_path_buf(),
    })
  }

  /// Directories rooted under one base path, used when `CREDSCOPE_HOME` is set
  pub fn rooted(base: impl Into<PathBuf>) -> Self {
    let base = base.into();
    Self {
      config_dir: base.join("config"),
      data_dir: base,
    }
  }

  /// Honor `CREDSCOPE_HOME` when it is set, otherwise use platform directories
  pub fn from_env() -> Result<Self> {
    match std::env::var_os(STORE_ROOT_ENV) {
      Some(home) if !home.is_empty() => Ok(Self::rooted(home)),
      _ => Self::new(),
    }
  }

  pub fn config_dir(&self) -> &PathBuf {
    &self.config_dir
  }

  pub fn data_dir(&self) -> &PathBuf {
    &self.data_dir
  }

  /// Path to the settings file
  pub fn settings_path(&self) -> PathBuf {
    self.config_dir.join("config.toml")
  }

  /// Default credential root when settings do not name one
  pub fn default_store_root(&self) -> PathBuf {
    self.data_dir.join("credentials")
  }

  /// Load settings from file or return defaults
  pub fn load_settings(&self) -> Result<Settings> {
    let path = self.settings_path();
    if !path.exists() {
      return Ok(Settings::default());
    }

    let content =
      fs::read_to_string(&path).with_context(|| format!("Failed to read settings from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse settings from {}", path.display()))
  }

  /// Save settings to file
  pub fn save_settings(&self, settings: &Settings) -> Result<()> {
    let path = self.settings_path();
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let content = toml::to_string_pretty(settings).context("Failed to serialize settings to TOML")?;
    fs::write(&path, content).with_context(|| format!("Failed to write settings to {}", path.display()))?;
    Ok(())
  }
}

/// User settings read from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
  /// Persist a store as soon as an acknowledgment changes it
  pub autosave: bool,
  /// Root of all credential storage
  #[serde(skip_serializing_if = "Option::is_none")]
  pub store_root: Option<PathBuf>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      autosave: true,
      store_root: None,
    }
  }
}

impl Settings {
  /// The credential root: `env_override` if given, then `store_root`, then
  /// the platform default
  pub fn store_root_with(&self, dirs: &ConfigDirs, env_override: Option<OsString>) -> PathBuf {
    if let Some(root) = env_override.filter(|root| !root.is_empty()) {
      return PathBuf::from(root);
    }
    self.store_root.clone().unwrap_or_else(|| dirs.default_store_root())
  }

  /// The credential root, honoring `CREDSCOPE_HOME`
  pub fn store_root(&self, dirs: &ConfigDirs) -> PathBuf {
    self.store_root_with(dirs, std::env::var_os(STORE_ROOT_ENV))
  }

  /// A resolver over the configured storage root
  pub fn open_resolver(&self, dirs: &ConfigDirs) -> Resolver {
    Resolver::open(PersistenceLayer::new(self.store_root(dirs))).with_autosave(self.autosave)
  }
}

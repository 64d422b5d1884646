//! # Export Command
//!
//! Writes the handoff snapshot a build worker needs for one job.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use clap::Args;
use credscope_core::{RepositoryUrl, ScmSettings};

use super::{CommandContext, JobArgs};
use crate::output::{format_path, print_success};

/// Write a handoff snapshot for a build worker
#[derive(Args)]
pub struct ExportArgs {
  #[command(flatten)]
  pub job: JobArgs,

  /// Repository URL the build will access (repeatable)
  #[arg(long = "url", value_name = "URL")]
  pub urls: Vec<String>,

  /// SCM settings file whose locations the build will access
  #[arg(long, value_name = "FILE")]
  pub scm: Option<PathBuf>,

  /// Write to a file instead of stdout
  #[arg(short, long, value_name = "FILE")]
  pub output: Option<PathBuf>,
}

pub(crate) fn handle_export_command(ctx: &CommandContext, args: ExportArgs) -> Result<()> {
  let job = args.job.required_job_id()?;

  let mut urls = args
    .urls
    .iter()
    .map(|url| RepositoryUrl::parse(url).with_context(|| format!("Invalid repository URL '{url}'")))
    .collect::<Result<Vec<_>>>()?;
  if let Some(path) = &args.scm {
    urls.extend(ScmSettings::load(path)?.repository_urls());
  }
  if urls.is_empty() {
    bail!("No repository URLs given; use --url or --scm");
  }

  let snapshot = ctx.resolver.snapshot_for(&job, &urls);
  let encoded = snapshot.encode()?;

  match &args.output {
    Some(path) => {
      write_private(path, &encoded)?;
      print_success(&format!(
        "Wrote {} credential(s) for job {job} to {}",
        snapshot.record_count(),
        format_path(&path.display().to_string())
      ));
    }
    None => println!("{encoded}"),
  }
  Ok(())
}

/// Snapshots carry secrets; keep the file owner-only
fn write_private(path: &Path, content: &str) -> Result<()> {
  fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
      .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
  }
  Ok(())
}

//! # Import Command
//!
//! Merges credentials a build worker learned back into the stores.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use credscope_core::HandoffSnapshot;

use super::{CommandContext, JobArgs};
use crate::output::{print_error, print_info, print_success};

/// Merge a snapshot returned by a build worker
#[derive(Args)]
pub struct ImportArgs {
  #[command(flatten)]
  pub job: JobArgs,

  /// Snapshot file produced by the worker
  pub file: PathBuf,
}

pub(crate) fn handle_import_command(ctx: &CommandContext, args: ImportArgs) -> Result<()> {
  let job = args.job.required_job_id()?;
  let content = fs::read_to_string(&args.file).with_context(|| format!("Failed to read {}", args.file.display()))?;
  let snapshot = HandoffSnapshot::decode(&content).with_context(|| format!("Invalid snapshot {}", args.file.display()))?;
  snapshot.expect_job(&job)?;

  let changed = ctx.resolver.absorb(&snapshot)?;
  let report = ctx.resolver.flush();
  for (scope, error) in &report.failures {
    print_error(&format!("Could not persist {scope}: {error}"));
  }

  if changed == 0 {
    print_info(&format!("Nothing new for job {job}"));
  } else {
    print_success(&format!("Absorbed {changed} credential(s) for job {job}"));
  }
  Ok(())
}

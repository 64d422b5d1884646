//! # Locate Command
//!
//! Prints where credential stores live on disk.

use anyhow::{Context as _, Result};
use clap::Args;
use credscope_core::PathScope;

use super::{CommandContext, JobArgs};
use crate::output::{format_path, format_scope, print_info, print_warning};

/// Show where credentials are stored
#[derive(Args)]
pub struct LocateArgs {
  #[command(flatten)]
  pub job: JobArgs,

  /// Repository path of the store (requires --job)
  #[arg(long, value_name = "URL", requires = "job")]
  pub scope: Option<String>,
}

pub(crate) fn handle_locate_command(ctx: &CommandContext, args: LocateArgs) -> Result<()> {
  let layer = ctx.layer()?;
  print_info(&format!("Storage root: {}", format_path(&layer.root().display().to_string())));
  print_info(&format!(
    "Settings: {}",
    format_path(&ctx.dirs.settings_path().display().to_string())
  ));

  let Some(job) = args.job.job_id()? else {
    println!("{}", layer.global_key().path().display());
    return Ok(());
  };

  if let Some(scope) = &args.scope {
    let scope = PathScope::parse(scope).with_context(|| format!("Invalid scope '{scope}'"))?;
    println!("{}", layer.job_key(&job, &scope).path().display());
    return Ok(());
  }

  let scopes = layer.discover_scopes(&job)?;
  if scopes.is_empty() {
    print_warning(&format!("No stored scopes for job {job}"));
    println!("{}", layer.scopes_dir(&job).display());
    return Ok(());
  }
  for scope in scopes {
    println!(
      "{}  {}",
      format_scope(&scope.to_string()),
      layer.job_key(&job, &scope).path().display()
    );
  }
  Ok(())
}

//! # Resolve Command
//!
//! Dry-runs the resolution of one challenge against stored credentials.

use anyhow::{Context as _, Result};
use clap::Args;
use credscope_core::{RepositoryUrl, Resolution};

use super::{CommandContext, JobArgs};
use crate::output::{format_realm, format_scope, print_success, print_warning};

/// Dry-run how a challenge would be answered
#[derive(Args)]
pub struct ResolveArgs {
  #[command(flatten)]
  pub job: JobArgs,

  /// Realm issued by the repository
  #[arg(long)]
  pub realm: String,

  /// Repository URL being accessed
  pub url: String,
}

pub(crate) fn handle_resolve_command(ctx: &CommandContext, args: ResolveArgs) -> Result<()> {
  let job = args.job.job_id()?;
  let url = RepositoryUrl::parse(&args.url).with_context(|| format!("Invalid repository URL '{}'", args.url))?;

  match ctx.resolver.resolve(job.as_ref(), &args.realm, &url) {
    Resolution::Job { scope, record } => {
      print_success(&format!(
        "Job store {} answers {}",
        format_scope(&scope.to_string()),
        format_realm(&args.realm)
      ));
      println!("  credential: {}", record.secret.masked());
    }
    Resolution::Global { record } => {
      print_success(&format!("Global store answers {}", format_realm(&args.realm)));
      println!("  credential: {}", record.secret.masked());
    }
    Resolution::Unknown => {
      print_warning(&format!(
        "No stored credential for {} at {}; the transport falls back to its own discovery",
        format_realm(&args.realm),
        format_scope(&url.to_string())
      ));
    }
  }
  Ok(())
}

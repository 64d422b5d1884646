//! # List Command
//!
//! Tabulates stored credentials. Secrets are always masked.

use anyhow::Result;
use clap::Args;
use credscope_core::CredentialStore;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use super::{CommandContext, JobArgs};
use crate::output::{print_header, print_warning};

/// List stored credentials
#[derive(Args)]
pub struct ListArgs {
  #[command(flatten)]
  pub job: JobArgs,
}

#[derive(Tabled)]
struct CredentialRow {
  #[tabled(rename = "Scope")]
  scope: String,
  #[tabled(rename = "Realm")]
  realm: String,
  #[tabled(rename = "Kind")]
  kind: String,
  #[tabled(rename = "Credential")]
  credential: String,
  #[tabled(rename = "Origin")]
  origin: String,
  #[tabled(rename = "Stored")]
  stored: String,
}

fn credential_rows(store: &CredentialStore) -> Vec<CredentialRow> {
  store
    .records()
    .iter()
    .map(|record| CredentialRow {
      scope: store.scope().to_string(),
      realm: record.realm.clone(),
      kind: record.secret.kind().to_string(),
      credential: record.secret.masked(),
      origin: format!("{:?}", record.created_by).to_lowercase(),
      stored: record.created_at.format("%Y-%m-%d %H:%M").to_string(),
    })
    .collect()
}

pub(crate) fn handle_list_command(ctx: &CommandContext, args: ListArgs) -> Result<()> {
  let (title, stores) = match args.job.job_id()? {
    Some(job) => (format!("Credentials for job {job}"), ctx.resolver.stores(&job)),
    None => ("Global credentials".to_string(), vec![ctx.resolver.global().snapshot()]),
  };

  let rows: Vec<CredentialRow> = stores.iter().flat_map(credential_rows).collect();
  if rows.is_empty() {
    print_warning(&format!("{title}: none stored"));
    return Ok(());
  }

  print_header(&title);
  println!("{}", Table::new(rows).with(Style::sharp()));
  Ok(())
}

//! # Command Line Interface
//!
//! Defines the CLI structure and command handlers for credscope.

mod export;
mod import;
mod list;
mod locate;
mod resolve;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{ArgAction, Args, Parser, Subcommand};
use credscope_core::job::Axis;
use credscope_core::{ConfigDirs, JobId, PersistenceLayer, Resolver};
use tracing::debug;

use crate::output::ColorMode;

/// Top-level CLI command for credscope
#[derive(Parser)]
#[command(name = "credscope")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(about = "Per-job, path-scoped version-control credentials")]
#[command(
  long_about = "Credscope keeps version-control credentials per build job and per repository path,\n\
        with a global fallback shared by every job.\n\n\
        These commands inspect stored credentials, dry-run how a challenge would be\n\
        answered, and move snapshots between the controller and build workers."
)]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
#[command(subcommand_required(true))]
#[command(disable_help_subcommand = true)]
#[command(max_term_width = 120)]
#[command(styles = Styles::styled()
    .header(AnsiColor::BrightGreen.on_default().bold().underline())
    .usage(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::BrightGreen.on_default().bold())
    .placeholder(AnsiColor::BrightWhite.on_default().italic())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::BrightRed.on_default().bold())
)]
pub struct Cli {
  /// Sets the level of verbosity (can be used multiple times)
  #[arg(
    short = 'v',
    long = "verbose",
    action = ArgAction::Count,
    long_help = "Sets the level of verbosity for tracing and logging output.\n\n\
             -v: Show info level messages\n\
             -vv: Show debug level messages\n\
             -vvv: Show trace level messages"
  )]
  pub verbose: u8,

  /// Controls when colored output is used
  #[arg(
    long,
    value_enum,
    ignore_case = true,
    default_value_t = ColorMode::Auto,
  )]
  pub colors: ColorMode,

  /// Credential storage root (overrides settings and CREDSCOPE_HOME)
  #[arg(long, global = true, value_name = "DIR")]
  pub store_root: Option<PathBuf>,

  /// Subcommands
  #[command(subcommand)]
  pub command: Commands,
}

/// Subcommands for credscope
#[derive(Subcommand)]
pub enum Commands {
  /// Show where credentials are stored
  #[command(long_about = "Prints the storage root, or the file backing one store.\n\n\
            Without --job this shows the global store file. With --job and --scope it\n\
            shows the file for that job's store of that repository path.")]
  Locate(locate::LocateArgs),

  /// List stored credentials with secrets masked
  #[command(alias = "ls")]
  List(list::ListArgs),

  /// Dry-run how a challenge would be answered
  #[command(long_about = "Resolves a realm and repository URL for a job without contacting any server.\n\n\
            Job stores authorizing the URL are tried most specific first, then the\n\
            global store. The answering store and a masked credential are printed.")]
  Resolve(resolve::ResolveArgs),

  /// Write a handoff snapshot for a build worker
  Export(export::ExportArgs),

  /// Merge a snapshot returned by a build worker
  Import(import::ImportArgs),
}

/// Selects a job, or one configuration of a matrix job
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
  /// Full job name, folders separated by '/'
  #[arg(long, value_name = "NAME")]
  pub job: Option<String>,

  /// Matrix axis value, e.g. db=mysql (repeatable, requires --job)
  #[arg(long = "axis", value_name = "NAME=VALUE", requires = "job")]
  pub axes: Vec<String>,
}

impl JobArgs {
  /// The selected job, or `None` for the global store
  pub fn job_id(&self) -> Result<Option<JobId>> {
    let Some(name) = &self.job else {
      return Ok(None);
    };
    let job = JobId::parse(name).with_context(|| format!("Invalid job name '{name}'"))?;
    let axes = self
      .axes
      .iter()
      .map(|axis| Axis::parse(axis).with_context(|| format!("Invalid axis '{axis}'")))
      .collect::<Result<Vec<_>>>()?;
    Ok(Some(job.with_axes(axes)))
  }

  /// Like [`JobArgs::job_id`] but a job is mandatory
  pub fn required_job_id(&self) -> Result<JobId> {
    self.job_id()?.context("A job is required (use --job)")
  }
}

/// Shared state for command handlers
pub struct CommandContext {
  pub dirs: ConfigDirs,
  pub resolver: Resolver,
}

impl CommandContext {
  fn new(store_root: Option<PathBuf>) -> Result<Self> {
    let dirs = ConfigDirs::from_env()?;
    let settings = dirs.load_settings()?;
    let resolver = match store_root {
      Some(root) => Resolver::open(PersistenceLayer::new(root)).with_autosave(settings.autosave),
      None => settings.open_resolver(&dirs),
    };
    if let Some(layer) = resolver.persistence() {
      debug!(root = %layer.root().display(), "Using credential storage root");
    }
    Ok(Self { dirs, resolver })
  }

  pub fn layer(&self) -> Result<&PersistenceLayer> {
    self
      .resolver
      .persistence()
      .context("Resolver has no storage root")
  }
}

/// Handle the parsed command line
pub fn handle_cli(cli: Cli) -> Result<()> {
  cli.colors.apply();
  let ctx = CommandContext::new(cli.store_root)?;

  match cli.command {
    Commands::Locate(args) => locate::handle_locate_command(&ctx, args),
    Commands::List(args) => list::handle_list_command(&ctx, args),
    Commands::Resolve(args) => resolve::handle_resolve_command(&ctx, args),
    Commands::Export(args) => export::handle_export_command(&ctx, args),
    Commands::Import(args) => import::handle_import_command(&ctx, args),
  }
}

//! Command-line interface definitions.

use crate::utils::github_api::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, GITHUB_API_URL};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Keeps a directory of gem advisory records in step with GitHub advisories.
#[derive(Parser, Debug)]
#[command(name = "advisory-sync", version, about, long_about = None)]
pub struct Cli {
	/// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
	#[arg(long, global = true)]
	pub log_level: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Create or update records for every GitHub advisory on a Ruby gem.
	Sync(SyncArgs),

	/// Check every record under <repo-dir>/gems against the record schema.
	Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
	/// Earliest CVE year to sync. Advisories without a CVE are always synced.
	#[arg(long, default_value_t = 2000)]
	pub min_year: i32,

	/// Only sync advisories for this gem.
	#[arg(long)]
	pub gem: Option<String>,

	/// Root of the advisory database checkout.
	#[arg(long, default_value = ".")]
	pub repo_dir: PathBuf,

	/// Nodes requested per page (1-100).
	#[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
	pub page_size: u32,

	/// Safety ceiling on the number of pages fetched.
	#[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
	pub max_pages: u32,

	/// GraphQL endpoint.
	#[arg(long, default_value = GITHUB_API_URL)]
	pub api_url: String,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
	/// Root of the advisory database checkout.
	#[arg(long, default_value = ".")]
	pub repo_dir: PathBuf,
}

// src/main.rs

mod cli;
mod config;
mod error;
mod models;
mod repositories;
mod sync;
mod utils;

use anyhow::{bail, Context, Result};
use clap::Parser;
use cli::{Cli, Commands, SyncArgs, ValidateArgs};
use config::SyncConfig;
use log::{error, info};
use repositories::record_store::RecordStore;
use utils::github_api::GitHubApiClient;

struct App {
	cli: Cli,
}

impl App {
	fn new() -> Self {
		let cli = Cli::parse();
		utils::logger::init(cli.log_level.as_deref());
		info!("Starting advisory sync");
		Self { cli }
	}

	async fn run(&self) -> Result<()> {
		match &self.cli.command {
			Commands::Sync(args) => self.sync(args).await,
			Commands::Validate(args) => self.validate(args),
		}
	}

	async fn sync(&self, args: &SyncArgs) -> Result<()> {
		let config = SyncConfig::from_env(args).context("Failed to load sync configuration")?;
		let client = GitHubApiClient::new(&config.api_url, &config.token)
			.context("Failed to create GitHub API client")?;
		let store = RecordStore::new(&config.repo_dir);

		let report = sync::run(&client, &store, &config.options)
			.await
			.context("Sync aborted")?;

		print!("\n{}", report.summary(config.options.min_year));

		if !report.failed.is_empty() {
			bail!("{} package record(s) could not be synced", report.failed.len());
		}
		Ok(())
	}

	fn validate(&self, args: &ValidateArgs) -> Result<()> {
		let store = RecordStore::new(&args.repo_dir);
		let collection = store.collection_dir();
		let (checked, violations) = utils::schema::validate_tree(&collection)
			.with_context(|| format!("Failed to validate records under {}", collection.display()))?;

		for violation in &violations {
			error!("{}: {}", violation.path.display(), violation.message);
		}
		println!("Checked {} record(s), found {} problem(s)", checked, violations.len());

		if !violations.is_empty() {
			bail!("record validation failed");
		}
		Ok(())
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let app = App::new();
	app.run().await
}

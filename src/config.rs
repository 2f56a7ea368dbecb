// src/config.rs

use crate::cli::SyncArgs;
use crate::error::{SyncError, SyncResult};
use crate::sync::SyncOptions;
use std::path::PathBuf;

pub const TOKEN_ENV_VAR: &str = "GH_API_TOKEN";
const MAX_PAGE_SIZE: u32 = 100;

/// Everything one sync run needs, resolved before any network traffic.
#[derive(Clone)]
pub struct SyncConfig {
	pub token: String,
	pub api_url: String,
	pub repo_dir: PathBuf,
	pub options: SyncOptions,
}

impl SyncConfig {
	pub fn from_env(args: &SyncArgs) -> SyncResult<Self> {
		Self::new(args, std::env::var(TOKEN_ENV_VAR).ok())
	}

	pub fn new(args: &SyncArgs, token: Option<String>) -> SyncResult<Self> {
		let token = token
			.map(|t| t.trim().to_string())
			.filter(|t| !t.is_empty())
			.ok_or_else(|| {
				SyncError::Config(format!(
					"Unable to make API requests. Must define '{}' environment variable.",
					TOKEN_ENV_VAR
				))
			})?;

		if args.page_size == 0 || args.page_size > MAX_PAGE_SIZE {
			return Err(SyncError::Config(format!(
				"page size must be between 1 and {}, got {}",
				MAX_PAGE_SIZE, args.page_size
			)));
		}
		if args.max_pages == 0 {
			return Err(SyncError::Config("max pages must be at least 1".to_string()));
		}

		Ok(Self {
			token,
			api_url: args.api_url.clone(),
			repo_dir: args.repo_dir.clone(),
			options: SyncOptions {
				min_year: args.min_year,
				gem_name: args.gem.clone(),
				page_size: args.page_size,
				max_pages: args.max_pages,
			},
		})
	}
}

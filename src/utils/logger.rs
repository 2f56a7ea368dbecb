// src/utils/logger.rs

use env_logger::{Builder, Env};

/// Initializes logging. `RUST_LOG` wins over `level`, which wins over `info`.
pub fn init(level: Option<&str>) {
	let default_filter = level.unwrap_or("info");
	Builder::from_env(Env::default().default_filter_or(default_filter))
		.format_timestamp_millis()
		.format_module_path(true)
		.init();
}

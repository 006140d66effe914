mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Config, Executor, GraphCacheConfig, Postgres, Search, Service, Storage};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if !matches!(cfg.service.log_level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
		return Err(Error::Validation {
			message: "service.log_level must be one of trace, debug, info, warn, or error."
				.to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.search.url.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.search.url must be non-empty.".to_string(),
		});
	}

	for (label, collection) in [
		("storage.search.units_collection", &cfg.storage.search.units_collection),
		("storage.search.object_groups_collection", &cfg.storage.search.object_groups_collection),
	] {
		if collection.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.search.units_collection == cfg.storage.search.object_groups_collection {
		return Err(Error::Validation {
			message: "storage.search collections must be distinct.".to_string(),
		});
	}
	if cfg.graph_cache.capacity == 0 {
		return Err(Error::Validation {
			message: "graph_cache.capacity must be greater than zero.".to_string(),
		});
	}
	if cfg.graph_cache.refresh_after_secs == 0 {
		return Err(Error::Validation {
			message: "graph_cache.refresh_after_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.executor.max_result_window == 0 {
		return Err(Error::Validation {
			message: "executor.max_result_window must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

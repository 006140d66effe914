use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub graph_cache: GraphCacheConfig,
	pub executor: Executor,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub search: Search,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Search {
	pub url: String,
	pub units_collection: String,
	pub object_groups_collection: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphCacheConfig {
	/// Bounded entry count of the ancestor cache.
	pub capacity: u64,
	/// Write-based TTL; entries older than this are refreshed on next access.
	pub refresh_after_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Executor {
	/// Upper bound applied to any stage's requested page size.
	pub max_result_window: u64,
}

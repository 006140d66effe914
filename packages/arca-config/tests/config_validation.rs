use arca_config::{
	Config, Error, Executor, GraphCacheConfig, Postgres, Search, Service, Storage, validate,
};

fn base_config() -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		storage: Storage {
			postgres: Postgres {
				dsn: "postgres://localhost/arca".to_string(),
				pool_max_conns: 8,
			},
			search: Search {
				url: "http://localhost:6334".to_string(),
				units_collection: "arca_units".to_string(),
				object_groups_collection: "arca_object_groups".to_string(),
			},
		},
		graph_cache: GraphCacheConfig { capacity: 1_000, refresh_after_secs: 60 },
		executor: Executor { max_result_window: 10_000 },
	}
}

#[test]
fn base_config_is_valid() {
	validate(&base_config()).expect("Base config should validate.");
}

#[test]
fn rejects_unknown_log_level() {
	let mut cfg = base_config();

	cfg.service.log_level = "verbose".to_string();

	assert!(matches!(validate(&cfg), Err(Error::Validation { .. })));
}

#[test]
fn rejects_empty_dsn() {
	let mut cfg = base_config();

	cfg.storage.postgres.dsn = " ".to_string();

	assert!(matches!(validate(&cfg), Err(Error::Validation { .. })));
}

#[test]
fn rejects_colliding_collections() {
	let mut cfg = base_config();

	cfg.storage.search.object_groups_collection = cfg.storage.search.units_collection.clone();

	assert!(matches!(validate(&cfg), Err(Error::Validation { .. })));
}

#[test]
fn rejects_zero_cache_capacity() {
	let mut cfg = base_config();

	cfg.graph_cache.capacity = 0;

	assert!(matches!(validate(&cfg), Err(Error::Validation { .. })));
}

#[test]
fn parses_full_toml_document() {
	let raw = r#"
[service]
log_level = "info"

[storage.postgres]
dsn = "postgres://localhost/arca"
pool_max_conns = 8

[storage.search]
url = "http://localhost:6334"
units_collection = "arca_units"
object_groups_collection = "arca_object_groups"

[graph_cache]
capacity = 1000
refresh_after_secs = 60

[executor]
max_result_window = 10000
"#;
	let cfg: Config = toml::from_str(raw).expect("Config TOML should parse.");

	validate(&cfg).expect("Parsed config should validate.");
	assert_eq!(cfg.storage.postgres.pool_max_conns, 8);
	assert_eq!(cfg.graph_cache.capacity, 1_000);
}

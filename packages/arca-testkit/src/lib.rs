mod memory;

pub use memory::{FailingIndex, MemoryIndex, MemoryStore, RejectingValidator};

use std::env;

use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;

use arca_storage::models::Unit;

pub fn env_dsn() -> Option<String> {
	env::var("ARCA_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("ARCA_QDRANT_URL").ok()
}

/// Bare root-unit fixture for seeding stores directly; graph fields are
/// left at their root defaults. Flows that need computed graphs should go
/// through the service insert path instead.
pub fn root_unit(id: &str, tenant: i32) -> Unit {
	let now = OffsetDateTime::UNIX_EPOCH;

	Unit {
		unit_id: id.to_string(),
		tenant_id: tenant,
		parents: vec![],
		ancestors: vec![],
		ancestor_depths: Json(Default::default()),
		min_depth: 1,
		max_depth: 1,
		child_count: 0,
		originating_agency: None,
		originating_agencies: vec![],
		unit_type: None,
		object_group_id: None,
		content: Json(Value::Object(serde_json::Map::new())),
		version: 0,
		created_at: now,
		updated_at: now,
	}
}

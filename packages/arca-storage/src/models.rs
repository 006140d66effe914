use std::collections::BTreeMap;

use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;

use arca_domain::GraphProjection;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DocumentKind {
	Unit,
	ObjectGroup,
}
impl DocumentKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Unit => "Unit",
			Self::ObjectGroup => "ObjectGroup",
		}
	}
}

/// Archival description node. Graph, depth, and version fields are typed
/// columns; open-ended descriptive metadata lives in the `content` sidecar.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Unit {
	pub unit_id: String,
	pub tenant_id: i32,
	pub parents: Vec<String>,
	pub ancestors: Vec<String>,
	pub ancestor_depths: Json<BTreeMap<String, i64>>,
	pub min_depth: i32,
	pub max_depth: i32,
	pub child_count: i64,
	pub originating_agency: Option<String>,
	pub originating_agencies: Vec<String>,
	pub unit_type: Option<String>,
	pub object_group_id: Option<String>,
	pub content: Json<Value>,
	pub version: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
impl Unit {
	pub fn graph_projection(&self) -> GraphProjection {
		GraphProjection {
			id: self.unit_id.clone(),
			parents: self.parents.iter().cloned().collect(),
			ancestors: self.ancestors.iter().cloned().collect(),
			ancestor_depths: self.ancestor_depths.0.clone(),
			originating_agencies: self.originating_agencies.iter().cloned().collect(),
			object_group_id: self.object_group_id.clone(),
		}
	}
}

/// Container for binary content versions. Units hold the forward link
/// (`object_group_id`); the group holds the reverse `parent_unit_ids` set.
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ObjectGroup {
	pub object_group_id: String,
	pub tenant_id: i32,
	pub parent_unit_ids: Vec<String>,
	pub ancestors: Vec<String>,
	pub originating_agencies: Vec<String>,
	pub copy_count: i32,
	pub content: Json<Value>,
	pub version: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug)]
pub enum MetadataDocument {
	Unit(Unit),
	ObjectGroup(ObjectGroup),
}
impl MetadataDocument {
	pub fn kind(&self) -> DocumentKind {
		match self {
			Self::Unit(_) => DocumentKind::Unit,
			Self::ObjectGroup(_) => DocumentKind::ObjectGroup,
		}
	}

	pub fn id(&self) -> &str {
		match self {
			Self::Unit(unit) => &unit.unit_id,
			Self::ObjectGroup(group) => &group.object_group_id,
		}
	}

	pub fn tenant_id(&self) -> i32 {
		match self {
			Self::Unit(unit) => unit.tenant_id,
			Self::ObjectGroup(group) => group.tenant_id,
		}
	}

	pub fn version(&self) -> i64 {
		match self {
			Self::Unit(unit) => unit.version,
			Self::ObjectGroup(group) => group.version,
		}
	}

	pub fn as_unit(&self) -> Option<&Unit> {
		match self {
			Self::Unit(unit) => Some(unit),
			Self::ObjectGroup(_) => None,
		}
	}

	pub fn as_object_group(&self) -> Option<&ObjectGroup> {
		match self {
			Self::Unit(_) => None,
			Self::ObjectGroup(group) => Some(group),
		}
	}
}

/// Narrow filter language for authoritative-store scans. Query-stage
/// evaluation goes through the search index; this covers the few direct
/// store lookups (id batches, reverse parent links, full reindex walks).
#[derive(Clone, Debug)]
pub enum StoreFilter {
	All,
	Ids(Vec<String>),
	ParentContains(String),
}

pub mod admin;
pub mod attach;
pub mod cache;
pub mod delete;
pub mod executor;
pub mod insert;
pub mod query;
pub mod reconcile;
pub mod request;
pub mod select;
pub mod update;

pub mod backend_pg;
pub mod backend_qdrant;

mod error;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;

pub use admin::ReindexReport;
pub use attach::{AttachParentsRequest, AttachReport, AttachTarget};
pub use cache::GraphCache;
pub use error::{Error, Result};
pub use query::{IndexEntry, IndexPage, IndexQuery, Predicate, SortSpec};
pub use request::{
	Action, Depth, FieldMutation, MetadataRequest, Projection, QueryStage, ResultSet,
};

use arca_config::Config;
use arca_domain::GraphProjection;
use arca_storage::{
	db::Db,
	models::{DocumentKind, MetadataDocument, ObjectGroup, StoreFilter, Unit},
	qdrant::QdrantStore,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Bounded attempts for any optimistic version-guarded replace.
pub const REPLACE_ATTEMPTS: u32 = 3;

/// Authoritative document persistence. The single code path for reads and
/// writes of full documents; query-stage evaluation goes through
/// [`SearchIndex`] instead.
pub trait DocumentStore
where
	Self: Send + Sync,
{
	fn get<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		id: &'a str,
	) -> BoxFuture<'a, Result<Option<MetadataDocument>>>;

	fn get_many<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<MetadataDocument>>>;

	fn insert<'a>(&'a self, doc: &'a MetadataDocument) -> BoxFuture<'a, Result<()>>;

	/// Version-guarded replace; returns the matched count (0 on conflict).
	fn replace_if_version<'a>(
		&'a self,
		doc: &'a MetadataDocument,
		expected_version: i64,
	) -> BoxFuture<'a, Result<u64>>;

	fn delete_many<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<u64>>;

	fn find<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		filter: &'a StoreFilter,
		offset: i64,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<MetadataDocument>>>;

	/// Batched graph-projection load; missing ids are simply absent from
	/// the result (the ancestor cache turns that into a typed error).
	fn graph_projections<'a>(
		&'a self,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<GraphProjection>>>;
}

/// Secondary queryable projection of the document store.
pub trait SearchIndex
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<IndexPage>>;

	fn bulk_upsert<'a>(
		&'a self,
		kind: DocumentKind,
		entries: &'a [IndexEntry],
	) -> BoxFuture<'a, Result<()>>;

	fn bulk_delete<'a>(&'a self, kind: DocumentKind, ids: &'a [String])
	-> BoxFuture<'a, Result<()>>;

	fn update_one<'a>(
		&'a self,
		kind: DocumentKind,
		id: &'a str,
		partial: &'a Value,
	) -> BoxFuture<'a, Result<()>>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationStatus {
	Valid,
	Invalid { reason: String },
}

/// External schema validator applied to updated Units before the
/// version-guarded replace.
pub trait UnitValidator
where
	Self: Send + Sync,
{
	fn validate_updated_unit<'a>(
		&'a self,
		unit: &'a Value,
	) -> BoxFuture<'a, Result<ValidationStatus>>;
}

/// Structural fallback validator used when no external schema service is
/// wired in: the updated Unit must still be a JSON object carrying its id.
pub struct StructuralValidator;

impl UnitValidator for StructuralValidator {
	fn validate_updated_unit<'a>(
		&'a self,
		unit: &'a Value,
	) -> BoxFuture<'a, Result<ValidationStatus>> {
		let status = match unit.as_object() {
			Some(fields) if fields.get("id").and_then(Value::as_str).is_some() =>
				ValidationStatus::Valid,
			Some(_) => ValidationStatus::Invalid { reason: "missing id".to_string() },
			None => ValidationStatus::Invalid { reason: "not an object".to_string() },
		};

		Box::pin(async move { Ok(status) })
	}
}

/// Backend bundle constructed once at startup and passed into the service;
/// no ambient global state.
#[derive(Clone)]
pub struct Backends {
	pub store: Arc<dyn DocumentStore>,
	pub index: Arc<dyn SearchIndex>,
	pub validator: Arc<dyn UnitValidator>,
}
impl Backends {
	pub fn new(
		store: Arc<dyn DocumentStore>,
		index: Arc<dyn SearchIndex>,
		validator: Arc<dyn UnitValidator>,
	) -> Self {
		Self { store, index, validator }
	}

	pub fn production(db: Db, qdrant: QdrantStore) -> Self {
		Self {
			store: Arc::new(backend_pg::PgStore::new(db)),
			index: Arc::new(backend_qdrant::QdrantIndex::new(qdrant)),
			validator: Arc::new(StructuralValidator),
		}
	}
}

pub struct MetadataService {
	pub cfg: Config,
	pub backends: Backends,
	pub graph_cache: GraphCache,
}
impl MetadataService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore) -> Self {
		let backends = Backends::production(db, qdrant);

		Self::with_backends(cfg, backends)
	}

	pub fn with_backends(cfg: Config, backends: Backends) -> Self {
		let graph_cache = GraphCache::new(
			backends.store.clone(),
			cfg.graph_cache.capacity,
			Duration::from_secs(cfg.graph_cache.refresh_after_secs),
		);

		Self { cfg, backends, graph_cache }
	}
}

pub(crate) fn format_timestamp(ts: time::OffsetDateTime) -> Value {
	ts.format(&time::format_description::well_known::Rfc3339)
		.map(Value::String)
		.unwrap_or(Value::Null)
}

pub(crate) fn unit_snapshot(unit: &Unit) -> Value {
	serde_json::json!({
		"id": unit.unit_id,
		"tenant": unit.tenant_id,
		"parents": unit.parents,
		"ancestors": unit.ancestors,
		"ancestor_depths": unit.ancestor_depths.0,
		"min_depth": unit.min_depth,
		"max_depth": unit.max_depth,
		"child_count": unit.child_count,
		"originating_agency": unit.originating_agency,
		"originating_agencies": unit.originating_agencies,
		"unit_type": unit.unit_type,
		"object_group_id": unit.object_group_id,
		"content": unit.content.0,
		"version": unit.version,
		"created_at": format_timestamp(unit.created_at),
		"updated_at": format_timestamp(unit.updated_at),
	})
}

pub(crate) fn object_group_snapshot(group: &ObjectGroup) -> Value {
	serde_json::json!({
		"id": group.object_group_id,
		"tenant": group.tenant_id,
		"unit_ids": group.parent_unit_ids,
		"ancestors": group.ancestors,
		"originating_agencies": group.originating_agencies,
		"copy_count": group.copy_count,
		"content": group.content.0,
		"version": group.version,
		"created_at": format_timestamp(group.created_at),
		"updated_at": format_timestamp(group.updated_at),
	})
}

pub(crate) fn document_snapshot(doc: &MetadataDocument) -> Value {
	match doc {
		MetadataDocument::Unit(unit) => unit_snapshot(unit),
		MetadataDocument::ObjectGroup(group) => object_group_snapshot(group),
	}
}

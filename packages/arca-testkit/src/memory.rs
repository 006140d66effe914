use std::{
	collections::{BTreeMap, HashMap},
	sync::{
		Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Value;

use arca_domain::GraphProjection;
use arca_service::{
	BoxFuture, DocumentStore, Error, IndexEntry, IndexPage, IndexQuery, Predicate, Result,
	SearchIndex, UnitValidator, ValidationStatus, reconcile,
};
use arca_storage::models::{DocumentKind, MetadataDocument, ObjectGroup, StoreFilter, Unit};

/// In-memory document store honoring the versioned-replace discipline.
#[derive(Default)]
pub struct MemoryStore {
	units: Mutex<BTreeMap<String, Unit>>,
	groups: Mutex<BTreeMap<String, ObjectGroup>>,
	projection_calls: AtomicUsize,
	replace_conflicts: AtomicUsize,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn seed_unit(&self, unit: Unit) {
		let mut units = self.units.lock().unwrap_or_else(|err| err.into_inner());

		units.insert(unit.unit_id.clone(), unit);
	}

	pub fn seed_group(&self, group: ObjectGroup) {
		let mut groups = self.groups.lock().unwrap_or_else(|err| err.into_inner());

		groups.insert(group.object_group_id.clone(), group);
	}

	pub fn unit(&self, id: &str) -> Option<Unit> {
		let units = self.units.lock().unwrap_or_else(|err| err.into_inner());

		units.get(id).cloned()
	}

	pub fn group(&self, id: &str) -> Option<ObjectGroup> {
		let groups = self.groups.lock().unwrap_or_else(|err| err.into_inner());

		groups.get(id).cloned()
	}

	pub fn unit_count(&self) -> usize {
		let units = self.units.lock().unwrap_or_else(|err| err.into_inner());

		units.len()
	}

	/// Number of batched graph-projection loads issued so far; cache tests
	/// assert on this to prove batching and single-flight behavior.
	pub fn projection_calls(&self) -> usize {
		self.projection_calls.load(Ordering::SeqCst)
	}

	/// Makes the next `count` version-guarded replaces report a conflict,
	/// as if a concurrent writer advanced the version first.
	pub fn force_replace_conflicts(&self, count: usize) {
		self.replace_conflicts.store(count, Ordering::SeqCst);
	}

	fn get_doc(&self, kind: DocumentKind, tenant: Option<i32>, id: &str) -> Option<MetadataDocument> {
		match kind {
			DocumentKind::Unit => {
				let units = self.units.lock().unwrap_or_else(|err| err.into_inner());

				units
					.get(id)
					.filter(|unit| tenant.is_none_or(|tenant| unit.tenant_id == tenant))
					.cloned()
					.map(MetadataDocument::Unit)
			},
			DocumentKind::ObjectGroup => {
				let groups = self.groups.lock().unwrap_or_else(|err| err.into_inner());

				groups
					.get(id)
					.filter(|group| tenant.is_none_or(|tenant| group.tenant_id == tenant))
					.cloned()
					.map(MetadataDocument::ObjectGroup)
			},
		}
	}
}
impl DocumentStore for MemoryStore {
	fn get<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		id: &'a str,
	) -> BoxFuture<'a, Result<Option<MetadataDocument>>> {
		let doc = self.get_doc(kind, tenant, id);

		Box::pin(async move { Ok(doc) })
	}

	fn get_many<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<MetadataDocument>>> {
		let docs = ids.iter().filter_map(|id| self.get_doc(kind, tenant, id)).collect();

		Box::pin(async move { Ok(docs) })
	}

	fn insert<'a>(&'a self, doc: &'a MetadataDocument) -> BoxFuture<'a, Result<()>> {
		let result = match doc {
			MetadataDocument::Unit(unit) => {
				let mut units = self.units.lock().unwrap_or_else(|err| err.into_inner());

				if units.contains_key(&unit.unit_id) {
					Err(Error::AlreadyExists {
						message: format!("document already exists; id={}", unit.unit_id),
					})
				} else {
					units.insert(unit.unit_id.clone(), unit.clone());

					Ok(())
				}
			},
			MetadataDocument::ObjectGroup(group) => {
				let mut groups = self.groups.lock().unwrap_or_else(|err| err.into_inner());

				if groups.contains_key(&group.object_group_id) {
					Err(Error::AlreadyExists {
						message: format!(
							"document already exists; id={}",
							group.object_group_id
						),
					})
				} else {
					groups.insert(group.object_group_id.clone(), group.clone());

					Ok(())
				}
			},
		};

		Box::pin(async move { result })
	}

	fn replace_if_version<'a>(
		&'a self,
		doc: &'a MetadataDocument,
		expected_version: i64,
	) -> BoxFuture<'a, Result<u64>> {
		let pending = self.replace_conflicts.load(Ordering::SeqCst);

		if pending > 0 {
			self.replace_conflicts.store(pending - 1, Ordering::SeqCst);

			return Box::pin(async move { Ok(0) });
		}

		let matched = match doc {
			MetadataDocument::Unit(unit) => {
				let mut units = self.units.lock().unwrap_or_else(|err| err.into_inner());

				match units.get_mut(&unit.unit_id) {
					Some(stored) if stored.version == expected_version => {
						*stored = unit.clone();

						1
					},
					_ => 0,
				}
			},
			MetadataDocument::ObjectGroup(group) => {
				let mut groups = self.groups.lock().unwrap_or_else(|err| err.into_inner());

				match groups.get_mut(&group.object_group_id) {
					Some(stored) if stored.version == expected_version => {
						*stored = group.clone();

						1
					},
					_ => 0,
				}
			},
		};

		Box::pin(async move { Ok(matched) })
	}

	fn delete_many<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<u64>> {
		let deleted = match kind {
			DocumentKind::Unit => {
				let mut units = self.units.lock().unwrap_or_else(|err| err.into_inner());
				let mut deleted = 0_u64;

				for id in ids {
					let matches = units
						.get(id)
						.is_some_and(|unit| tenant.is_none_or(|tenant| unit.tenant_id == tenant));

					if matches && units.remove(id).is_some() {
						deleted += 1;
					}
				}

				deleted
			},
			DocumentKind::ObjectGroup => {
				let mut groups = self.groups.lock().unwrap_or_else(|err| err.into_inner());
				let mut deleted = 0_u64;

				for id in ids {
					let matches = groups.get(id).is_some_and(|group| {
						tenant.is_none_or(|tenant| group.tenant_id == tenant)
					});

					if matches && groups.remove(id).is_some() {
						deleted += 1;
					}
				}

				deleted
			},
		};

		Box::pin(async move { Ok(deleted) })
	}

	fn find<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		filter: &'a StoreFilter,
		offset: i64,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<MetadataDocument>>> {
		let docs: Vec<MetadataDocument> = match kind {
			DocumentKind::Unit => {
				let units = self.units.lock().unwrap_or_else(|err| err.into_inner());

				units
					.values()
					.filter(|unit| tenant.is_none_or(|tenant| unit.tenant_id == tenant))
					.filter(|unit| match filter {
						StoreFilter::All => true,
						StoreFilter::Ids(ids) => ids.contains(&unit.unit_id),
						StoreFilter::ParentContains(parent) => unit.parents.contains(parent),
					})
					.skip(offset.max(0) as usize)
					.take(limit.max(0) as usize)
					.cloned()
					.map(MetadataDocument::Unit)
					.collect()
			},
			DocumentKind::ObjectGroup => {
				let groups = self.groups.lock().unwrap_or_else(|err| err.into_inner());

				groups
					.values()
					.filter(|group| tenant.is_none_or(|tenant| group.tenant_id == tenant))
					.filter(|group| match filter {
						StoreFilter::All => true,
						StoreFilter::Ids(ids) => ids.contains(&group.object_group_id),
						StoreFilter::ParentContains(parent) =>
							group.parent_unit_ids.contains(parent),
					})
					.skip(offset.max(0) as usize)
					.take(limit.max(0) as usize)
					.cloned()
					.map(MetadataDocument::ObjectGroup)
					.collect()
			},
		};

		Box::pin(async move { Ok(docs) })
	}

	fn graph_projections<'a>(
		&'a self,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<GraphProjection>>> {
		self.projection_calls.fetch_add(1, Ordering::SeqCst);

		let units = self.units.lock().unwrap_or_else(|err| err.into_inner());
		let projections =
			ids.iter().filter_map(|id| units.get(id).map(Unit::graph_projection)).collect();

		Box::pin(async move { Ok(projections) })
	}
}

/// In-memory search index evaluating the predicate language over stored
/// payload projections, with keyword semantics matching the production
/// backend (array fields match on any element).
#[derive(Default)]
pub struct MemoryIndex {
	entries: Mutex<HashMap<DocumentKind, BTreeMap<String, Value>>>,
}
impl MemoryIndex {
	pub fn new() -> Self {
		Self::default()
	}

	/// Seeds the index straight from documents, the way the reconciler
	/// would after a store write.
	pub fn seed(&self, docs: &[MetadataDocument]) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		for doc in docs {
			let entry = reconcile::index_entry(doc);

			entries.entry(doc.kind()).or_default().insert(entry.id, entry.payload);
		}
	}

	pub fn contains(&self, kind: DocumentKind, id: &str) -> bool {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.get(&kind).is_some_and(|kind_entries| kind_entries.contains_key(id))
	}

	pub fn len(&self, kind: DocumentKind) -> usize {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.get(&kind).map(BTreeMap::len).unwrap_or(0)
	}
}
impl SearchIndex for MemoryIndex {
	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<IndexPage>> {
		let entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
		let mut matches: Vec<(String, Value)> = entries
			.get(&query.kind)
			.map(|kind_entries| {
				kind_entries
					.iter()
					.filter(|(_, payload)| {
						query.tenant.is_none_or(|tenant| {
							payload.get("tenant_id").and_then(Value::as_i64)
								== Some(tenant as i64)
						})
					})
					.filter(|(id, payload)| eval_predicate(&query.predicate, id, payload))
					.map(|(id, payload)| (id.clone(), payload.clone()))
					.collect()
			})
			.unwrap_or_default();

		if let Some(sort) = &query.sort {
			matches.sort_by(|(_, a), (_, b)| {
				let ordering = compare_payload_field(a, b, &sort.field);

				if sort.descending { ordering.reverse() } else { ordering }
			});
		}

		let total = matches.len() as u64;
		let ids: Vec<String> = matches
			.into_iter()
			.map(|(id, _)| id)
			.skip(query.offset as usize)
			.take(query.limit as usize)
			.collect();

		Box::pin(async move { Ok(IndexPage { ids, scores: None, total }) })
	}

	fn bulk_upsert<'a>(
		&'a self,
		kind: DocumentKind,
		new_entries: &'a [IndexEntry],
	) -> BoxFuture<'a, Result<()>> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());
		let kind_entries = entries.entry(kind).or_default();

		for entry in new_entries {
			kind_entries.insert(entry.id.clone(), entry.payload.clone());
		}

		Box::pin(async move { Ok(()) })
	}

	fn bulk_delete<'a>(
		&'a self,
		kind: DocumentKind,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<()>> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(kind_entries) = entries.get_mut(&kind) {
			for id in ids {
				kind_entries.remove(id);
			}
		}

		Box::pin(async move { Ok(()) })
	}

	fn update_one<'a>(
		&'a self,
		kind: DocumentKind,
		id: &'a str,
		partial: &'a Value,
	) -> BoxFuture<'a, Result<()>> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		if let Some(payload) = entries.get_mut(&kind).and_then(|kind_entries| kind_entries.get_mut(id))
			&& let (Some(fields), Some(updates)) = (payload.as_object_mut(), partial.as_object())
		{
			for (key, value) in updates {
				fields.insert(key.clone(), value.clone());
			}
		}

		Box::pin(async move { Ok(()) })
	}
}

/// Index double whose every operation fails; used to verify that index
/// reconciliation failures after a successful store write are tolerated.
pub struct FailingIndex;

impl SearchIndex for FailingIndex {
	fn search<'a>(&'a self, _query: &'a IndexQuery) -> BoxFuture<'a, Result<IndexPage>> {
		Box::pin(async move { Err(index_down()) })
	}

	fn bulk_upsert<'a>(
		&'a self,
		_kind: DocumentKind,
		_entries: &'a [IndexEntry],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Err(index_down()) })
	}

	fn bulk_delete<'a>(
		&'a self,
		_kind: DocumentKind,
		_ids: &'a [String],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Err(index_down()) })
	}

	fn update_one<'a>(
		&'a self,
		_kind: DocumentKind,
		_id: &'a str,
		_partial: &'a Value,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move { Err(index_down()) })
	}
}

/// Validator double rejecting every updated Unit.
pub struct RejectingValidator;

impl UnitValidator for RejectingValidator {
	fn validate_updated_unit<'a>(
		&'a self,
		_unit: &'a Value,
	) -> BoxFuture<'a, Result<ValidationStatus>> {
		Box::pin(async move {
			Ok(ValidationStatus::Invalid { reason: "rejected by test validator".to_string() })
		})
	}
}

fn index_down() -> Error {
	Error::Backend { message: "index unavailable".to_string() }
}

fn eval_predicate(predicate: &Predicate, id: &str, payload: &Value) -> bool {
	match predicate {
		Predicate::MatchAll => true,
		Predicate::Eq { field, value } =>
			payload.get(field).is_some_and(|stored| keyword_match(stored, value)),
		Predicate::In { field, values } => payload
			.get(field)
			.is_some_and(|stored| values.iter().any(|value| keyword_match(stored, value))),
		Predicate::Range { field, gte, lte } => {
			let Some(stored) = payload.get(field).and_then(Value::as_i64) else {
				return false;
			};

			gte.is_none_or(|bound| stored >= bound) && lte.is_none_or(|bound| stored <= bound)
		},
		Predicate::Exists { field } => match payload.get(field) {
			None | Some(Value::Null) => false,
			Some(Value::Array(items)) => !items.is_empty(),
			Some(_) => true,
		},
		Predicate::Ids(ids) => ids.iter().any(|candidate| candidate == id),
		Predicate::And(clauses) =>
			clauses.iter().all(|clause| eval_predicate(clause, id, payload)),
		Predicate::Or(clauses) =>
			clauses.iter().any(|clause| eval_predicate(clause, id, payload)),
		Predicate::Not(inner) => !eval_predicate(inner, id, payload),
	}
}

fn keyword_match(stored: &Value, candidate: &Value) -> bool {
	match stored {
		Value::Array(items) => items.iter().any(|item| item == candidate),
		other => other == candidate,
	}
}

fn compare_payload_field(a: &Value, b: &Value, field: &str) -> std::cmp::Ordering {
	let left = a.get(field);
	let right = b.get(field);

	match (left.and_then(Value::as_i64), right.and_then(Value::as_i64)) {
		(Some(left), Some(right)) => left.cmp(&right),
		_ => {
			let left = left.and_then(Value::as_str).unwrap_or_default();
			let right = right.and_then(Value::as_str).unwrap_or_default();

			left.cmp(right)
		},
	}
}

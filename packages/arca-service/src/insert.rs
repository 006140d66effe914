use std::collections::BTreeSet;

use serde_json::Value;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, MetadataService, REPLACE_ATTEMPTS, Result, reconcile,
	request::{MetadataRequest, ResultSet},
};
use arca_domain::compute_child_graph;
use arca_storage::models::{DocumentKind, MetadataDocument, ObjectGroup, Unit};

impl MetadataService {
	/// Terminal insert. The running id set carries the declared parents:
	/// existing Units for a Unit insert, linking Units for an ObjectGroup
	/// insert. Every parent must already exist.
	pub(crate) async fn execute_insert(
		&self,
		request: &MetadataRequest,
		body: &Value,
		matched: &ResultSet,
	) -> Result<ResultSet> {
		let Some(tenant) = request.tenant else {
			return Err(Error::InvalidRequest {
				message: "insert requires an active tenant context".to_string(),
			});
		};
		let id = body_str(body, "id").unwrap_or_else(|| Uuid::new_v4().to_string());

		if self.backends.store.get(request.kind, Some(tenant), &id).await?.is_some() {
			return Err(Error::AlreadyExists {
				message: format!("document already exists; id={id}"),
			});
		}

		match request.kind {
			DocumentKind::Unit => self.insert_unit(request, body, &id, tenant, matched).await,
			DocumentKind::ObjectGroup =>
				self.insert_object_group(request, body, &id, tenant, matched).await,
		}
	}

	async fn insert_unit(
		&self,
		request: &MetadataRequest,
		body: &Value,
		id: &str,
		tenant: i32,
		matched: &ResultSet,
	) -> Result<ResultSet> {
		let now = OffsetDateTime::now_utc();
		let parents = &matched.ids;
		let projections = self.graph_cache.load_many(parents).await?;
		let ordered: Vec<_> = parents
			.iter()
			.filter_map(|parent| projections.get(parent))
			.cloned()
			.collect();
		let own_agency = body_str(body, "originating_agency");
		let fields = compute_child_graph(own_agency.as_deref(), &ordered);
		let object_group_id = body_str(body, "object_group_id");
		let unit = Unit {
			unit_id: id.to_string(),
			tenant_id: tenant,
			parents: parents.clone(),
			ancestors: fields.ancestors.into_iter().collect(),
			ancestor_depths: Json(fields.ancestor_depths),
			min_depth: fields.min_depth,
			max_depth: fields.max_depth,
			child_count: 0,
			originating_agency: own_agency,
			originating_agencies: fields.originating_agencies.into_iter().collect(),
			unit_type: body_str(body, "unit_type"),
			object_group_id: object_group_id.clone(),
			content: Json(body_content(body)),
			version: 0,
			created_at: now,
			updated_at: now,
		};

		self.backends.store.insert(&MetadataDocument::Unit(unit.clone())).await?;

		let mut touched = vec![MetadataDocument::Unit(unit.clone())];

		for parent in parents {
			touched.push(self.bump_child_count(request.tenant, parent).await?);
		}

		if let Some(group_id) = &object_group_id {
			touched.push(self.attach_unit_to_group(request.tenant, &unit, group_id).await?);
		}

		reconcile::after_insert(self.backends.index.as_ref(), &touched).await;

		Ok(ResultSet::from_ids(DocumentKind::Unit, vec![id.to_string()]))
	}

	async fn insert_object_group(
		&self,
		request: &MetadataRequest,
		body: &Value,
		id: &str,
		tenant: i32,
		matched: &ResultSet,
	) -> Result<ResultSet> {
		let now = OffsetDateTime::now_utc();
		let unit_ids = &matched.ids;
		let units = self
			.backends
			.store
			.get_many(DocumentKind::Unit, request.tenant, unit_ids)
			.await?;
		let found: BTreeSet<&str> = units.iter().map(|doc| doc.id()).collect();
		let missing: Vec<String> =
			unit_ids.iter().filter(|id| !found.contains(id.as_str())).cloned().collect();

		if !missing.is_empty() {
			return Err(Error::NotFound {
				message: format!("missing parent(s): {}", missing.join(", ")),
				ids: missing,
			});
		}

		let mut ancestors = BTreeSet::new();
		let mut agencies = BTreeSet::new();

		for doc in &units {
			let Some(unit) = doc.as_unit() else {
				continue;
			};

			if unit.object_group_id.as_deref().is_some_and(|linked| linked != id) {
				return Err(Error::InvalidRequest {
					message: format!(
						"unit {} is already linked to another object group",
						unit.unit_id
					),
				});
			}

			ancestors.insert(unit.unit_id.clone());
			ancestors.extend(unit.ancestors.iter().cloned());
			agencies.extend(unit.originating_agencies.iter().cloned());
		}

		let group = ObjectGroup {
			object_group_id: id.to_string(),
			tenant_id: tenant,
			parent_unit_ids: unit_ids.clone(),
			ancestors: ancestors.into_iter().collect(),
			originating_agencies: agencies.into_iter().collect(),
			copy_count: body.get("copy_count").and_then(Value::as_i64).unwrap_or(0) as i32,
			content: Json(body_content(body)),
			version: 0,
			created_at: now,
			updated_at: now,
		};

		self.backends.store.insert(&MetadataDocument::ObjectGroup(group.clone())).await?;

		let mut touched = vec![MetadataDocument::ObjectGroup(group)];

		// Establish the forward link on each unit that does not carry it yet.
		for doc in &units {
			let Some(unit) = doc.as_unit() else {
				continue;
			};

			if unit.object_group_id.is_none() {
				touched.push(self.link_unit_forward(request.tenant, &unit.unit_id, id).await?);
			}
		}

		reconcile::after_insert(self.backends.index.as_ref(), &touched).await;

		Ok(ResultSet::from_ids(DocumentKind::ObjectGroup, vec![id.to_string()]))
	}

	/// Increments one parent's child count under the optimistic replace
	/// discipline, returning the updated document for reindexing.
	pub(crate) async fn bump_child_count(
		&self,
		tenant: Option<i32>,
		unit_id: &str,
	) -> Result<MetadataDocument> {
		for _ in 0..REPLACE_ATTEMPTS {
			let doc = self
				.backends
				.store
				.get(DocumentKind::Unit, tenant, unit_id)
				.await?
				.ok_or_else(|| Error::NotFound {
					message: format!("missing parent(s): {unit_id}"),
					ids: vec![unit_id.to_string()],
				})?;
			let Some(unit) = doc.as_unit() else {
				continue;
			};
			let mut updated = unit.clone();

			updated.child_count += 1;
			updated.version += 1;
			updated.updated_at = OffsetDateTime::now_utc();

			let replaced = MetadataDocument::Unit(updated);

			if self.backends.store.replace_if_version(&replaced, unit.version).await? == 1 {
				return Ok(replaced);
			}
		}

		Err(Error::ConcurrencyExhausted {
			id: unit_id.to_string(),
			attempts: REPLACE_ATTEMPTS,
		})
	}

	/// Mirrors a unit onto its linked object group: the reverse link plus
	/// the denormalized ancestor and agency sets. Only this path mutates
	/// the bidirectional invariant.
	pub(crate) async fn attach_unit_to_group(
		&self,
		tenant: Option<i32>,
		unit: &Unit,
		group_id: &str,
	) -> Result<MetadataDocument> {
		for _ in 0..REPLACE_ATTEMPTS {
			let doc = self
				.backends
				.store
				.get(DocumentKind::ObjectGroup, tenant, group_id)
				.await?
				.ok_or_else(|| Error::NotFound {
					message: format!("object group not found; id={group_id}"),
					ids: vec![group_id.to_string()],
				})?;
			let Some(group) = doc.as_object_group() else {
				continue;
			};
			let mut updated = group.clone();
			let mut unit_ids: BTreeSet<String> = updated.parent_unit_ids.drain(..).collect();
			let mut ancestors: BTreeSet<String> = updated.ancestors.drain(..).collect();
			let mut agencies: BTreeSet<String> =
				updated.originating_agencies.drain(..).collect();

			unit_ids.insert(unit.unit_id.clone());
			ancestors.insert(unit.unit_id.clone());
			ancestors.extend(unit.ancestors.iter().cloned());
			agencies.extend(unit.originating_agencies.iter().cloned());

			updated.parent_unit_ids = unit_ids.into_iter().collect();
			updated.ancestors = ancestors.into_iter().collect();
			updated.originating_agencies = agencies.into_iter().collect();
			updated.version += 1;
			updated.updated_at = OffsetDateTime::now_utc();

			let replaced = MetadataDocument::ObjectGroup(updated);

			if self.backends.store.replace_if_version(&replaced, group.version).await? == 1 {
				return Ok(replaced);
			}
		}

		Err(Error::ConcurrencyExhausted {
			id: group_id.to_string(),
			attempts: REPLACE_ATTEMPTS,
		})
	}

	async fn link_unit_forward(
		&self,
		tenant: Option<i32>,
		unit_id: &str,
		group_id: &str,
	) -> Result<MetadataDocument> {
		for _ in 0..REPLACE_ATTEMPTS {
			let doc = self
				.backends
				.store
				.get(DocumentKind::Unit, tenant, unit_id)
				.await?
				.ok_or_else(|| Error::NotFound {
					message: format!("unit not found; id={unit_id}"),
					ids: vec![unit_id.to_string()],
				})?;
			let Some(unit) = doc.as_unit() else {
				continue;
			};

			if unit.object_group_id.as_deref().is_some_and(|linked| linked != group_id) {
				return Err(Error::InvalidRequest {
					message: format!(
						"unit {unit_id} is already linked to another object group"
					),
				});
			}

			let mut updated = unit.clone();

			updated.object_group_id = Some(group_id.to_string());
			updated.version += 1;
			updated.updated_at = OffsetDateTime::now_utc();

			let replaced = MetadataDocument::Unit(updated);

			if self.backends.store.replace_if_version(&replaced, unit.version).await? == 1 {
				return Ok(replaced);
			}
		}

		Err(Error::ConcurrencyExhausted {
			id: unit_id.to_string(),
			attempts: REPLACE_ATTEMPTS,
		})
	}
}

fn body_str(body: &Value, field: &str) -> Option<String> {
	body.get(field).and_then(Value::as_str).map(str::to_string)
}

fn body_content(body: &Value) -> Value {
	body.get("content").cloned().unwrap_or_else(|| Value::Object(serde_json::Map::new()))
}

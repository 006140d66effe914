use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use time::OffsetDateTime;

use crate::{Error, MetadataService, REPLACE_ATTEMPTS, Result, reconcile};
use arca_domain::compute_child_graph;
use arca_storage::models::{DocumentKind, MetadataDocument};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachParentsRequest {
	pub tenant: Option<i32>,
	pub targets: Vec<AttachTarget>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachTarget {
	pub unit_id: String,
	pub parent_ids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachReport {
	pub attached: u64,
	pub unchanged: u64,
}

impl MetadataService {
	/// Bulk parent attach: adds parents to existing units (parents are
	/// never removed) and recomputes each target's graph fields from the
	/// merged parent set. Targets are re-read from the store inside the
	/// replace cycle; only the parents' projections come from the cache,
	/// which is invalidated wholesale at the end of the batch.
	pub async fn attach_parents(&self, request: &AttachParentsRequest) -> Result<AttachReport> {
		let mut attached = 0_u64;
		let mut unchanged = 0_u64;
		let mut touched = Vec::new();

		for target in &request.targets {
			match self.attach_target(request.tenant, target).await? {
				Some(docs) => {
					attached += 1;
					touched.extend(docs);
				},
				None => unchanged += 1,
			}
		}

		reconcile::after_update(self.backends.index.as_ref(), &touched).await;
		self.graph_cache.invalidate_all();

		Ok(AttachReport { attached, unchanged })
	}

	async fn attach_target(
		&self,
		tenant: Option<i32>,
		target: &AttachTarget,
	) -> Result<Option<Vec<MetadataDocument>>> {
		for _ in 0..REPLACE_ATTEMPTS {
			let doc = self
				.backends
				.store
				.get(DocumentKind::Unit, tenant, &target.unit_id)
				.await?
				.ok_or_else(|| Error::NotFound {
					message: format!("unit not found; id={}", target.unit_id),
					ids: vec![target.unit_id.clone()],
				})?;
			let Some(unit) = doc.as_unit() else {
				continue;
			};
			let existing: BTreeSet<&str> = unit.parents.iter().map(String::as_str).collect();
			let mut new_parents = Vec::new();

			for parent in &target.parent_ids {
				if !existing.contains(parent.as_str()) && !new_parents.contains(parent) {
					new_parents.push(parent.clone());
				}
			}

			if new_parents.is_empty() {
				return Ok(None);
			}

			let mut full_parents = unit.parents.clone();

			full_parents.extend(new_parents.iter().cloned());

			let projections = self.graph_cache.load_many(&full_parents).await?;

			for parent in &new_parents {
				let descends = projections
					.get(parent)
					.is_some_and(|projection| projection.ancestors.contains(&unit.unit_id));

				if *parent == unit.unit_id || descends {
					return Err(Error::InvalidRequest {
						message: format!(
							"attaching {} under {} would create a cycle",
							unit.unit_id, parent
						),
					});
				}
			}

			let ordered: Vec<_> = full_parents
				.iter()
				.filter_map(|parent| projections.get(parent))
				.cloned()
				.collect();
			let fields = compute_child_graph(unit.originating_agency.as_deref(), &ordered);
			let mut agencies: BTreeSet<String> =
				unit.originating_agencies.iter().cloned().collect();

			agencies.extend(fields.originating_agencies);

			let mut updated = unit.clone();

			updated.parents = full_parents;
			updated.ancestors = fields.ancestors.into_iter().collect();
			updated.ancestor_depths = Json(fields.ancestor_depths);
			updated.min_depth = fields.min_depth;
			updated.max_depth = fields.max_depth;
			updated.originating_agencies = agencies.into_iter().collect();
			updated.version += 1;
			updated.updated_at = OffsetDateTime::now_utc();

			let replaced = MetadataDocument::Unit(updated.clone());

			if self.backends.store.replace_if_version(&replaced, unit.version).await? == 1 {
				let mut docs = vec![replaced];

				for parent in &new_parents {
					docs.push(self.bump_child_count(tenant, parent).await?);
				}

				if let Some(group_id) = updated.object_group_id.clone() {
					docs.push(self.attach_unit_to_group(tenant, &updated, &group_id).await?);
				}

				return Ok(Some(docs));
			}
		}

		Err(Error::ConcurrencyExhausted {
			id: target.unit_id.clone(),
			attempts: REPLACE_ATTEMPTS,
		})
	}
}

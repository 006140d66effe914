use serde_json::Value;
use time::OffsetDateTime;

use crate::{
	Error, MetadataService, REPLACE_ATTEMPTS, Result, ValidationStatus, reconcile,
	request::{FieldMutation, MetadataRequest, ResultSet},
	unit_snapshot,
};
use arca_storage::models::{MetadataDocument, ObjectGroup, Unit};

/// Fields owned by the engine; mutating them through the update path would
/// corrupt the graph or the concurrency discipline.
const PROTECTED_FIELDS: &[&str] = &[
	"id",
	"tenant",
	"parents",
	"ancestors",
	"ancestor_depths",
	"min_depth",
	"max_depth",
	"child_count",
	"unit_ids",
	"originating_agencies",
	"version",
	"created_at",
	"updated_at",
];

impl MetadataService {
	/// Terminal update: every matched document runs its own
	/// read-apply-validate-replace cycle under the version guard.
	pub(crate) async fn execute_update(
		&self,
		request: &MetadataRequest,
		mutations: &[FieldMutation],
		multiple: bool,
		matched: &ResultSet,
	) -> Result<ResultSet> {
		if !multiple && matched.len() > 1 {
			return Err(Error::InvalidRequest {
				message: format!(
					"update not marked multiple matched {} entities",
					matched.len()
				),
			});
		}

		let single = matched.len() == 1;
		let mut touched = Vec::new();
		let mut first_error = None;

		for id in &matched.ids {
			match self.update_one_document(request, id, mutations).await {
				Ok(Some(doc)) => touched.push(doc),
				Ok(None) => {},
				Err(err) => {
					if single {
						return Err(err);
					}

					tracing::error!(error = %err, id, "Update failed for one matched document.");

					if first_error.is_none() {
						first_error = Some(err);
					}
				},
			}
		}

		reconcile::after_update(self.backends.index.as_ref(), &touched).await;

		if touched.is_empty() && let Some(err) = first_error {
			return Err(err);
		}

		Ok(ResultSet::from_ids(request.kind, matched.ids.clone()))
	}

	/// Returns the replaced document, or `None` when the mutations left the
	/// document unchanged (no version bump, no reindex).
	async fn update_one_document(
		&self,
		request: &MetadataRequest,
		id: &str,
		mutations: &[FieldMutation],
	) -> Result<Option<MetadataDocument>> {
		for _ in 0..REPLACE_ATTEMPTS {
			let doc = self
				.backends
				.store
				.get(request.kind, request.tenant, id)
				.await?
				.ok_or_else(|| Error::NotFound {
					message: format!("document not found; id={id}"),
					ids: vec![id.to_string()],
				})?;

			match doc {
				MetadataDocument::Unit(unit) => {
					let Some(updated) = apply_unit_mutations(&unit, mutations)? else {
						return Ok(None);
					};
					let snapshot = unit_snapshot(&updated);

					match self.backends.validator.validate_updated_unit(&snapshot).await? {
						ValidationStatus::Valid => {},
						ValidationStatus::Invalid { reason } =>
							return Err(Error::ValidationFailed { message: reason }),
					}

					let replaced = MetadataDocument::Unit(updated);

					if self.backends.store.replace_if_version(&replaced, unit.version).await?
						== 1
					{
						return Ok(Some(replaced));
					}
				},
				MetadataDocument::ObjectGroup(group) => {
					let Some(updated) = apply_group_mutations(&group, mutations)? else {
						return Ok(None);
					};
					let replaced = MetadataDocument::ObjectGroup(updated);

					if self.backends.store.replace_if_version(&replaced, group.version).await?
						== 1
					{
						return Ok(Some(replaced));
					}
				},
			}
		}

		Err(Error::ConcurrencyExhausted { id: id.to_string(), attempts: REPLACE_ATTEMPTS })
	}
}

fn apply_unit_mutations(unit: &Unit, mutations: &[FieldMutation]) -> Result<Option<Unit>> {
	let mut updated = unit.clone();
	let mut changed = false;

	for mutation in mutations {
		match mutation {
			FieldMutation::Set { field, value } => match field.as_str() {
				"object_group_id" => {
					let requested = value.as_str();

					if requested != unit.object_group_id.as_deref() {
						return Err(Error::InvalidRequest {
							message: "object_group_id is immutable once set".to_string(),
						});
					}
				},
				"originating_agency" => {
					let agency = value.as_str().map(str::to_string);

					if updated.originating_agency != agency {
						if let Some(agency) = &agency
							&& !updated.originating_agencies.contains(agency)
						{
							updated.originating_agencies.push(agency.clone());
						}

						updated.originating_agency = agency;
						changed = true;
					}
				},
				"unit_type" => {
					let unit_type = value.as_str().map(str::to_string);

					if updated.unit_type != unit_type {
						updated.unit_type = unit_type;
						changed = true;
					}
				},
				field if is_protected(field) =>
					return Err(protected_field_error(field)),
				field => changed |= set_content_field(&mut updated.content.0, field, value),
			},
			FieldMutation::Unset { field } => match field.as_str() {
				"originating_agency" =>
					if updated.originating_agency.take().is_some() {
						changed = true;
					},
				"unit_type" =>
					if updated.unit_type.take().is_some() {
						changed = true;
					},
				field if is_protected(field) || field == "object_group_id" =>
					return Err(protected_field_error(field)),
				field => changed |= unset_content_field(&mut updated.content.0, field),
			},
		}
	}

	if !changed {
		return Ok(None);
	}

	updated.version += 1;
	updated.updated_at = OffsetDateTime::now_utc();

	Ok(Some(updated))
}

fn apply_group_mutations(
	group: &ObjectGroup,
	mutations: &[FieldMutation],
) -> Result<Option<ObjectGroup>> {
	let mut updated = group.clone();
	let mut changed = false;

	for mutation in mutations {
		match mutation {
			FieldMutation::Set { field, value } => match field.as_str() {
				"copy_count" => {
					let count = value.as_i64().ok_or_else(|| Error::InvalidRequest {
						message: "copy_count must be an integer".to_string(),
					})? as i32;

					if updated.copy_count != count {
						updated.copy_count = count;
						changed = true;
					}
				},
				field if is_protected(field) || field == "object_group_id" =>
					return Err(protected_field_error(field)),
				field => changed |= set_content_field(&mut updated.content.0, field, value),
			},
			FieldMutation::Unset { field } => match field.as_str() {
				field if is_protected(field) || field == "copy_count" =>
					return Err(protected_field_error(field)),
				field => changed |= unset_content_field(&mut updated.content.0, field),
			},
		}
	}

	if !changed {
		return Ok(None);
	}

	updated.version += 1;
	updated.updated_at = OffsetDateTime::now_utc();

	Ok(Some(updated))
}

fn is_protected(field: &str) -> bool {
	PROTECTED_FIELDS.contains(&field)
}

fn protected_field_error(field: &str) -> Error {
	Error::InvalidRequest { message: format!("field {field} cannot be modified") }
}

fn set_content_field(content: &mut Value, field: &str, value: &Value) -> bool {
	if !content.is_object() {
		*content = Value::Object(serde_json::Map::new());
	}

	let Some(fields) = content.as_object_mut() else {
		return false;
	};

	if fields.get(field) == Some(value) {
		return false;
	}

	fields.insert(field.to_string(), value.clone());

	true
}

fn unset_content_field(content: &mut Value, field: &str) -> bool {
	content.as_object_mut().map(|fields| fields.remove(field).is_some()).unwrap_or(false)
}

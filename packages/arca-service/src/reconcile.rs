use serde_json::Value;

use crate::{SearchIndex, query::IndexEntry};
use arca_storage::models::{DocumentKind, MetadataDocument};

/// Index projection of one document: the strict field subset the query
/// layer evaluates against (graph, depth, agency, type, and tenant fields).
/// Heavy content and any relevance score stay out of the index.
pub fn index_entry(doc: &MetadataDocument) -> IndexEntry {
	let payload = match doc {
		MetadataDocument::Unit(unit) => serde_json::json!({
			"doc_id": unit.unit_id,
			"tenant_id": unit.tenant_id,
			"parents": unit.parents,
			"ancestors": unit.ancestors,
			"ancestor_depths": unit.ancestor_depths.0,
			"min_depth": unit.min_depth,
			"max_depth": unit.max_depth,
			"child_count": unit.child_count,
			"originating_agencies": unit.originating_agencies,
			"unit_type": unit.unit_type,
			"object_group_id": unit.object_group_id,
			"version": unit.version,
		}),
		MetadataDocument::ObjectGroup(group) => serde_json::json!({
			"doc_id": group.object_group_id,
			"tenant_id": group.tenant_id,
			"unit_ids": group.parent_unit_ids,
			"ancestors": group.ancestors,
			"originating_agencies": group.originating_agencies,
			"copy_count": group.copy_count,
			"version": group.version,
		}),
	};

	IndexEntry { id: doc.id().to_string(), payload }
}

/// Pushes freshly inserted documents into the index. The authoritative
/// store write already happened; an index-side failure is logged and
/// tolerated. It self-heals on the next successful reconciliation or an
/// administrative reindex, and the store write is never rolled back.
pub async fn after_insert(index: &dyn SearchIndex, docs: &[MetadataDocument]) {
	upsert_documents(index, docs, "insert").await;
}

pub async fn after_update(index: &dyn SearchIndex, docs: &[MetadataDocument]) {
	upsert_documents(index, docs, "update").await;
}

/// Purges index entries for deleted documents. When the authoritative
/// delete removed nothing (a concurrent delete of the same ids is benign),
/// the purge is skipped with a warning.
pub async fn after_delete(
	index: &dyn SearchIndex,
	kind: DocumentKind,
	ids: &[String],
	deleted_count: u64,
) {
	if deleted_count == 0 {
		tracing::warn!(
			kind = kind.as_str(),
			ids = ?ids,
			"Skipping index purge; the store delete removed no documents."
		);

		return;
	}
	if let Err(err) = index.bulk_delete(kind, ids).await {
		tracing::warn!(
			error = %err,
			kind = kind.as_str(),
			"Index purge failed after store delete; index lag is tolerated."
		);
	}
}

/// Partial refresh of a single indexed document.
pub async fn refresh_one(index: &dyn SearchIndex, kind: DocumentKind, id: &str, partial: &Value) {
	if let Err(err) = index.update_one(kind, id, partial).await {
		tracing::warn!(
			error = %err,
			kind = kind.as_str(),
			id,
			"Partial index refresh failed; index lag is tolerated."
		);
	}
}

async fn upsert_documents(index: &dyn SearchIndex, docs: &[MetadataDocument], op: &'static str) {
	for kind in [DocumentKind::Unit, DocumentKind::ObjectGroup] {
		let entries: Vec<IndexEntry> =
			docs.iter().filter(|doc| doc.kind() == kind).map(index_entry).collect();

		if entries.is_empty() {
			continue;
		}
		if let Err(err) = index.bulk_upsert(kind, &entries).await {
			tracing::warn!(
				error = %err,
				kind = kind.as_str(),
				op,
				count = entries.len(),
				"Index reconciliation failed after store write; index lag is tolerated."
			);
		}
	}
}

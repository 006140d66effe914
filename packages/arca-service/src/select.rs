use std::collections::HashMap;

use serde_json::Value;

use crate::{
	MetadataService, Result, document_snapshot,
	request::{MetadataRequest, Projection, ResultSet},
};
use arca_storage::models::MetadataDocument;

impl MetadataService {
	/// Terminal select: materializes the final id set from the
	/// authoritative store (not the index), applies the caller projection,
	/// and re-attaches last-stage relevance scores when requested.
	pub(crate) async fn finish_select(
		&self,
		request: &MetadataRequest,
		matched: ResultSet,
	) -> Result<ResultSet> {
		let docs =
			self.backends.store.get_many(request.kind, request.tenant, &matched.ids).await?;
		let by_id: HashMap<&str, &MetadataDocument> =
			docs.iter().map(|doc| (doc.id(), doc)).collect();
		let scores = matched.scores.clone().unwrap_or_default();
		let attach_scores = request.include_score && !scores.is_empty();
		let mut documents = Vec::with_capacity(matched.ids.len());

		for (position, id) in matched.ids.iter().enumerate() {
			let Some(doc) = by_id.get(id.as_str()) else {
				// The index can briefly run ahead of the store; a matched
				// id without a document is an anomaly, not a failure.
				tracing::warn!(id, "Matched id is missing from the document store.");

				continue;
			};
			let mut json = document_snapshot(doc);

			apply_projection(&mut json, &request.projection);

			if attach_scores && let Some(score) = scores.get(position) {
				if let Some(fields) = json.as_object_mut() {
					fields.insert("score".to_string(), Value::from(*score as f64));
				}
			}

			documents.push(json);
		}

		Ok(ResultSet {
			kind: matched.kind,
			ids: matched.ids,
			scores: matched.scores,
			documents: Some(documents),
		})
	}
}

/// An empty projection returns the full document. A named projection keeps
/// exactly the requested fields, which strips the internal id unless the
/// caller asked for it.
fn apply_projection(doc: &mut Value, projection: &Projection) {
	if projection.is_full() {
		return;
	}

	let Some(fields) = doc.as_object_mut() else {
		return;
	};

	fields.retain(|field, _| projection.includes(field));
}

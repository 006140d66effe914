use std::collections::HashMap;

use qdrant_client::{
	client::Payload,
	qdrant::{
		Condition, DeletePointsBuilder, Direction, Filter, OrderBy, PayloadIncludeSelector,
		PointStruct, QueryPointsBuilder, Range, ScrollPointsBuilder, UpsertPointsBuilder, Vector,
		points_selector::PointsSelectorOneOf, value::Kind,
	},
};
use serde_json::Value;
use uuid::Uuid;

use crate::{
	BoxFuture, Error, Result, SearchIndex,
	query::{IndexEntry, IndexPage, IndexQuery, Predicate},
};
use arca_storage::{
	models::DocumentKind,
	qdrant::{ID_FIELD, QdrantStore, TENANT_FIELD},
};

/// Production search index backed by Qdrant payload-only collections; the
/// predicate tree lowers to a `Filter`/`Condition` tree, and document ids
/// travel in the payload because they are not constrained to UUIDs.
pub struct QdrantIndex {
	store: QdrantStore,
}
impl QdrantIndex {
	pub fn new(store: QdrantStore) -> Self {
		Self { store }
	}
}
impl SearchIndex for QdrantIndex {
	fn search<'a>(&'a self, query: &'a IndexQuery) -> BoxFuture<'a, Result<IndexPage>> {
		Box::pin(async move {
			let collection = self.store.collection(query.kind).to_string();
			let filter = build_filter(query);

			if let Some(sort) = &query.sort {
				// Ordered reads go through the scroll API; its paging is
				// cursor-based, so the numeric offset does not apply here.
				let order_by = OrderBy {
					key: sort.field.clone(),
					direction: Some(if sort.descending {
						Direction::Desc as i32
					} else {
						Direction::Asc as i32
					}),
					start_from: None,
				};
				let scroll = ScrollPointsBuilder::new(collection)
					.filter(filter)
					.limit(query.limit.min(u32::MAX as u64) as u32)
					.order_by(order_by)
					.with_payload(PayloadIncludeSelector { fields: vec![ID_FIELD.to_string()] });
				let response = self.store.client.scroll(scroll).await.map_err(backend_err)?;
				let ids: Vec<String> = response
					.result
					.iter()
					.filter_map(|point| payload_id(&point.payload))
					.collect();
				let total = ids.len() as u64;

				return Ok(IndexPage { ids, scores: None, total });
			}

			let points = QueryPointsBuilder::new(collection)
				.filter(filter)
				.limit(query.limit)
				.offset(query.offset)
				.with_payload(PayloadIncludeSelector { fields: vec![ID_FIELD.to_string()] });
			let response = self.store.client.query(points).await.map_err(backend_err)?;
			let mut ids = Vec::with_capacity(response.result.len());
			let mut scores = Vec::with_capacity(response.result.len());

			for point in &response.result {
				let Some(id) = payload_id(&point.payload) else {
					continue;
				};

				ids.push(id);
				scores.push(point.score);
			}

			let total = ids.len() as u64;
			let scores = query.with_score.then_some(scores);

			Ok(IndexPage { ids, scores, total })
		})
	}

	fn bulk_upsert<'a>(
		&'a self,
		kind: DocumentKind,
		entries: &'a [IndexEntry],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut points = Vec::with_capacity(entries.len());

			for entry in entries {
				let payload = Payload::try_from(entry.payload.clone())
					.map_err(|err| Error::Backend { message: err.to_string() })?;

				points.push(PointStruct::new(
					point_id(&entry.id),
					HashMap::<String, Vector>::new(),
					payload,
				));
			}

			let upsert =
				UpsertPointsBuilder::new(self.store.collection(kind).to_string(), points)
					.wait(true);

			self.store.client.upsert_points(upsert).await.map_err(backend_err)?;

			Ok(())
		})
	}

	fn bulk_delete<'a>(
		&'a self,
		kind: DocumentKind,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let filter = Filter::must([Condition::matches(ID_FIELD, ids.to_vec())]);
			let delete = DeletePointsBuilder::new(self.store.collection(kind).to_string())
				.points(filter)
				.wait(true);

			self.store.client.delete_points(delete).await.map_err(backend_err)?;

			Ok(())
		})
	}

	fn update_one<'a>(
		&'a self,
		kind: DocumentKind,
		id: &'a str,
		partial: &'a Value,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let payload = Payload::try_from(partial.clone())
				.map_err(|err| Error::Backend { message: err.to_string() })?;
			let selector = PointsSelectorOneOf::Filter(Filter::must([Condition::matches(
				ID_FIELD,
				id.to_string(),
			)]));
			let request = qdrant_client::qdrant::SetPayloadPointsBuilder::new(
				self.store.collection(kind).to_string(),
				payload,
			)
			.points_selector(selector)
			.wait(true);

			self.store.client.set_payload(request).await.map_err(backend_err)?;

			Ok(())
		})
	}
}

/// Point ids must be UUIDs while document ids are free-form strings; the
/// point id is derived deterministically and the real id rides the payload.
fn point_id(doc_id: &str) -> String {
	Uuid::new_v5(&Uuid::NAMESPACE_OID, doc_id.as_bytes()).to_string()
}

fn payload_id(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> Option<String> {
	payload.get(ID_FIELD).and_then(|value| match &value.kind {
		Some(Kind::StringValue(id)) => Some(id.clone()),
		_ => None,
	})
}

fn backend_err(err: qdrant_client::QdrantError) -> Error {
	Error::Backend { message: err.to_string() }
}

fn build_filter(query: &IndexQuery) -> Filter {
	let mut must = Vec::new();

	if let Some(tenant) = query.tenant {
		must.push(Condition::matches(TENANT_FIELD, tenant as i64));
	}
	if let Some(condition) = condition(&query.predicate) {
		must.push(condition);
	}

	Filter { must, ..Default::default() }
}

fn condition(predicate: &Predicate) -> Option<Condition> {
	match predicate {
		Predicate::MatchAll => None,
		Predicate::Eq { field, value } => Some(match value {
			Value::Bool(flag) => Condition::matches(field.clone(), *flag),
			Value::Number(number) => match number.as_i64() {
				Some(int) => Condition::matches(field.clone(), int),
				None => Condition::matches(field.clone(), number.to_string()),
			},
			other => Condition::matches(field.clone(), keyword(other)),
		}),
		Predicate::In { field, values } => {
			let keywords: Vec<String> = values.iter().map(keyword).collect();

			Some(Condition::matches(field.clone(), keywords))
		},
		Predicate::Range { field, gte, lte } => Some(Condition::range(field.clone(), Range {
			gte: gte.map(|bound| bound as f64),
			lte: lte.map(|bound| bound as f64),
			..Default::default()
		})),
		Predicate::Exists { field } => Some(Condition::from(Filter {
			must_not: vec![Condition::is_empty(field.clone())],
			..Default::default()
		})),
		Predicate::Ids(ids) => Some(Condition::matches(ID_FIELD, ids.clone())),
		Predicate::And(clauses) =>
			Some(Condition::from(Filter::must(clauses.iter().filter_map(condition)))),
		Predicate::Or(clauses) =>
			Some(Condition::from(Filter::should(clauses.iter().filter_map(condition)))),
		Predicate::Not(inner) => condition(inner).map(|condition| {
			Condition::from(Filter { must_not: vec![condition], ..Default::default() })
		}),
	}
}

fn keyword(value: &Value) -> String {
	match value {
		Value::String(text) => text.clone(),
		other => other.to_string(),
	}
}

use crate::{BoxFuture, DocumentStore, Result};
use arca_domain::GraphProjection;
use arca_storage::{
	db::Db,
	documents,
	models::{DocumentKind, MetadataDocument, StoreFilter},
};

/// Production document store backed by Postgres; a thin dispatch over the
/// single query path in `arca_storage::documents`.
pub struct PgStore {
	db: Db,
}
impl PgStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}
impl DocumentStore for PgStore {
	fn get<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		id: &'a str,
	) -> BoxFuture<'a, Result<Option<MetadataDocument>>> {
		Box::pin(async move {
			let doc = match kind {
				DocumentKind::Unit => documents::get_unit(&self.db, tenant, id)
					.await?
					.map(MetadataDocument::Unit),
				DocumentKind::ObjectGroup => documents::get_object_group(&self.db, tenant, id)
					.await?
					.map(MetadataDocument::ObjectGroup),
			};

			Ok(doc)
		})
	}

	fn get_many<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<MetadataDocument>>> {
		Box::pin(async move {
			let docs = match kind {
				DocumentKind::Unit => documents::units_by_ids(&self.db, tenant, ids)
					.await?
					.into_iter()
					.map(MetadataDocument::Unit)
					.collect(),
				DocumentKind::ObjectGroup =>
					documents::object_groups_by_ids(&self.db, tenant, ids)
						.await?
						.into_iter()
						.map(MetadataDocument::ObjectGroup)
						.collect(),
			};

			Ok(docs)
		})
	}

	fn insert<'a>(&'a self, doc: &'a MetadataDocument) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			match doc {
				MetadataDocument::Unit(unit) => documents::insert_unit(&self.db, unit).await?,
				MetadataDocument::ObjectGroup(group) =>
					documents::insert_object_group(&self.db, group).await?,
			}

			Ok(())
		})
	}

	fn replace_if_version<'a>(
		&'a self,
		doc: &'a MetadataDocument,
		expected_version: i64,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let matched = match doc {
				MetadataDocument::Unit(unit) =>
					documents::replace_unit_if_version(&self.db, unit, expected_version).await?,
				MetadataDocument::ObjectGroup(group) =>
					documents::replace_object_group_if_version(&self.db, group, expected_version)
						.await?,
			};

			Ok(matched)
		})
	}

	fn delete_many<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move {
			let deleted = match kind {
				DocumentKind::Unit =>
					documents::delete_units_by_ids(&self.db, tenant, ids).await?,
				DocumentKind::ObjectGroup =>
					documents::delete_object_groups_by_ids(&self.db, tenant, ids).await?,
			};

			Ok(deleted)
		})
	}

	fn find<'a>(
		&'a self,
		kind: DocumentKind,
		tenant: Option<i32>,
		filter: &'a StoreFilter,
		offset: i64,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<MetadataDocument>>> {
		Box::pin(async move {
			let docs = match kind {
				DocumentKind::Unit =>
					documents::find_units(&self.db, tenant, filter, offset, limit)
						.await?
						.into_iter()
						.map(MetadataDocument::Unit)
						.collect(),
				DocumentKind::ObjectGroup =>
					documents::find_object_groups(&self.db, tenant, filter, offset, limit)
						.await?
						.into_iter()
						.map(MetadataDocument::ObjectGroup)
						.collect(),
			};

			Ok(docs)
		})
	}

	fn graph_projections<'a>(
		&'a self,
		ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<GraphProjection>>> {
		Box::pin(async move {
			let projections = documents::unit_graph_projections(&self.db, ids).await?;

			Ok(projections)
		})
	}
}

use qdrant_client::qdrant::{CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, FieldType};

use crate::Result;
use crate::models::DocumentKind;

pub const ID_FIELD: &str = "doc_id";
pub const TENANT_FIELD: &str = "tenant_id";
pub const PARENTS_FIELD: &str = "parents";
pub const ANCESTORS_FIELD: &str = "ancestors";
pub const MIN_DEPTH_FIELD: &str = "min_depth";
pub const MAX_DEPTH_FIELD: &str = "max_depth";
pub const UNIT_IDS_FIELD: &str = "unit_ids";

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub units_collection: String,
	pub object_groups_collection: String,
}
impl QdrantStore {
	pub fn new(cfg: &arca_config::Search) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self {
			client,
			units_collection: cfg.units_collection.clone(),
			object_groups_collection: cfg.object_groups_collection.clone(),
		})
	}

	pub fn collection(&self, kind: DocumentKind) -> &str {
		match kind {
			DocumentKind::Unit => &self.units_collection,
			DocumentKind::ObjectGroup => &self.object_groups_collection,
		}
	}

	/// Creates the payload-only collections and the payload indexes backing
	/// structured queries. Idempotent.
	pub async fn ensure_collections(&self) -> Result<()> {
		for kind in [DocumentKind::Unit, DocumentKind::ObjectGroup] {
			let collection = self.collection(kind).to_string();

			if !self.client.collection_exists(collection.clone()).await? {
				self.client.create_collection(CreateCollectionBuilder::new(collection.clone())).await?;
			}

			let keyword_fields: &[&str] = match kind {
				DocumentKind::Unit => &[ID_FIELD, PARENTS_FIELD, ANCESTORS_FIELD],
				DocumentKind::ObjectGroup => &[ID_FIELD, UNIT_IDS_FIELD, ANCESTORS_FIELD],
			};

			for field in keyword_fields {
				self.client
					.create_field_index(CreateFieldIndexCollectionBuilder::new(
						collection.clone(),
						field.to_string(),
						FieldType::Keyword,
					))
					.await?;
			}

			let integer_fields: &[&str] = match kind {
				DocumentKind::Unit => &[TENANT_FIELD, MIN_DEPTH_FIELD, MAX_DEPTH_FIELD],
				DocumentKind::ObjectGroup => &[TENANT_FIELD],
			};

			for field in integer_fields {
				self.client
					.create_field_index(CreateFieldIndexCollectionBuilder::new(
						collection.clone(),
						field.to_string(),
						FieldType::Integer,
					))
					.await?;
			}
		}

		Ok(())
	}
}

use serde::{Deserialize, Serialize};

use crate::{MetadataService, Result, query::IndexEntry, reconcile};
use arca_storage::models::{DocumentKind, StoreFilter};

const REINDEX_BATCH: i64 = 500;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReindexReport {
	pub scanned: u64,
	pub indexed: u64,
	pub failed: u64,
}

impl MetadataService {
	/// Administrative rebuild of one kind's index projection from the
	/// authoritative store: the self-heal path for tolerated index lag.
	pub async fn reindex(
		&self,
		kind: DocumentKind,
		tenant: Option<i32>,
	) -> Result<ReindexReport> {
		let mut offset = 0_i64;
		let mut scanned = 0_u64;
		let mut indexed = 0_u64;
		let mut failed = 0_u64;

		loop {
			let docs = self
				.backends
				.store
				.find(kind, tenant, &StoreFilter::All, offset, REINDEX_BATCH)
				.await?;

			if docs.is_empty() {
				break;
			}

			scanned += docs.len() as u64;

			let entries: Vec<IndexEntry> = docs.iter().map(reconcile::index_entry).collect();

			match self.backends.index.bulk_upsert(kind, &entries).await {
				Ok(()) => indexed += entries.len() as u64,
				Err(err) => {
					failed += entries.len() as u64;

					tracing::error!(
						error = %err,
						kind = kind.as_str(),
						offset,
						"Reindex batch failed."
					);
				},
			}

			if docs.len() < REINDEX_BATCH as usize {
				break;
			}

			offset += docs.len() as i64;
		}

		Ok(ReindexReport { scanned, indexed, failed })
	}
}

use crate::{
	Error, MetadataService, Result, reconcile,
	request::{MetadataRequest, ResultSet},
};

impl MetadataService {
	/// Terminal delete: batch-removes the matched ids from the
	/// authoritative store, then purges the index projection. A deleted
	/// count short of the matched count is benign (a concurrent delete of
	/// the same ids) and only logged.
	pub(crate) async fn execute_delete(
		&self,
		request: &MetadataRequest,
		multiple: bool,
		matched: &ResultSet,
	) -> Result<ResultSet> {
		if !multiple && matched.len() > 1 {
			return Err(Error::InvalidRequest {
				message: format!(
					"delete not marked multiple matched {} entities",
					matched.len()
				),
			});
		}

		let deleted = self
			.backends
			.store
			.delete_many(request.kind, request.tenant, &matched.ids)
			.await?;

		if deleted != matched.len() as u64 {
			tracing::warn!(
				expected = matched.len(),
				deleted,
				kind = request.kind.as_str(),
				"Deleted count differs from the matched count."
			);
		}

		reconcile::after_delete(
			self.backends.index.as_ref(),
			request.kind,
			&matched.ids,
			deleted,
		)
		.await;

		Ok(ResultSet::from_ids(request.kind, matched.ids.clone()))
	}
}

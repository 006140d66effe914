use crate::query::IndexQuery;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Not found: {message}")]
	NotFound { message: String, ids: Vec<String> },
	#[error("Already exists: {message}")]
	AlreadyExists { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Cannot modify document {id}; version conflict after {attempts} attempts.")]
	ConcurrencyExhausted { id: String, attempts: u32 },
	#[error("Unable to validate updated Unit: {message}")]
	ValidationFailed { message: String },
	#[error("Backend error: {message}")]
	Backend { message: String },
	/// Structured stage failure: carries the producing query, the prior
	/// result set's ids (empty means the sentinel "no previous set"), and
	/// the zero-based stage index.
	#[error("No result at stage {stage}.")]
	NoResult { stage: usize, query: Box<IndexQuery>, previous_ids: Vec<String> },
}
impl From<arca_storage::Error> for Error {
	fn from(err: arca_storage::Error) -> Self {
		match err {
			arca_storage::Error::Sqlx(inner) => Self::Backend { message: inner.to_string() },
			arca_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			arca_storage::Error::NotFound(message) => Self::NotFound { message, ids: vec![] },
			arca_storage::Error::Conflict(message) => Self::AlreadyExists { message },
			arca_storage::Error::Qdrant(inner) => Self::Backend { message: inner.to_string() },
		}
	}
}

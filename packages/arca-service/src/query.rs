use serde::{Deserialize, Serialize};
use serde_json::Value;

use arca_storage::models::DocumentKind;

/// Structured predicate evaluated by the search index. Equality and set
/// membership follow keyword semantics: on array-valued fields they match
/// when any element matches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
	MatchAll,
	Eq { field: String, value: Value },
	In { field: String, values: Vec<Value> },
	Range { field: String, gte: Option<i64>, lte: Option<i64> },
	Exists { field: String },
	Ids(Vec<String>),
	And(Vec<Predicate>),
	Or(Vec<Predicate>),
	Not(Box<Predicate>),
}
impl Predicate {
	pub fn and(clauses: Vec<Predicate>) -> Self {
		let mut flat = Vec::with_capacity(clauses.len());

		for clause in clauses {
			if !matches!(clause, Self::MatchAll) {
				flat.push(clause);
			}
		}

		match flat.len() {
			0 => Self::MatchAll,
			1 => flat.remove(0),
			_ => Self::And(flat),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
	pub field: String,
	pub descending: bool,
}

/// One backend query against the search index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexQuery {
	pub kind: DocumentKind,
	pub tenant: Option<i32>,
	pub predicate: Predicate,
	pub sort: Option<SortSpec>,
	pub offset: u64,
	pub limit: u64,
	pub with_score: bool,
}

#[derive(Clone, Debug)]
pub struct IndexPage {
	pub ids: Vec<String>,
	/// Parallel to `ids`; absent when the backend has no relevance notion
	/// for the executed query.
	pub scores: Option<Vec<f32>>,
	pub total: u64,
}

/// Projected document pushed to the index: the id plus the filtered payload
/// the query layer evaluates against.
#[derive(Clone, Debug)]
pub struct IndexEntry {
	pub id: String,
	pub payload: Value,
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::{Predicate, SortSpec};
use arca_storage::models::DocumentKind;

/// A parsed multi-stage request, produced by the external DSL parser.
/// Stages navigate the hierarchy; the action is the terminal operation
/// applied to the final id set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataRequest {
	pub kind: DocumentKind,
	/// Active tenant context; `None` means unscoped administrative access.
	pub tenant: Option<i32>,
	pub roots: Vec<String>,
	pub stages: Vec<QueryStage>,
	pub action: Action,
	pub projection: Projection,
	pub sort: Option<SortSpec>,
	pub offset: u64,
	/// 0 means "use the configured result window".
	pub limit: u64,
	pub include_score: bool,
}
impl MetadataRequest {
	pub fn select(kind: DocumentKind, tenant: Option<i32>) -> Self {
		Self {
			kind,
			tenant,
			roots: vec![],
			stages: vec![],
			action: Action::Select,
			projection: Projection::default(),
			sort: None,
			offset: 0,
			limit: 0,
			include_score: false,
		}
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryStage {
	pub predicate: Predicate,
	pub depth: Depth,
}

/// Depth directive of one query stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Depth {
	/// Absolute hierarchy level, level 1 being the roots.
	Exact(u32),
	/// Offset from the previous stage's result set: positive descends,
	/// negative ascends, zero stays on the same level.
	Relative(i32),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Action {
	Select,
	Insert { body: Value },
	Update { mutations: Vec<FieldMutation>, multiple: bool },
	Delete { multiple: bool },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum FieldMutation {
	Set { field: String, value: Value },
	Unset { field: String },
}

/// Caller projection for the final materialized documents. An empty field
/// list returns the full document; the internal id is stripped unless the
/// caller asked for it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Projection {
	pub fields: Vec<String>,
}
impl Projection {
	pub fn is_full(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn includes(&self, field: &str) -> bool {
		self.fields.iter().any(|f| f == field)
	}
}

/// Ephemeral per-request result: the matched ids, optional relevance
/// scores from the last search stage, and, after a terminal select, the
/// materialized documents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultSet {
	pub kind: DocumentKind,
	pub ids: Vec<String>,
	pub scores: Option<Vec<f32>>,
	pub documents: Option<Vec<Value>>,
}
impl ResultSet {
	pub fn empty(kind: DocumentKind) -> Self {
		Self { kind, ids: vec![], scores: None, documents: None }
	}

	pub fn from_ids(kind: DocumentKind, ids: Vec<String>) -> Self {
		Self { kind, ids, scores: None, documents: None }
	}

	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}

	pub fn len(&self) -> usize {
		self.ids.len()
	}

	pub fn contains(&self, id: &str) -> bool {
		self.ids.iter().any(|known| known == id)
	}
}

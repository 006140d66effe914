use std::sync::Arc;

use serde_json::{Value, json};

use arca_config::{Config, Executor, GraphCacheConfig, Postgres, Search, Service, Storage};
use arca_service::{
	Action, AttachParentsRequest, AttachTarget, Backends, Depth, Error, FieldMutation,
	MetadataRequest, MetadataService, Predicate, Projection, QueryStage, ResultSet,
	StructuralValidator, UnitValidator,
};
use arca_storage::models::DocumentKind;
use arca_testkit::{FailingIndex, MemoryIndex, MemoryStore, RejectingValidator};

fn test_config() -> Config {
	Config {
		service: Service { log_level: "info".to_string() },
		storage: Storage {
			postgres: Postgres { dsn: "postgres://unused".to_string(), pool_max_conns: 1 },
			search: Search {
				url: "http://unused".to_string(),
				units_collection: "units_test".to_string(),
				object_groups_collection: "object_groups_test".to_string(),
			},
		},
		graph_cache: GraphCacheConfig { capacity: 256, refresh_after_secs: 60 },
		executor: Executor { max_result_window: 1_000 },
	}
}

struct Harness {
	service: MetadataService,
	store: Arc<MemoryStore>,
	index: Arc<MemoryIndex>,
}

fn harness() -> Harness {
	harness_with_validator(Arc::new(StructuralValidator))
}

fn harness_with_validator(validator: Arc<dyn UnitValidator>) -> Harness {
	let store = Arc::new(MemoryStore::new());
	let index = Arc::new(MemoryIndex::new());
	let backends = Backends::new(store.clone(), index.clone(), validator);
	let service = MetadataService::with_backends(test_config(), backends);

	Harness { service, store, index }
}

fn base_request(kind: DocumentKind) -> MetadataRequest {
	let mut request = MetadataRequest::select(kind, Some(0));

	request.projection = Projection::default();

	request
}

fn insert_request(kind: DocumentKind, roots: &[&str], body: Value) -> MetadataRequest {
	let mut request = base_request(kind);

	request.roots = roots.iter().map(|root| root.to_string()).collect();
	request.action = Action::Insert { body };

	request
}

fn select_request(kind: DocumentKind, roots: &[&str], stages: Vec<QueryStage>) -> MetadataRequest {
	let mut request = base_request(kind);

	request.roots = roots.iter().map(|root| root.to_string()).collect();
	request.stages = stages;

	request
}

fn stage(predicate: Predicate, depth: Depth) -> QueryStage {
	QueryStage { predicate, depth }
}

async fn insert_unit(harness: &Harness, id: &str, roots: &[&str]) {
	let body = json!({ "id": id, "originating_agency": format!("agency-{id}") });
	let request = insert_request(DocumentKind::Unit, roots, body);

	harness.service.execute(&request, None).await.unwrap_or_else(|err| {
		panic!("Insert of {id} failed: {err}");
	});
}

/// A (root) <- B <- C, the three-level fixture most scenarios build on.
async fn seed_chain(harness: &Harness) {
	insert_unit(harness, "A", &[]).await;
	insert_unit(harness, "B", &["A"]).await;
	insert_unit(harness, "C", &["B"]).await;
}

#[tokio::test]
async fn exact_depth_two_returns_the_middle_unit() {
	let harness = harness();

	seed_chain(&harness).await;

	let request = select_request(DocumentKind::Unit, &[], vec![stage(
		Predicate::MatchAll,
		Depth::Exact(2),
	)]);
	let result = harness.service.execute(&request, None).await.expect("Select failed.");

	assert_eq!(result.ids, vec!["B".to_string()]);
}

#[tokio::test]
async fn relative_ascend_one_returns_the_parent_set() {
	let harness = harness();

	seed_chain(&harness).await;

	let request = select_request(DocumentKind::Unit, &["C"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(-1),
	)]);
	let result = harness.service.execute(&request, None).await.expect("Select failed.");

	assert_eq!(result.ids, vec!["B".to_string()]);
}

#[tokio::test]
async fn relative_descend_two_confirms_against_the_store() {
	let harness = harness();

	seed_chain(&harness).await;

	let request = select_request(DocumentKind::Unit, &["A"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(2),
	)]);
	let result = harness.service.execute(&request, None).await.expect("Select failed.");

	// B is one hop below A and only C sits exactly two hops down; the
	// ancestor-containment candidates were {B, C}.
	assert_eq!(result.ids, vec!["C".to_string()]);
}

#[tokio::test]
async fn two_parent_insert_merges_shortest_paths() {
	let harness = harness();

	insert_unit(&harness, "X", &[]).await;
	insert_unit(&harness, "P1", &[]).await;
	insert_unit(&harness, "P2", &["X"]).await;
	insert_unit(&harness, "child", &["P1", "P2"]).await;

	let unit = harness.store.unit("child").expect("child should be stored");
	let depths = &unit.ancestor_depths.0;

	assert_eq!(depths.get("P1"), Some(&1));
	assert_eq!(depths.get("P2"), Some(&1));
	assert_eq!(depths.get("X"), Some(&2));
	assert_eq!(unit.min_depth, 1);
	assert_eq!(unit.max_depth, 3);

	let p1 = harness.store.unit("P1").expect("P1 should be stored");

	assert_eq!(p1.child_count, 1);
}

#[tokio::test]
async fn insert_with_missing_parent_names_it_and_writes_nothing() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let request = insert_request(DocumentKind::Unit, &["A", "ghost"], json!({ "id": "B" }));
	let err = harness.service.execute(&request, None).await.expect_err("Insert should fail.");

	match err {
		Error::NotFound { ids, .. } => assert_eq!(ids, vec!["ghost".to_string()]),
		other => panic!("Expected NotFound, got {other:?}"),
	}

	assert!(harness.store.unit("B").is_none());
	assert!(!harness.index.contains(DocumentKind::Unit, "B"));
}

#[tokio::test]
async fn insert_of_an_existing_id_is_rejected() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let request = insert_request(DocumentKind::Unit, &[], json!({ "id": "A" }));
	let err = harness.service.execute(&request, None).await.expect_err("Insert should fail.");

	assert!(matches!(err, Error::AlreadyExists { .. }));
}

#[tokio::test]
async fn non_multiple_update_matching_two_entities_mutates_nothing() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;
	insert_unit(&harness, "B", &[]).await;

	let mut request = select_request(DocumentKind::Unit, &[], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.action = Action::Update {
		mutations: vec![FieldMutation::Set {
			field: "title".to_string(),
			value: json!("renamed"),
		}],
		multiple: false,
	};

	let err = harness.service.execute(&request, None).await.expect_err("Update should fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	for id in ["A", "B"] {
		let unit = harness.store.unit(id).expect("unit should remain");

		assert_eq!(unit.version, 0);
		assert!(unit.content.0.get("title").is_none());
	}
}

#[tokio::test]
async fn delete_on_empty_match_fails_with_stage_zero_context() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let mut request = select_request(DocumentKind::Unit, &[], vec![stage(
		Predicate::Eq { field: "unit_type".to_string(), value: json!("missing-kind") },
		Depth::Relative(0),
	)]);

	request.action = Action::Delete { multiple: true };

	let err = harness.service.execute(&request, None).await.expect_err("Delete should fail.");

	match err {
		Error::NoResult { stage, previous_ids, .. } => {
			assert_eq!(stage, 0);
			assert!(previous_ids.is_empty());
		},
		other => panic!("Expected NoResult, got {other:?}"),
	}

	assert!(harness.store.unit("A").is_some());
}

#[tokio::test]
async fn update_applies_mutations_and_bumps_the_version() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let mut request = select_request(DocumentKind::Unit, &["A"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.action = Action::Update {
		mutations: vec![FieldMutation::Set {
			field: "title".to_string(),
			value: json!("renamed"),
		}],
		multiple: false,
	};

	harness.service.execute(&request, None).await.expect("Update failed.");

	let unit = harness.store.unit("A").expect("unit should remain");

	assert_eq!(unit.content.0.get("title"), Some(&json!("renamed")));
	assert_eq!(unit.version, 1);

	// Re-running the same mutation changes nothing and keeps the version.
	harness.service.execute(&request, None).await.expect("Idempotent update failed.");

	let unit = harness.store.unit("A").expect("unit should remain");

	assert_eq!(unit.version, 1);
}

#[tokio::test]
async fn update_conflict_exhausts_bounded_retries() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;
	harness.store.force_replace_conflicts(3);

	let mut request = select_request(DocumentKind::Unit, &["A"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.action = Action::Update {
		mutations: vec![FieldMutation::Set {
			field: "title".to_string(),
			value: json!("renamed"),
		}],
		multiple: false,
	};

	let err = harness.service.execute(&request, None).await.expect_err("Update should fail.");

	match err {
		Error::ConcurrencyExhausted { id, attempts } => {
			assert_eq!(id, "A");
			assert_eq!(attempts, 3);
		},
		other => panic!("Expected ConcurrencyExhausted, got {other:?}"),
	}
}

#[tokio::test]
async fn update_conflict_retries_and_succeeds_within_the_bound() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;
	harness.store.force_replace_conflicts(2);

	let mut request = select_request(DocumentKind::Unit, &["A"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.action = Action::Update {
		mutations: vec![FieldMutation::Set {
			field: "title".to_string(),
			value: json!("renamed"),
		}],
		multiple: false,
	};

	harness.service.execute(&request, None).await.expect("Update should retry and succeed.");

	let unit = harness.store.unit("A").expect("unit should remain");

	assert_eq!(unit.content.0.get("title"), Some(&json!("renamed")));
}

#[tokio::test]
async fn rejected_validation_aborts_the_update() {
	let harness = harness_with_validator(Arc::new(RejectingValidator));

	insert_unit(&harness, "A", &[]).await;

	let mut request = select_request(DocumentKind::Unit, &["A"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.action = Action::Update {
		mutations: vec![FieldMutation::Set {
			field: "title".to_string(),
			value: json!("renamed"),
		}],
		multiple: false,
	};

	let err = harness.service.execute(&request, None).await.expect_err("Update should fail.");

	assert!(matches!(err, Error::ValidationFailed { .. }));

	let unit = harness.store.unit("A").expect("unit should remain");

	assert_eq!(unit.version, 0);
}

#[tokio::test]
async fn changing_a_linked_object_group_is_rejected() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let og_request = insert_request(DocumentKind::ObjectGroup, &["A"], json!({ "id": "G" }));

	harness.service.execute(&og_request, None).await.expect("Object-group insert failed.");

	let mut request = select_request(DocumentKind::Unit, &["A"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.action = Action::Update {
		mutations: vec![FieldMutation::Set {
			field: "object_group_id".to_string(),
			value: json!("other-group"),
		}],
		multiple: false,
	};

	let err = harness.service.execute(&request, None).await.expect_err("Update should fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn object_group_insert_links_both_directions() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;
	insert_unit(&harness, "B", &["A"]).await;

	let request = insert_request(DocumentKind::ObjectGroup, &["B"], json!({ "id": "G" }));

	harness.service.execute(&request, None).await.expect("Object-group insert failed.");

	let group = harness.store.group("G").expect("group should be stored");

	assert_eq!(group.parent_unit_ids, vec!["B".to_string()]);
	assert!(group.ancestors.contains(&"A".to_string()));
	assert!(group.ancestors.contains(&"B".to_string()));

	let unit = harness.store.unit("B").expect("unit should remain");

	assert_eq!(unit.object_group_id.as_deref(), Some("G"));
	assert!(harness.index.contains(DocumentKind::ObjectGroup, "G"));
}

#[tokio::test]
async fn stageless_object_group_select_crosses_from_the_unit_anchors() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let og_request = insert_request(DocumentKind::ObjectGroup, &["A"], json!({ "id": "G" }));

	harness.service.execute(&og_request, None).await.expect("Object-group insert failed.");

	let request = select_request(DocumentKind::ObjectGroup, &["A"], vec![]);
	let result = harness.service.execute(&request, None).await.expect("Select failed.");

	assert_eq!(result.ids, vec!["G".to_string()]);
}

#[tokio::test]
async fn roots_outside_the_restriction_are_filtered_out() {
	let harness = harness();

	seed_chain(&harness).await;
	insert_unit(&harness, "Z", &[]).await;

	let restriction = ResultSet::from_ids(DocumentKind::Unit, vec!["A".to_string()]);
	let request = select_request(DocumentKind::Unit, &["B", "Z"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);
	let result =
		harness.service.execute(&request, Some(&restriction)).await.expect("Select failed.");

	assert_eq!(result.ids, vec!["B".to_string()]);
}

#[tokio::test]
async fn tenant_scoping_is_mandatory_on_stage_queries() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let mut foreign = insert_request(DocumentKind::Unit, &[], json!({ "id": "F" }));

	foreign.tenant = Some(7);
	harness.service.execute(&foreign, None).await.expect("Foreign insert failed.");

	let request = select_request(DocumentKind::Unit, &[], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);
	let result = harness.service.execute(&request, None).await.expect("Select failed.");

	assert_eq!(result.ids, vec!["A".to_string()]);
}

#[tokio::test]
async fn select_projection_keeps_only_requested_fields() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;

	let mut request = select_request(DocumentKind::Unit, &["A"], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.projection = Projection { fields: vec!["id".to_string(), "min_depth".to_string()] };

	let result = harness.service.execute(&request, None).await.expect("Select failed.");
	let documents = result.documents.expect("select should materialize documents");
	let fields = documents[0].as_object().expect("document should be an object");

	assert_eq!(fields.len(), 2);
	assert_eq!(fields.get("id"), Some(&json!("A")));
	assert_eq!(fields.get("min_depth"), Some(&json!(1)));
}

#[tokio::test]
async fn index_failure_after_insert_is_tolerated() {
	let store = Arc::new(MemoryStore::new());
	let backends =
		Backends::new(store.clone(), Arc::new(FailingIndex), Arc::new(StructuralValidator));
	let service = MetadataService::with_backends(test_config(), backends);
	let request = insert_request(DocumentKind::Unit, &[], json!({ "id": "A" }));

	service.execute(&request, None).await.expect("Insert must survive an index outage.");

	assert!(store.unit("A").is_some());
}

#[tokio::test]
async fn attach_parents_recomputes_the_graph_and_counts() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;
	insert_unit(&harness, "B", &[]).await;

	let request = AttachParentsRequest {
		tenant: Some(0),
		targets: vec![AttachTarget {
			unit_id: "B".to_string(),
			parent_ids: vec!["A".to_string()],
		}],
	};
	let report = harness.service.attach_parents(&request).await.expect("Attach failed.");

	assert_eq!(report.attached, 1);
	assert_eq!(report.unchanged, 0);

	let unit = harness.store.unit("B").expect("unit should remain");

	assert_eq!(unit.parents, vec!["A".to_string()]);
	assert_eq!(unit.ancestor_depths.0.get("A"), Some(&1));
	assert_eq!(unit.min_depth, 1);
	assert_eq!(unit.max_depth, 2);

	let parent = harness.store.unit("A").expect("parent should remain");

	assert_eq!(parent.child_count, 1);

	// Attaching the same parent again is a no-op.
	let report = harness.service.attach_parents(&request).await.expect("Attach failed.");

	assert_eq!(report.attached, 0);
	assert_eq!(report.unchanged, 1);
}

#[tokio::test]
async fn attaching_a_descendant_as_parent_is_rejected() {
	let harness = harness();

	seed_chain(&harness).await;

	let request = AttachParentsRequest {
		tenant: Some(0),
		targets: vec![AttachTarget {
			unit_id: "A".to_string(),
			parent_ids: vec!["C".to_string()],
		}],
	};
	let err = harness.service.attach_parents(&request).await.expect_err("Attach should fail.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn delete_removes_documents_and_index_entries() {
	let harness = harness();

	insert_unit(&harness, "A", &[]).await;
	insert_unit(&harness, "B", &[]).await;

	let mut request = select_request(DocumentKind::Unit, &[], vec![stage(
		Predicate::MatchAll,
		Depth::Relative(0),
	)]);

	request.action = Action::Delete { multiple: true };
	harness.service.execute(&request, None).await.expect("Delete failed.");

	assert_eq!(harness.store.unit_count(), 0);
	assert_eq!(harness.index.len(DocumentKind::Unit), 0);
}

#[tokio::test]
async fn reindex_rebuilds_the_projection_from_the_store() {
	let harness = harness();

	harness.store.seed_unit(arca_testkit::root_unit("A", 0));
	harness.store.seed_unit(arca_testkit::root_unit("B", 0));

	assert_eq!(harness.index.len(DocumentKind::Unit), 0);

	let report =
		harness.service.reindex(DocumentKind::Unit, None).await.expect("Reindex failed.");

	assert_eq!(report.scanned, 2);
	assert_eq!(report.indexed, 2);
	assert_eq!(report.failed, 0);
	assert!(harness.index.contains(DocumentKind::Unit, "A"));
	assert!(harness.index.contains(DocumentKind::Unit, "B"));
}

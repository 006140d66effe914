use std::collections::{BTreeMap, BTreeSet};

use arca_domain::{GraphProjection, compute_child_graph, depth_bounds};

fn projection(
	id: &str,
	parents: &[&str],
	depths: &[(&str, i64)],
	agencies: &[&str],
) -> GraphProjection {
	let mut ancestors: BTreeSet<String> = parents.iter().map(|p| p.to_string()).collect();

	ancestors.extend(depths.iter().map(|(ancestor, _)| ancestor.to_string()));

	GraphProjection {
		id: id.to_string(),
		parents: parents.iter().map(|p| p.to_string()).collect(),
		ancestors,
		ancestor_depths: depths.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
		originating_agencies: agencies.iter().map(|a| a.to_string()).collect(),
		object_group_id: None,
	}
}

#[test]
fn root_unit_has_empty_graph_at_depth_one() {
	let fields = compute_child_graph(None, &[]);

	assert!(fields.ancestors.is_empty());
	assert!(fields.ancestor_depths.is_empty());
	assert_eq!(fields.min_depth, 1);
	assert_eq!(fields.max_depth, 1);
}

#[test]
fn two_parent_merge_records_shortest_paths() {
	let p1 = projection("P1", &[], &[], &[]);
	let p2 = projection("P2", &["X"], &[("X", 1)], &[]);
	let fields = compute_child_graph(None, &[p1, p2]);
	let expected: BTreeMap<String, i64> =
		[("P1".to_string(), 1), ("P2".to_string(), 1), ("X".to_string(), 2)].into_iter().collect();

	assert_eq!(fields.ancestor_depths, expected);
	assert_eq!(fields.min_depth, 1);
	assert_eq!(fields.max_depth, 3);
	assert_eq!(
		fields.ancestors,
		["P1", "P2", "X"].iter().map(|id| id.to_string()).collect::<BTreeSet<_>>()
	);
}

#[test]
fn ancestor_reachable_via_two_paths_keeps_minimum_hops() {
	// X is 1 hop through near, 3 hops through far.
	let near = projection("near", &["X"], &[("X", 1)], &[]);
	let far = projection("far", &["mid"], &[("mid", 1), ("X", 3)], &[]);
	let fields = compute_child_graph(None, &[far.clone(), near.clone()]);

	assert_eq!(fields.ancestor_depths.get("X"), Some(&2));

	// Parent order must not change the outcome.
	let flipped = compute_child_graph(None, &[near, far]);

	assert_eq!(flipped.ancestor_depths, fields.ancestor_depths);
}

#[test]
fn recomputation_is_idempotent() {
	let parents = vec![
		projection("A", &["R"], &[("R", 1)], &["agency-1"]),
		projection("B", &["R"], &[("R", 1), ("S", 4)], &["agency-2"]),
	];
	let first = compute_child_graph(Some("agency-0"), &parents);
	let second = compute_child_graph(Some("agency-0"), &parents);

	assert_eq!(first, second);
	assert_eq!(
		serde_json::to_string(&first.ancestor_depths).unwrap(),
		serde_json::to_string(&second.ancestor_depths).unwrap()
	);
}

#[test]
fn agencies_accumulate_from_self_and_parents() {
	let parents = vec![
		projection("A", &[], &[], &["agency-1"]),
		projection("B", &[], &[], &["agency-1", "agency-2"]),
	];
	let fields = compute_child_graph(Some("agency-3"), &parents);

	assert_eq!(
		fields.originating_agencies,
		["agency-1", "agency-2", "agency-3"]
			.iter()
			.map(|a| a.to_string())
			.collect::<BTreeSet<_>>()
	);
}

#[test]
fn depth_bounds_follow_the_merged_map() {
	let depths: BTreeMap<String, i64> =
		[("p".to_string(), 1), ("g".to_string(), 2), ("r".to_string(), 5)].into_iter().collect();
	let (min, max) = depth_bounds(&depths);

	assert_eq!(min, 1);
	assert_eq!(max, 6);

	let (root_min, root_max) = depth_bounds(&BTreeMap::new());

	assert_eq!(root_min, 1);
	assert_eq!(root_max, 1);
}

#[test]
fn parent_at_one_hop_beats_inherited_longer_path() {
	// The child links directly to "deep" while another parent records "deep"
	// as a distant ancestor.
	let direct = projection("deep", &[], &[], &[]);
	let other = projection("other", &["deep"], &[("deep", 4)], &[]);
	let fields = compute_child_graph(None, &[other, direct]);

	assert_eq!(fields.ancestor_depths.get("deep"), Some(&1));
}

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Minimal graph view of one archive unit, the input to every graph
/// computation. Loaded from the document store and cached by the service
/// layer's ancestor cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphProjection {
	pub id: String,
	pub parents: BTreeSet<String>,
	pub ancestors: BTreeSet<String>,
	/// Ancestor id to shortest hop count from this unit, every value >= 1.
	pub ancestor_depths: BTreeMap<String, i64>,
	pub originating_agencies: BTreeSet<String>,
	pub object_group_id: Option<String>,
}
impl GraphProjection {
	pub fn root(id: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			parents: BTreeSet::new(),
			ancestors: BTreeSet::new(),
			ancestor_depths: BTreeMap::new(),
			originating_agencies: BTreeSet::new(),
			object_group_id: None,
		}
	}
}

/// Graph fields derived for a child from its parents' projections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildGraphFields {
	pub ancestors: BTreeSet<String>,
	pub ancestor_depths: BTreeMap<String, i64>,
	pub min_depth: i32,
	pub max_depth: i32,
	pub originating_agencies: BTreeSet<String>,
}

/// Computes a child's merged graph fields from its parents' projections.
///
/// Every parent contributes itself at distance 1 and each of its own
/// ancestors at its recorded distance plus one; when the same ancestor is
/// reachable through several parents the shortest distance wins. The
/// computation is a pure function of the parent snapshots: recomputing from
/// the same inputs yields identical maps.
pub fn compute_child_graph(
	own_agency: Option<&str>,
	parents: &[GraphProjection],
) -> ChildGraphFields {
	let mut ancestors = BTreeSet::new();
	let mut ancestor_depths = BTreeMap::<String, i64>::new();
	let mut originating_agencies = BTreeSet::new();

	for parent in parents {
		ancestors.insert(parent.id.clone());
		ancestors.extend(parent.ancestors.iter().cloned());

		for (ancestor, hops) in &parent.ancestor_depths {
			let via_parent = hops.saturating_add(1);

			ancestor_depths
				.entry(ancestor.clone())
				.and_modify(|recorded| {
					if via_parent < *recorded {
						*recorded = via_parent;
					}
				})
				.or_insert(via_parent);
		}

		ancestor_depths
			.entry(parent.id.clone())
			.and_modify(|recorded| {
				if 1 < *recorded {
					*recorded = 1;
				}
			})
			.or_insert(1);

		originating_agencies.extend(parent.originating_agencies.iter().cloned());
	}

	if let Some(agency) = own_agency {
		originating_agencies.insert(agency.to_string());
	}

	let (min_depth, max_depth) = depth_bounds(&ancestor_depths);

	ChildGraphFields { ancestors, ancestor_depths, min_depth, max_depth, originating_agencies }
}

/// `(min, max)` depth derived from a merged ancestor-depth map. A unit with
/// no ancestors is a root at depth 1; otherwise the maximum is one level
/// below the deepest recorded ancestor.
pub fn depth_bounds(ancestor_depths: &BTreeMap<String, i64>) -> (i32, i32) {
	let min = ancestor_depths.values().copied().min().unwrap_or(1);
	let max = ancestor_depths.values().copied().max().unwrap_or(0) + 1;

	(clamp_depth(min), clamp_depth(max))
}

fn clamp_depth(value: i64) -> i32 {
	value.clamp(1, i32::MAX as i64) as i32
}

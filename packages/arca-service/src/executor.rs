use std::collections::BTreeSet;

use crate::{
	Error, MetadataService, Result,
	query::{IndexQuery, Predicate},
	request::{Action, Depth, MetadataRequest, QueryStage, ResultSet},
};
use arca_storage::{
	models::DocumentKind,
	qdrant::{ANCESTORS_FIELD, MAX_DEPTH_FIELD, MIN_DEPTH_FIELD, PARENTS_FIELD, UNIT_IDS_FIELD},
};

struct StagePlan {
	query: IndexQuery,
	/// Descending hop count needing a store-side confirmation pass; the
	/// ancestor-containment check alone is over-inclusive at this tier.
	confirm_hops: Option<i64>,
}

impl MetadataService {
	/// Executes one parsed multi-stage request. `restriction` is a prior
	/// result set narrowing the valid starting roots; `None` or an empty
	/// set means unrestricted.
	pub async fn execute(
		&self,
		request: &MetadataRequest,
		restriction: Option<&ResultSet>,
	) -> Result<ResultSet> {
		let mut current = self.validate_roots(request, restriction).await?;
		let mut current_kind = DocumentKind::Unit;
		let mut last_scores: Option<Vec<f32>> = None;

		for (stage_index, stage) in request.stages.iter().enumerate() {
			let is_last = stage_index + 1 == request.stages.len();
			let plan = self.plan_stage(request, stage, &current, current_kind, is_last).await?;
			let page = self.backends.index.search(&plan.query).await?;
			let mut ids = page.ids;
			let mut scores = page.scores;

			if let Some(hops) = plan.confirm_hops {
				ids = self.confirm_descendant_hops(request, ids, &current, hops).await?;
				scores = None;
			}
			if ids.is_empty() {
				return Err(Error::NoResult {
					stage: stage_index,
					query: Box::new(plan.query),
					previous_ids: current,
				});
			}

			current = ids;
			last_scores = scores;

			if request.kind == DocumentKind::ObjectGroup {
				current_kind = DocumentKind::ObjectGroup;
			}
		}

		// A stage-less ObjectGroup read still has to cross from the unit
		// anchors to the groups they link.
		if request.kind == DocumentKind::ObjectGroup
			&& current_kind == DocumentKind::Unit
			&& !current.is_empty()
			&& !matches!(request.action, Action::Insert { .. })
		{
			let query = IndexQuery {
				kind: DocumentKind::ObjectGroup,
				tenant: request.tenant,
				predicate: Predicate::In {
					field: UNIT_IDS_FIELD.to_string(),
					values: current.iter().map(|id| id.clone().into()).collect(),
				},
				sort: request.sort.clone(),
				offset: request.offset,
				limit: self.effective_limit(request.limit),
				with_score: false,
			};
			let page = self.backends.index.search(&query).await?;

			if page.ids.is_empty() {
				return Err(Error::NoResult {
					stage: request.stages.len(),
					query: Box::new(query),
					previous_ids: current,
				});
			}

			current = page.ids;
			last_scores = None;
		}

		let matched = ResultSet {
			kind: request.kind,
			ids: current,
			scores: last_scores,
			documents: None,
		};

		match &request.action {
			Action::Select => self.finish_select(request, matched).await,
			Action::Insert { body } => self.execute_insert(request, body, &matched).await,
			Action::Update { mutations, multiple } =>
				self.execute_update(request, mutations, *multiple, &matched).await,
			Action::Delete { multiple } =>
				self.execute_delete(request, *multiple, &matched).await,
		}
	}

	pub(crate) fn effective_limit(&self, requested: u64) -> u64 {
		let window = self.cfg.executor.max_result_window;

		if requested == 0 { window } else { requested.min(window) }
	}

	/// Filters the requested roots against the restriction set: a root
	/// survives when it is in the restriction, or is a registered ancestor
	/// or descendant of it. An absent or empty restriction is unrestricted.
	async fn validate_roots(
		&self,
		request: &MetadataRequest,
		restriction: Option<&ResultSet>,
	) -> Result<Vec<String>> {
		let mut roots = request.roots.clone();

		roots.sort();
		roots.dedup();

		let Some(restriction) = restriction.filter(|set| !set.is_empty()) else {
			return Ok(roots);
		};

		// ObjectGroup restrictions are resolved to their parent units so
		// the ancestry check always runs over unit graph projections.
		let restriction_units: Vec<String> = match restriction.kind {
			DocumentKind::Unit => restriction.ids.clone(),
			DocumentKind::ObjectGroup => {
				let groups = self
					.backends
					.store
					.get_many(DocumentKind::ObjectGroup, request.tenant, &restriction.ids)
					.await?;
				let mut units = BTreeSet::new();

				for group in groups {
					if let Some(group) = group.as_object_group() {
						units.extend(group.parent_unit_ids.iter().cloned());
					}
				}

				units.into_iter().collect()
			},
		};

		if restriction_units.is_empty() {
			return Ok(vec![]);
		}

		let mut wanted = roots.clone();

		wanted.extend(restriction_units.iter().cloned());

		let projections = self.graph_cache.load_present(&wanted).await?;
		let restriction_set: BTreeSet<&str> =
			restriction_units.iter().map(String::as_str).collect();
		let mut restriction_ancestors: BTreeSet<&str> = BTreeSet::new();

		for id in &restriction_units {
			if let Some(projection) = projections.get(id) {
				restriction_ancestors.extend(projection.ancestors.iter().map(String::as_str));
			}
		}

		let valid = roots
			.into_iter()
			.filter(|root| {
				if restriction_set.contains(root.as_str())
					|| restriction_ancestors.contains(root.as_str())
				{
					return true;
				}

				projections
					.get(root)
					.map(|projection| {
						projection
							.ancestors
							.iter()
							.any(|ancestor| restriction_set.contains(ancestor.as_str()))
					})
					.unwrap_or(false)
			})
			.collect();

		Ok(valid)
	}

	async fn plan_stage(
		&self,
		request: &MetadataRequest,
		stage: &QueryStage,
		current: &[String],
		current_kind: DocumentKind,
		is_last: bool,
	) -> Result<StagePlan> {
		let mut clauses = vec![stage.predicate.clone()];
		let mut confirm_hops = None;

		match request.kind {
			DocumentKind::Unit => match stage.depth {
				Depth::Exact(depth) => {
					if depth == 0 {
						return Err(Error::InvalidRequest {
							message: "exact depth must be greater than zero".to_string(),
						});
					}

					// The unit's deepest recorded level must sit exactly at
					// the requested one; min_depth is bounded as well so a
					// multi-parent unit cannot smuggle in a shallower path.
					clauses.push(Predicate::Range {
						field: MIN_DEPTH_FIELD.to_string(),
						gte: None,
						lte: Some(depth as i64),
					});
					clauses.push(Predicate::Range {
						field: MAX_DEPTH_FIELD.to_string(),
						gte: Some(depth as i64),
						lte: Some(depth as i64),
					});

					if !current.is_empty() {
						clauses.push(in_clause(ANCESTORS_FIELD, current));
					}
				},
				Depth::Relative(0) =>
					if !current.is_empty() {
						clauses.push(Predicate::Ids(current.to_vec()));
					},
				Depth::Relative(offset) if current.is_empty() => {
					let bound = if offset > 0 { offset as i64 + 1 } else { 1 };

					clauses.push(Predicate::Range {
						field: MAX_DEPTH_FIELD.to_string(),
						gte: None,
						lte: Some(bound),
					});
				},
				Depth::Relative(1) => clauses.push(in_clause(PARENTS_FIELD, current)),
				Depth::Relative(offset) if offset > 1 => {
					clauses.push(in_clause(ANCESTORS_FIELD, current));

					confirm_hops = Some(offset as i64);
				},
				Depth::Relative(offset) => {
					let candidates = self.ascend(current, (-offset) as i64).await?;

					clauses.push(Predicate::Ids(candidates));
				},
			},
			DocumentKind::ObjectGroup =>
				if current.is_empty() {
					// Pure predicate over the whole collection.
				} else if current_kind == DocumentKind::Unit {
					clauses.push(in_clause(UNIT_IDS_FIELD, current));
				} else {
					clauses.push(Predicate::Ids(current.to_vec()));
				},
		}

		let select_page = is_last && matches!(request.action, Action::Select);
		let query = IndexQuery {
			kind: request.kind,
			tenant: request.tenant,
			predicate: Predicate::and(clauses),
			sort: if select_page { request.sort.clone() } else { None },
			offset: if select_page { request.offset } else { 0 },
			limit: if select_page {
				self.effective_limit(request.limit)
			} else {
				self.cfg.executor.max_result_window
			},
			with_score: request.include_score && is_last,
		};

		Ok(StagePlan { query, confirm_hops })
	}

	/// Shortest-path ancestors of the previous set at exactly `hops` levels
	/// up, resolved from cached graph projections.
	async fn ascend(&self, current: &[String], hops: i64) -> Result<Vec<String>> {
		let projections = self.graph_cache.load_present(current).await?;
		let mut candidates = BTreeSet::new();

		for id in current {
			let Some(projection) = projections.get(id) else {
				continue;
			};

			if hops == 1 {
				candidates.extend(projection.parents.iter().cloned());
			} else {
				candidates.extend(
					projection
						.ancestor_depths
						.iter()
						.filter(|(_, distance)| **distance == hops)
						.map(|(ancestor, _)| ancestor.clone()),
				);
			}
		}

		Ok(candidates.into_iter().collect())
	}

	/// Second phase of the descending depth query: the index candidates
	/// are checked against their authoritative ancestor-depth maps, keeping
	/// only units whose shortest path to some previous-set id is exactly
	/// the requested hop count.
	async fn confirm_descendant_hops(
		&self,
		request: &MetadataRequest,
		candidates: Vec<String>,
		previous: &[String],
		hops: i64,
	) -> Result<Vec<String>> {
		if candidates.is_empty() {
			return Ok(candidates);
		}

		let docs = self
			.backends
			.store
			.get_many(DocumentKind::Unit, request.tenant, &candidates)
			.await?;
		let confirmed: BTreeSet<&str> = docs
			.iter()
			.filter_map(|doc| doc.as_unit())
			.filter(|unit| {
				previous.iter().any(|prev| {
					unit.ancestor_depths.0.get(prev).is_some_and(|distance| *distance == hops)
				})
			})
			.map(|unit| unit.unit_id.as_str())
			.collect();

		Ok(candidates.into_iter().filter(|id| confirmed.contains(id.as_str())).collect())
	}
}

fn in_clause(field: &str, ids: &[String]) -> Predicate {
	Predicate::In {
		field: field.to_string(),
		values: ids.iter().map(|id| id.clone().into()).collect(),
	}
}

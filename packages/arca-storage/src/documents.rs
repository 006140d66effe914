use std::collections::BTreeMap;

use sqlx::{QueryBuilder, types::Json};

use crate::{
	Error, Result,
	db::Db,
	models::{ObjectGroup, StoreFilter, Unit},
};
use arca_domain::GraphProjection;

const UNIT_COLUMNS: &str = "\
	unit_id,
	tenant_id,
	parents,
	ancestors,
	ancestor_depths,
	min_depth,
	max_depth,
	child_count,
	originating_agency,
	originating_agencies,
	unit_type,
	object_group_id,
	content,
	version,
	created_at,
	updated_at";

const OBJECT_GROUP_COLUMNS: &str = "\
	object_group_id,
	tenant_id,
	parent_unit_ids,
	ancestors,
	originating_agencies,
	copy_count,
	content,
	version,
	created_at,
	updated_at";

#[derive(sqlx::FromRow)]
struct ProjectionRow {
	unit_id: String,
	parents: Vec<String>,
	ancestors: Vec<String>,
	ancestor_depths: Json<BTreeMap<String, i64>>,
	originating_agencies: Vec<String>,
	object_group_id: Option<String>,
}

pub async fn get_unit(db: &Db, tenant: Option<i32>, unit_id: &str) -> Result<Option<Unit>> {
	let unit = sqlx::query_as::<_, Unit>(&format!(
		"\
SELECT
{UNIT_COLUMNS}
FROM units
WHERE unit_id = $1 AND ($2::int4 IS NULL OR tenant_id = $2)"
	))
	.bind(unit_id)
	.bind(tenant)
	.fetch_optional(&db.pool)
	.await?;

	Ok(unit)
}

pub async fn get_object_group(
	db: &Db,
	tenant: Option<i32>,
	object_group_id: &str,
) -> Result<Option<ObjectGroup>> {
	let group = sqlx::query_as::<_, ObjectGroup>(&format!(
		"\
SELECT
{OBJECT_GROUP_COLUMNS}
FROM object_groups
WHERE object_group_id = $1 AND ($2::int4 IS NULL OR tenant_id = $2)"
	))
	.bind(object_group_id)
	.bind(tenant)
	.fetch_optional(&db.pool)
	.await?;

	Ok(group)
}

pub async fn units_by_ids(db: &Db, tenant: Option<i32>, ids: &[String]) -> Result<Vec<Unit>> {
	if ids.is_empty() {
		return Ok(vec![]);
	}

	let units = sqlx::query_as::<_, Unit>(&format!(
		"\
SELECT
{UNIT_COLUMNS}
FROM units
WHERE unit_id = ANY($1) AND ($2::int4 IS NULL OR tenant_id = $2)"
	))
	.bind(ids)
	.bind(tenant)
	.fetch_all(&db.pool)
	.await?;

	Ok(units)
}

pub async fn object_groups_by_ids(
	db: &Db,
	tenant: Option<i32>,
	ids: &[String],
) -> Result<Vec<ObjectGroup>> {
	if ids.is_empty() {
		return Ok(vec![]);
	}

	let groups = sqlx::query_as::<_, ObjectGroup>(&format!(
		"\
SELECT
{OBJECT_GROUP_COLUMNS}
FROM object_groups
WHERE object_group_id = ANY($1) AND ($2::int4 IS NULL OR tenant_id = $2)"
	))
	.bind(ids)
	.bind(tenant)
	.fetch_all(&db.pool)
	.await?;

	Ok(groups)
}

pub async fn insert_unit(db: &Db, unit: &Unit) -> Result<()> {
	let result = sqlx::query(&format!(
		"\
INSERT INTO units (
{UNIT_COLUMNS}
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
	))
	.bind(&unit.unit_id)
	.bind(unit.tenant_id)
	.bind(&unit.parents)
	.bind(&unit.ancestors)
	.bind(&unit.ancestor_depths)
	.bind(unit.min_depth)
	.bind(unit.max_depth)
	.bind(unit.child_count)
	.bind(&unit.originating_agency)
	.bind(&unit.originating_agencies)
	.bind(&unit.unit_type)
	.bind(&unit.object_group_id)
	.bind(&unit.content)
	.bind(unit.version)
	.bind(unit.created_at)
	.bind(unit.updated_at)
	.execute(&db.pool)
	.await;

	map_insert_result(result, &unit.unit_id)
}

pub async fn insert_object_group(db: &Db, group: &ObjectGroup) -> Result<()> {
	let result = sqlx::query(&format!(
		"\
INSERT INTO object_groups (
{OBJECT_GROUP_COLUMNS}
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
	))
	.bind(&group.object_group_id)
	.bind(group.tenant_id)
	.bind(&group.parent_unit_ids)
	.bind(&group.ancestors)
	.bind(&group.originating_agencies)
	.bind(group.copy_count)
	.bind(&group.content)
	.bind(group.version)
	.bind(group.created_at)
	.bind(group.updated_at)
	.execute(&db.pool)
	.await;

	map_insert_result(result, &group.object_group_id)
}

/// Version-guarded replace; the returned count is the optimistic-concurrency
/// signal (0 means another writer advanced the version first).
pub async fn replace_unit_if_version(db: &Db, unit: &Unit, expected_version: i64) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE units
SET
	parents = $2,
	ancestors = $3,
	ancestor_depths = $4,
	min_depth = $5,
	max_depth = $6,
	child_count = $7,
	originating_agency = $8,
	originating_agencies = $9,
	unit_type = $10,
	object_group_id = $11,
	content = $12,
	version = $13,
	updated_at = $14
WHERE unit_id = $1 AND version = $15",
	)
	.bind(&unit.unit_id)
	.bind(&unit.parents)
	.bind(&unit.ancestors)
	.bind(&unit.ancestor_depths)
	.bind(unit.min_depth)
	.bind(unit.max_depth)
	.bind(unit.child_count)
	.bind(&unit.originating_agency)
	.bind(&unit.originating_agencies)
	.bind(&unit.unit_type)
	.bind(&unit.object_group_id)
	.bind(&unit.content)
	.bind(unit.version)
	.bind(unit.updated_at)
	.bind(expected_version)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn replace_object_group_if_version(
	db: &Db,
	group: &ObjectGroup,
	expected_version: i64,
) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE object_groups
SET
	parent_unit_ids = $2,
	ancestors = $3,
	originating_agencies = $4,
	copy_count = $5,
	content = $6,
	version = $7,
	updated_at = $8
WHERE object_group_id = $1 AND version = $9",
	)
	.bind(&group.object_group_id)
	.bind(&group.parent_unit_ids)
	.bind(&group.ancestors)
	.bind(&group.originating_agencies)
	.bind(group.copy_count)
	.bind(&group.content)
	.bind(group.version)
	.bind(group.updated_at)
	.bind(expected_version)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn delete_units_by_ids(db: &Db, tenant: Option<i32>, ids: &[String]) -> Result<u64> {
	if ids.is_empty() {
		return Ok(0);
	}

	let result = sqlx::query(
		"DELETE FROM units WHERE unit_id = ANY($1) AND ($2::int4 IS NULL OR tenant_id = $2)",
	)
	.bind(ids)
	.bind(tenant)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn delete_object_groups_by_ids(
	db: &Db,
	tenant: Option<i32>,
	ids: &[String],
) -> Result<u64> {
	if ids.is_empty() {
		return Ok(0);
	}

	let result = sqlx::query(
		"\
DELETE FROM object_groups
WHERE object_group_id = ANY($1) AND ($2::int4 IS NULL OR tenant_id = $2)",
	)
	.bind(ids)
	.bind(tenant)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

/// Batched graph-projection load, one round trip for the whole id set.
pub async fn unit_graph_projections(db: &Db, ids: &[String]) -> Result<Vec<GraphProjection>> {
	if ids.is_empty() {
		return Ok(vec![]);
	}

	let rows = sqlx::query_as::<_, ProjectionRow>(
		"\
SELECT
	unit_id,
	parents,
	ancestors,
	ancestor_depths,
	originating_agencies,
	object_group_id
FROM units
WHERE unit_id = ANY($1)",
	)
	.bind(ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows
		.into_iter()
		.map(|row| GraphProjection {
			id: row.unit_id,
			parents: row.parents.into_iter().collect(),
			ancestors: row.ancestors.into_iter().collect(),
			ancestor_depths: row.ancestor_depths.0,
			originating_agencies: row.originating_agencies.into_iter().collect(),
			object_group_id: row.object_group_id,
		})
		.collect())
}

pub async fn find_units(
	db: &Db,
	tenant: Option<i32>,
	filter: &StoreFilter,
	offset: i64,
	limit: i64,
) -> Result<Vec<Unit>> {
	let mut builder = QueryBuilder::new(format!(
		"\
SELECT
{UNIT_COLUMNS}
FROM units
WHERE TRUE"
	));

	push_filter(&mut builder, tenant, filter, "unit_id", "parents");
	builder.push(" ORDER BY unit_id OFFSET ").push_bind(offset).push(" LIMIT ").push_bind(limit);

	let units = builder.build_query_as::<Unit>().fetch_all(&db.pool).await?;

	Ok(units)
}

pub async fn find_object_groups(
	db: &Db,
	tenant: Option<i32>,
	filter: &StoreFilter,
	offset: i64,
	limit: i64,
) -> Result<Vec<ObjectGroup>> {
	let mut builder = QueryBuilder::new(format!(
		"\
SELECT
{OBJECT_GROUP_COLUMNS}
FROM object_groups
WHERE TRUE"
	));

	push_filter(&mut builder, tenant, filter, "object_group_id", "parent_unit_ids");
	builder
		.push(" ORDER BY object_group_id OFFSET ")
		.push_bind(offset)
		.push(" LIMIT ")
		.push_bind(limit);

	let groups = builder.build_query_as::<ObjectGroup>().fetch_all(&db.pool).await?;

	Ok(groups)
}

fn push_filter(
	builder: &mut QueryBuilder<'_, sqlx::Postgres>,
	tenant: Option<i32>,
	filter: &StoreFilter,
	id_column: &str,
	parent_column: &str,
) {
	if let Some(tenant) = tenant {
		builder.push(" AND tenant_id = ").push_bind(tenant);
	}

	match filter {
		StoreFilter::All => {},
		StoreFilter::Ids(ids) => {
			builder.push(format!(" AND {id_column} = ANY(")).push_bind(ids.clone()).push(")");
		},
		StoreFilter::ParentContains(parent) => {
			builder
				.push(format!(" AND {parent_column} @> ARRAY["))
				.push_bind(parent.clone())
				.push("]");
		},
	}
}

fn map_insert_result(
	result: std::result::Result<sqlx::postgres::PgQueryResult, sqlx::Error>,
	id: &str,
) -> Result<()> {
	match result {
		Ok(_) => Ok(()),
		Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() =>
			Err(Error::Conflict(format!("document already exists; id={id}"))),
		Err(err) => Err(err.into()),
	}
}

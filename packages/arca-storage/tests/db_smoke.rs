use tokio::runtime::Runtime;

use arca_config::Postgres;
use arca_storage::db::Db;

#[test]
#[ignore = "Requires external Postgres. Set ARCA_PG_DSN to run."]
fn metadata_tables_exist_after_bootstrap() {
	let Ok(dsn) = std::env::var("ARCA_PG_DSN") else {
		eprintln!("Skipping metadata_tables_exist_after_bootstrap; set ARCA_PG_DSN to run.");

		return;
	};
	let rt = Runtime::new().expect("Failed to build runtime.");

	rt.block_on(async {
		let cfg = Postgres { dsn, pool_max_conns: 1 };
		let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

		db.ensure_schema().await.expect("Failed to ensure schema.");

		for table in ["units", "object_groups"] {
			let count: i64 = sqlx::query_scalar(
				"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
			)
			.bind(table)
			.fetch_one(&db.pool)
			.await
			.expect("Failed to query schema tables.");

			assert_eq!(count, 1, "table {table} should exist");
		}
	});
}

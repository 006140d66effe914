use std::{sync::Arc, time::Duration};

use arca_service::{Error, GraphCache};
use arca_testkit::{MemoryStore, root_unit};

fn ids(raw: &[&str]) -> Vec<String> {
	raw.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn batch_load_uses_one_store_round_trip() {
	let store = Arc::new(MemoryStore::new());

	for id in ["a", "b", "c"] {
		store.seed_unit(root_unit(id, 0));
	}

	let cache = GraphCache::new(store.clone(), 100, Duration::from_secs(60));
	let wanted = ids(&["a", "b", "c"]);
	let loaded = cache.load_many(&wanted).await.expect("Batch load failed.");

	assert_eq!(loaded.len(), 3);
	assert_eq!(store.projection_calls(), 1);

	// Warm hits never touch the store again.
	cache.load_many(&wanted).await.expect("Warm load failed.");

	assert_eq!(store.projection_calls(), 1);
}

#[tokio::test]
async fn missing_id_fails_the_whole_batch_and_names_it() {
	let store = Arc::new(MemoryStore::new());

	store.seed_unit(root_unit("a", 0));

	let cache = GraphCache::new(store.clone(), 100, Duration::from_secs(60));
	let err = cache
		.load_many(&ids(&["a", "ghost"]))
		.await
		.expect_err("Load with a missing id should fail.");

	match err {
		Error::NotFound { ids: missing, .. } => assert_eq!(missing, vec!["ghost".to_string()]),
		other => panic!("Expected NotFound, got {other:?}"),
	}
}

#[tokio::test]
async fn invalidate_all_forces_a_reload() {
	let store = Arc::new(MemoryStore::new());

	store.seed_unit(root_unit("a", 0));

	let cache = GraphCache::new(store.clone(), 100, Duration::from_secs(60));

	cache.load_many(&ids(&["a"])).await.expect("Load failed.");
	assert_eq!(store.projection_calls(), 1);

	cache.invalidate_all();
	cache.load_many(&ids(&["a"])).await.expect("Reload failed.");
	assert_eq!(store.projection_calls(), 2);
}

#[tokio::test]
async fn stale_entries_are_served_then_refreshed_in_the_background() {
	let store = Arc::new(MemoryStore::new());

	store.seed_unit(root_unit("p", 0));
	store.seed_unit(root_unit("a", 0));

	let cache = GraphCache::new(store.clone(), 100, Duration::from_millis(50));
	let first = cache.load_many(&ids(&["a"])).await.expect("Load failed.");

	assert!(first.get("a").expect("a should load").parents.is_empty());

	// Reparent behind the cache's back, then let the entry go stale.
	let mut reparented = root_unit("a", 0);

	reparented.parents = vec!["p".to_string()];
	store.seed_unit(reparented);
	tokio::time::sleep(Duration::from_millis(80)).await;

	// The stale hit still answers immediately with the old projection.
	let stale = cache.load_many(&ids(&["a"])).await.expect("Stale load failed.");

	assert!(stale.get("a").expect("a should load").parents.is_empty());

	tokio::time::sleep(Duration::from_millis(80)).await;

	let refreshed = cache.load_many(&ids(&["a"])).await.expect("Refreshed load failed.");

	assert_eq!(
		refreshed
			.get("a")
			.expect("a should load")
			.parents
			.iter()
			.map(String::as_str)
			.collect::<Vec<_>>(),
		vec!["p"]
	);
	assert!(store.projection_calls() >= 2);
}

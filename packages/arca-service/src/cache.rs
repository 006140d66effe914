use std::{
	collections::{BTreeMap, HashMap},
	num::NonZeroUsize,
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use lru::LruCache;
use tokio::sync::watch;

use crate::{DocumentStore, Error, Result};
use arca_domain::GraphProjection;

#[derive(Clone)]
struct CacheEntry {
	projection: GraphProjection,
	loaded_at: Instant,
}

struct Shared {
	store: Arc<dyn DocumentStore>,
	refresh_after: Duration,
	entries: Mutex<LruCache<String, CacheEntry>>,
	/// Ids with a load in flight; waiters subscribe instead of issuing a
	/// second store round trip for the same key.
	inflight: Mutex<HashMap<String, watch::Receiver<bool>>>,
}
impl Shared {
	fn lookup(&self, id: &str) -> Option<GraphProjection> {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.get(id).map(|entry| entry.projection.clone())
	}

	fn store_entries(&self, projections: &[GraphProjection], loaded_at: Instant) {
		let mut entries = self.entries.lock().unwrap_or_else(|err| err.into_inner());

		for projection in projections {
			entries.put(projection.id.clone(), CacheEntry {
				projection: projection.clone(),
				loaded_at,
			});
		}
	}

	fn finish_flights(&self, flights: Vec<(String, watch::Sender<bool>)>) {
		let mut inflight = self.inflight.lock().unwrap_or_else(|err| err.into_inner());

		for (id, sender) in flights {
			inflight.remove(&id);

			let _ = sender.send(true);
		}
	}
}

/// Bounded, time-refreshing cache of unit graph projections, used to
/// resolve ancestor chains without a store round trip per request. Entries
/// older than the refresh window are served stale once and refreshed in the
/// background; cold misses block and load all missing keys in one batched
/// query. Never the backing store for query execution.
#[derive(Clone)]
pub struct GraphCache {
	shared: Arc<Shared>,
}
impl GraphCache {
	pub fn new(store: Arc<dyn DocumentStore>, capacity: u64, refresh_after: Duration) -> Self {
		let capacity = NonZeroUsize::new(capacity as usize).unwrap_or(NonZeroUsize::MIN);

		Self {
			shared: Arc::new(Shared {
				store,
				refresh_after,
				entries: Mutex::new(LruCache::new(capacity)),
				inflight: Mutex::new(HashMap::new()),
			}),
		}
	}

	/// Strict batch load: fails with `NotFound` naming exactly the ids the
	/// store could not resolve, never returning a partial map silently.
	pub async fn load_many(&self, ids: &[String]) -> Result<BTreeMap<String, GraphProjection>> {
		let found = self.load_present(ids).await?;
		let mut missing: Vec<String> =
			ids.iter().filter(|id| !found.contains_key(*id)).cloned().collect();

		missing.sort();
		missing.dedup();

		if !missing.is_empty() {
			return Err(Error::NotFound {
				message: format!("missing parent(s): {}", missing.join(", ")),
				ids: missing,
			});
		}

		Ok(found)
	}

	/// Tolerant batch load: unresolved ids are simply absent from the map.
	pub async fn load_present(&self, ids: &[String]) -> Result<BTreeMap<String, GraphProjection>> {
		let now = Instant::now();
		let mut found = BTreeMap::new();
		let mut stale = Vec::new();
		let mut missing = Vec::new();

		{
			let mut entries = self.shared.entries.lock().unwrap_or_else(|err| err.into_inner());

			for id in ids {
				if found.contains_key(id) {
					continue;
				}

				match entries.get(id) {
					Some(entry) => {
						if now.duration_since(entry.loaded_at) >= self.shared.refresh_after {
							stale.push(id.clone());
						}

						found.insert(id.clone(), entry.projection.clone());
					},
					None => missing.push(id.clone()),
				}
			}
		}

		if !stale.is_empty() {
			self.spawn_refresh(stale);
		}

		let (leaders, waiters) = self.register_flights(missing);

		if !leaders.is_empty() {
			let ids: Vec<String> = leaders.iter().map(|(id, _)| id.clone()).collect();
			let loaded = self.shared.store.graph_projections(&ids).await;

			match loaded {
				Ok(projections) => {
					self.shared.store_entries(&projections, Instant::now());
					self.shared.finish_flights(leaders);

					for projection in projections {
						found.insert(projection.id.clone(), projection);
					}
				},
				Err(err) => {
					self.shared.finish_flights(leaders);

					return Err(err);
				},
			}
		}

		for (id, mut receiver) in waiters {
			if !*receiver.borrow() {
				let _ = receiver.changed().await;
			}
			if let Some(projection) = self.shared.lookup(&id) {
				found.insert(id, projection);
			}
		}

		Ok(found)
	}

	/// Drops every entry; called by the owning component at logical request
	/// boundaries so unrelated requests never observe each other's state.
	pub fn invalidate_all(&self) {
		let mut entries = self.shared.entries.lock().unwrap_or_else(|err| err.into_inner());

		entries.clear();
	}

	fn register_flights(
		&self,
		ids: Vec<String>,
	) -> (Vec<(String, watch::Sender<bool>)>, Vec<(String, watch::Receiver<bool>)>) {
		let mut leaders = Vec::new();
		let mut waiters = Vec::new();
		let mut inflight = self.shared.inflight.lock().unwrap_or_else(|err| err.into_inner());

		for id in ids {
			match inflight.get(&id) {
				Some(receiver) => waiters.push((id, receiver.clone())),
				None => {
					let (sender, receiver) = watch::channel(false);

					inflight.insert(id.clone(), receiver);
					leaders.push((id, sender));
				},
			}
		}

		(leaders, waiters)
	}

	fn spawn_refresh(&self, ids: Vec<String>) {
		let (leaders, _) = self.register_flights(ids);

		if leaders.is_empty() {
			return;
		}

		let shared = self.shared.clone();

		tokio::spawn(async move {
			let ids: Vec<String> = leaders.iter().map(|(id, _)| id.clone()).collect();

			match shared.store.graph_projections(&ids).await {
				Ok(projections) => shared.store_entries(&projections, Instant::now()),
				Err(err) => {
					tracing::warn!(error = %err, "Background graph-projection refresh failed.");
				},
			}

			shared.finish_flights(leaders);
		});
	}
}

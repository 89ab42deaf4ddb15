use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::debug;

use crate::{error::AppResult, models::UNKNOWN_GENRE, store::Store};

/// Genre id to name lookup built from a full scan of the genre collection.
#[derive(Clone, Debug, Default)]
pub struct GenreIndex {
    names: HashMap<i64, String>,
}

impl GenreIndex {
    pub async fn build(store: &Store) -> AppResult<Self> {
        let names: HashMap<i64, String> =
            store.all_genres().await?.into_iter().map(|g| (g.id, g.name)).collect();
        debug!(genres = names.len(), "built genre index");
        Ok(Self { names })
    }

    pub fn resolve(&self, genre_id: i64) -> &str {
        self.names.get(&genre_id).map(String::as_str).unwrap_or(UNKNOWN_GENRE)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Owned cache around [`GenreIndex`].
///
/// A cached index is served for at most `ttl_seconds` after it was built, so genre
/// writes that bypass [`GenreIndexCache::invalidate`] become visible within that
/// window. A TTL of zero rebuilds the index on every call.
pub struct GenreIndexCache {
    ttl_seconds: i64,
    slot: RwLock<Slot>,
}

#[derive(Default)]
struct Slot {
    /// Bumped by every invalidation; a build started under an older generation is not kept.
    generation: u64,
    entry: Option<(i64, Arc<GenreIndex>)>,
}

impl GenreIndexCache {
    pub fn new(ttl_seconds: i64) -> Self {
        Self { ttl_seconds: ttl_seconds.max(0), slot: RwLock::new(Slot::default()) }
    }

    pub async fn get(&self, store: &Store) -> AppResult<Arc<GenreIndex>> {
        let generation = {
            let slot = self.slot.read().await;
            if let Some((built_at, index)) = slot.entry.as_ref() {
                if self.is_fresh(*built_at) {
                    return Ok(index.clone());
                }
            }
            slot.generation
        };

        let index = Arc::new(GenreIndex::build(store).await?);
        self.install(generation, index.clone()).await;
        Ok(index)
    }

    pub async fn invalidate(&self) {
        let mut slot = self.slot.write().await;
        slot.generation += 1;
        slot.entry = None;
    }

    async fn install(&self, generation: u64, index: Arc<GenreIndex>) {
        if self.ttl_seconds == 0 {
            return;
        }
        let mut slot = self.slot.write().await;
        if slot.generation == generation {
            slot.entry = Some((now_sec(), index));
        } else {
            debug!("discarding genre index built before invalidation");
        }
    }

    fn is_fresh(&self, built_at: i64) -> bool {
        self.ttl_seconds > 0 && now_sec().saturating_sub(built_at) <= self.ttl_seconds
    }
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

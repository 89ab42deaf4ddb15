pub mod aggregate;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod genre_index;
pub mod models;
pub mod query;
pub mod routes;
pub mod store;
pub mod sync;
pub mod tmdb;

use std::sync::Arc;

use crate::{config::Config, genre_index::GenreIndexCache, store::Store};

/// Everything a request handler needs. The store is opened once at startup and closed at shutdown.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub genres: Arc<GenreIndexCache>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Store) -> Self {
        let genres = Arc::new(GenreIndexCache::new(config.genre_index_ttl_secs));
        Self { config, store, genres }
    }
}

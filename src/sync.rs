use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    error::{AppError, AppResult},
    genre_index::GenreIndexCache,
    models::{Film, FilmPatch, Genre},
    store::Store,
    tmdb::CatalogSource,
};

/// Full-replace upsert of a manually submitted film record.
pub async fn add_film(store: &Store, doc: serde_json::Value) -> AppResult<Film> {
    let film = Film::from_document(doc)?;
    store.upsert_film(&film).await?;
    debug!(film_id = film.id, "film stored");
    Ok(film)
}

/// Partial merge of `doc` into an existing film. Never creates a film.
pub async fn update_film(store: &Store, id: i64, doc: serde_json::Value) -> AppResult<Film> {
    let patch = FilmPatch::from_document(doc)?;
    if patch.id.is_some_and(|patch_id| patch_id != id) {
        return Err(AppError::validation(format!("update body id does not match film {id}")));
    }

    store
        .merge_film(id, patch)
        .await?
        .ok_or_else(|| AppError::not_found(format!("film {id} not found")))
}

pub async fn delete_film(store: &Store, id: i64) -> AppResult<()> {
    if !store.delete_film(id).await? {
        return Err(AppError::not_found(format!("film {id} not found")));
    }
    debug!(film_id = id, "film deleted");
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PageOutcome {
    pub written: usize,
    pub skipped: usize,
}

/// Upserts one page of catalog records. Records that are not valid films are skipped.
pub async fn apply_film_page(
    store: &Store,
    records: Vec<serde_json::Value>,
) -> AppResult<PageOutcome> {
    let mut outcome = PageOutcome::default();
    for record in records {
        match Film::from_document(record) {
            Ok(film) => {
                store.upsert_film(&film).await?;
                outcome.written += 1;
            },
            Err(err) => {
                warn!(error = %err, "skipping malformed catalog record");
                outcome.skipped += 1;
            },
        }
    }
    Ok(outcome)
}

pub async fn apply_genres(
    store: &Store,
    cache: &GenreIndexCache,
    genres: &[Genre],
) -> AppResult<usize> {
    for genre in genres {
        store.upsert_genre(genre).await?;
    }
    cache.invalidate().await;
    Ok(genres.len())
}

pub async fn ingest_genres<S: CatalogSource>(
    source: &S,
    store: &Store,
    cache: &GenreIndexCache,
) -> AppResult<usize> {
    let genres = source.genres().await?;
    let written = apply_genres(store, cache, &genres).await?;
    info!(genres = written, "genres ingested");
    Ok(written)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub pages_ok: u32,
    pub pages_failed: Vec<u32>,
    pub films_written: usize,
    pub films_skipped: usize,
}

/// Pulls pages `1..=pages` and applies each independently; a failed page does not stop the run.
pub async fn ingest_films<S: CatalogSource>(source: &S, store: &Store, pages: u32) -> IngestReport {
    let mut report = IngestReport::default();

    for page in 1..=pages {
        let result = async {
            let fetched = source.discover_page(page).await?;
            let outcome = apply_film_page(store, fetched.records).await?;
            Ok::<_, AppError>((outcome, fetched.total_pages))
        }
        .await;

        match result {
            Ok((outcome, total_pages)) => {
                info!(
                    page = page,
                    written = outcome.written,
                    skipped = outcome.skipped,
                    "page ingested"
                );
                report.pages_ok += 1;
                report.films_written += outcome.written;
                report.films_skipped += outcome.skipped;

                if total_pages.is_some_and(|total| page >= total) {
                    debug!(page = page, "catalog exhausted");
                    break;
                }
            },
            Err(err) => {
                warn!(page = page, error = %err, "failed to ingest page");
                report.pages_failed.push(page);
            },
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;
    use crate::{query, tmdb::CatalogPage};

    async fn store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    struct FakeCatalog {
        genres: Vec<Genre>,
        pages: HashMap<u32, Vec<serde_json::Value>>,
        total_pages: u32,
    }

    impl CatalogSource for FakeCatalog {
        async fn genres(&self) -> AppResult<Vec<Genre>> {
            Ok(self.genres.clone())
        }

        async fn discover_page(&self, page: u32) -> AppResult<CatalogPage> {
            match self.pages.get(&page) {
                Some(records) => Ok(CatalogPage {
                    records: records.clone(),
                    total_pages: Some(self.total_pages),
                }),
                None => Err(AppError::Upstream(format!("page {page} unavailable"))),
            }
        }
    }

    #[tokio::test]
    async fn add_then_readd_supersedes() {
        let store = store().await;
        add_film(&store, json!({ "id": 5, "title": "A" })).await.unwrap();
        add_film(&store, json!({ "id": 5, "title": "B" })).await.unwrap();

        let all = query::list_films(&store, 0, 50).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "B");
    }

    #[tokio::test]
    async fn add_requires_id() {
        let store = store().await;
        let err = add_film(&store, json!({ "title": "No key" })).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(store.count_films(sea_orm::Condition::all()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_merges_and_never_creates() {
        let store = store().await;
        add_film(&store, json!({ "id": 5, "title": "Ran", "vote_average": 8.2 })).await.unwrap();

        let updated = update_film(&store, 5, json!({ "vote_average": 7.2 })).await.unwrap();
        assert_eq!(updated.title, "Ran");
        assert_eq!(updated.vote_average, 7.2);

        let err = update_film(&store, 6, json!({ "title": "Ghost" })).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(matches!(query::get_film(&store, 6).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_cannot_rekey() {
        let store = store().await;
        add_film(&store, json!({ "id": 5, "title": "Ran" })).await.unwrap();

        let err = update_film(&store, 5, json!({ "id": 6 })).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(update_film(&store, 5, json!({ "id": 5, "title": "乱" })).await.is_ok());
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = store().await;
        add_film(&store, json!({ "id": 5 })).await.unwrap();

        delete_film(&store, 5).await.unwrap();
        assert!(matches!(query::get_film(&store, 5).await, Err(AppError::NotFound(_))));
        assert!(matches!(delete_film(&store, 5).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn ingestion_is_idempotent_and_survives_failed_pages() {
        let store = store().await;
        let cache = GenreIndexCache::new(3600);
        let catalog = FakeCatalog {
            genres: vec![Genre { id: 28, name: "Action".into() }],
            pages: HashMap::from([
                (1, vec![json!({ "id": 1, "title": "One", "genre_ids": [28] }), json!({ "title": "bad" })]),
                (3, vec![json!({ "id": 3, "title": "Three" }), json!({ "id": 1, "title": "One (v2)" })]),
            ]),
            total_pages: 3,
        };

        assert_eq!(ingest_genres(&catalog, &store, &cache).await.unwrap(), 1);
        let first = ingest_films(&catalog, &store, 10).await;
        let snapshot = query::list_films(&store, 0, 50).await.unwrap();
        let second = ingest_films(&catalog, &store, 10).await;

        assert_eq!(first, second);
        assert_eq!(first.pages_ok, 2);
        assert_eq!(first.pages_failed, vec![2]);
        assert_eq!(first.films_written, 3);
        assert_eq!(first.films_skipped, 1);
        assert_eq!(query::list_films(&store, 0, 50).await.unwrap(), snapshot);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].title, "One (v2)");
    }

    #[tokio::test]
    async fn genre_ingestion_invalidates_cached_names() {
        let store = store().await;
        let cache = GenreIndexCache::new(3600);
        assert_eq!(cache.get(&store).await.unwrap().resolve(18), crate::models::UNKNOWN_GENRE);

        let catalog = FakeCatalog {
            genres: vec![Genre { id: 18, name: "Drame".into() }],
            pages: HashMap::new(),
            total_pages: 0,
        };
        ingest_genres(&catalog, &store, &cache).await.unwrap();

        assert_eq!(cache.get(&store).await.unwrap().resolve(18), "Drame");
    }
}

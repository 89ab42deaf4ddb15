use sea_orm::{
    ActiveModelTrait, Condition, DatabaseConnection, EntityTrait, Order, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait, sea_query::OnConflict,
};
use tracing::debug;

use crate::{
    db,
    entities::{film, genre},
    error::AppResult,
    models::{Film, FilmPatch, Genre},
};

// SQLite binds OFFSET/LIMIT as signed 64-bit integers.
const MAX_WINDOW: u64 = i64::MAX as u64;

/// Predicate, ordering and window for a film query.
#[derive(Clone, Debug)]
pub struct FilmQuery {
    pub condition: Condition,
    pub order: Vec<(film::Column, Order)>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl Default for FilmQuery {
    fn default() -> Self {
        Self { condition: Condition::all(), order: Vec::new(), offset: None, limit: None }
    }
}

impl FilmQuery {
    pub fn filter(condition: Condition) -> Self {
        Self { condition, ..Default::default() }
    }

    pub fn order_by(mut self, column: film::Column, order: Order) -> Self {
        self.order.push((column, order));
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Keyed film and genre collections. Cheap to clone; all clones share one pool.
#[derive(Clone)]
pub struct Store {
    db: DatabaseConnection,
}

impl Store {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> AppResult<Self> {
        Ok(Self::new(db::connect_and_migrate(database_url).await?))
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub async fn close(self) -> AppResult<()> {
        self.db.close().await?;
        Ok(())
    }

    pub async fn get_film(&self, id: i64) -> AppResult<Option<Film>> {
        film::Entity::find_by_id(id).one(&self.db).await?.map(Film::try_from).transpose()
    }

    pub async fn find_films(&self, query: FilmQuery) -> AppResult<Vec<Film>> {
        let mut select = film::Entity::find().filter(query.condition);
        for (column, order) in query.order {
            select = select.order_by(column, order);
        }
        if let Some(offset) = query.offset {
            select = select.offset(offset.min(MAX_WINDOW));
        }
        if let Some(limit) = query.limit {
            select = select.limit(limit.min(MAX_WINDOW));
        }

        select.all(&self.db).await?.into_iter().map(Film::try_from).collect()
    }

    pub async fn find_one_film(&self, query: FilmQuery) -> AppResult<Option<Film>> {
        Ok(self.find_films(query.limit(1)).await?.into_iter().next())
    }

    pub async fn count_films(&self, condition: Condition) -> AppResult<u64> {
        Ok(film::Entity::find().filter(condition).count(&self.db).await?)
    }

    /// Stores `film` under its id, replacing every non-key field of an existing document.
    pub async fn upsert_film(&self, film: &Film) -> AppResult<()> {
        film::Entity::insert(to_active(film)?)
            .on_conflict(
                OnConflict::column(film::Column::Id)
                    .update_columns([
                        film::Column::Title,
                        film::Column::TitleKey,
                        film::Column::GenreIds,
                        film::Column::VoteAverage,
                        film::Column::VoteCount,
                        film::Column::ReleaseDate,
                        film::Column::Extra,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }

    /// Merges `patch` into the stored film. Returns `None` when no film has that id.
    pub async fn merge_film(&self, id: i64, patch: FilmPatch) -> AppResult<Option<Film>> {
        let txn = self.db.begin().await?;

        let Some(model) = film::Entity::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };
        let mut film = Film::try_from(model)?;
        film.apply(patch);
        film.validate()?;

        to_active(&film)?.update(&txn).await?;
        txn.commit().await?;

        debug!(film_id = id, "merged film update");
        Ok(Some(film))
    }

    /// Returns whether a film was actually removed.
    pub async fn delete_film(&self, id: i64) -> AppResult<bool> {
        let res = film::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok(res.rows_affected > 0)
    }

    pub async fn get_genre(&self, id: i64) -> AppResult<Option<Genre>> {
        Ok(genre::Entity::find_by_id(id).one(&self.db).await?.map(Genre::from))
    }

    pub async fn all_genres(&self) -> AppResult<Vec<Genre>> {
        let rows = genre::Entity::find().order_by_asc(genre::Column::Id).all(&self.db).await?;
        Ok(rows.into_iter().map(Genre::from).collect())
    }

    pub async fn upsert_genre(&self, genre: &Genre) -> AppResult<()> {
        let model = genre::ActiveModel { id: Set(genre.id), name: Set(genre.name.clone()) };

        genre::Entity::insert(model)
            .on_conflict(
                OnConflict::column(genre::Column::Id)
                    .update_columns([genre::Column::Name])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        Ok(())
    }
}

fn to_active(film: &Film) -> AppResult<film::ActiveModel> {
    Ok(film::ActiveModel {
        id: Set(film.id),
        title: Set(film.title.clone()),
        title_key: Set(film.title.to_lowercase()),
        genre_ids: Set(serde_json::to_value(&film.genre_ids)?),
        vote_average: Set(film.vote_average),
        vote_count: Set(film.vote_count),
        release_date: Set(film.release_date.clone()),
        extra: Set(serde_json::to_value(&film.extra)?),
    })
}

impl TryFrom<film::Model> for Film {
    type Error = crate::error::AppError;

    fn try_from(m: film::Model) -> AppResult<Self> {
        let genre_ids = match m.genre_ids {
            serde_json::Value::Null => Vec::new(),
            v => serde_json::from_value(v)?,
        };
        let extra = match m.extra {
            serde_json::Value::Null => Default::default(),
            v => serde_json::from_value(v)?,
        };

        Ok(Film {
            id: m.id,
            title: m.title,
            genre_ids,
            vote_average: m.vote_average,
            vote_count: m.vote_count,
            release_date: m.release_date,
            extra,
        })
    }
}

impl From<genre::Model> for Genre {
    fn from(m: genre::Model) -> Self {
        Genre { id: m.id, name: m.name }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn store() -> Store {
        Store::connect("sqlite::memory:").await.unwrap()
    }

    fn film(doc: serde_json::Value) -> Film {
        Film::from_document(doc).unwrap()
    }

    #[tokio::test]
    async fn missing_keys_report_absence() {
        let store = store().await;

        assert_eq!(store.get_film(999).await.unwrap(), None);
        assert!(!store.delete_film(999).await.unwrap());
        assert_eq!(store.merge_film(999, FilmPatch::default()).await.unwrap(), None);
        assert_eq!(store.get_genre(12).await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = store().await;
        let dune = film(json!({
            "id": 438631,
            "title": "Dune",
            "genre_ids": [878, 12],
            "vote_average": 7.8,
            "vote_count": 12000,
            "release_date": "2021-09-15",
            "original_language": "en"
        }));

        store.upsert_film(&dune).await.unwrap();
        let once = store.find_films(FilmQuery::default()).await.unwrap();
        store.upsert_film(&dune).await.unwrap();
        let twice = store.find_films(FilmQuery::default()).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice, vec![dune]);
    }

    #[tokio::test]
    async fn upsert_replaces_whole_document() {
        let store = store().await;
        store
            .upsert_film(&film(json!({ "id": 5, "title": "A", "overview": "old", "vote_count": 3 })))
            .await
            .unwrap();
        store.upsert_film(&film(json!({ "id": 5, "title": "B" }))).await.unwrap();

        let all = store.find_films(FilmQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "B");
        assert_eq!(all[0].vote_count, 0);
        assert!(all[0].extra.is_empty());
    }

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = store().await;
        store
            .upsert_film(&film(json!({ "id": 5, "title": "Heat", "vote_average": 8.0, "tagline": "x" })))
            .await
            .unwrap();

        let patch = FilmPatch { vote_average: Some(7.2), ..Default::default() };
        let merged = store.merge_film(5, patch).await.unwrap().unwrap();
        let stored = store.get_film(5).await.unwrap().unwrap();

        assert_eq!(merged, stored);
        assert_eq!(stored.title, "Heat");
        assert_eq!(stored.vote_average, 7.2);
        assert_eq!(stored.extra.len(), 1);
    }

    #[tokio::test]
    async fn genres_upsert_by_id() {
        let store = store().await;
        store.upsert_genre(&Genre { id: 28, name: "Action".into() }).await.unwrap();
        store.upsert_genre(&Genre { id: 28, name: "Aktion".into() }).await.unwrap();
        store.upsert_genre(&Genre { id: 12, name: "Aventure".into() }).await.unwrap();

        let genres = store.all_genres().await.unwrap();
        assert_eq!(
            genres,
            vec![Genre { id: 12, name: "Aventure".into() }, Genre { id: 28, name: "Aktion".into() }]
        );
    }
}

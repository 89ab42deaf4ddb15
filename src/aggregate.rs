use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, FromQueryResult, Order, QueryFilter,
    QuerySelect, Statement, Value,
    sea_query::{Expr, Func, SimpleExpr},
};
use tracing::debug;

use crate::{
    entities::film,
    error::{AppError, AppResult},
    genre_index::GenreIndexCache,
    models::{AverageRating, Film, GenreCount},
    query::{has_genre, is_rated},
    store::{FilmQuery, Store},
};

pub const TOP_FILMS_LIMIT: u64 = 10;
pub const TOP_FILMS_MIN_VOTES: i64 = 500;
pub const TOP_BY_GENRE_LIMIT: u64 = 5;
pub const TOP_BY_GENRE_MIN_VOTES: i64 = 25;

const GENRE_TALLY_SQL: &str = r#"
SELECT CAST(j.value AS INTEGER) AS genre_id, COUNT(*) AS film_count
FROM "film" AS f, json_each(f."genre_ids") AS j
GROUP BY genre_id
ORDER BY film_count DESC, genre_id ASC
LIMIT ?
"#;

#[derive(Debug, FromQueryResult)]
struct GenreTally {
    genre_id: i64,
    film_count: i64,
}

/// Occurrences of every genre id across all films, most frequent first.
pub async fn genre_distribution(
    store: &Store,
    genres: &GenreIndexCache,
) -> AppResult<Vec<GenreCount>> {
    tally_genres(store, genres, None).await
}

pub async fn top_genres(
    store: &Store,
    genres: &GenreIndexCache,
    n: u64,
) -> AppResult<Vec<GenreCount>> {
    if n == 0 {
        return Ok(Vec::new());
    }
    tally_genres(store, genres, Some(n)).await
}

async fn tally_genres(
    store: &Store,
    genres: &GenreIndexCache,
    limit: Option<u64>,
) -> AppResult<Vec<GenreCount>> {
    let db = store.db();
    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.map(|n| i64::try_from(n).unwrap_or(i64::MAX)).unwrap_or(-1);
    let stmt = Statement::from_sql_and_values(
        db.get_database_backend(),
        GENRE_TALLY_SQL,
        [Value::from(limit)],
    );
    let tallies = GenreTally::find_by_statement(stmt).all(db).await?;

    let index = genres.get(store).await?;
    let out: Vec<GenreCount> = tallies
        .into_iter()
        .map(|t| GenreCount {
            genre_id: t.genre_id,
            name: index.resolve(t.genre_id).to_string(),
            count: t.film_count,
        })
        .collect();

    debug!(groups = out.len(), "tallied genres");
    Ok(out)
}

/// Best rated films with at least [`TOP_FILMS_MIN_VOTES`] votes.
pub async fn top_films(store: &Store) -> AppResult<Vec<Film>> {
    let cond = Condition::all()
        .add(is_rated())
        .add(film::Column::VoteCount.gte(TOP_FILMS_MIN_VOTES));
    store.find_films(ranked(cond, TOP_FILMS_LIMIT)).await
}

/// Best rated films of one genre with at least [`TOP_BY_GENRE_MIN_VOTES`] votes.
pub async fn top_films_by_genre(store: &Store, genre_id: i64) -> AppResult<Vec<Film>> {
    let cond = Condition::all()
        .add(is_rated())
        .add(film::Column::VoteCount.gte(TOP_BY_GENRE_MIN_VOTES))
        .add(has_genre(genre_id));
    store.find_films(ranked(cond, TOP_BY_GENRE_LIMIT)).await
}

fn ranked(cond: Condition, limit: u64) -> FilmQuery {
    FilmQuery::filter(cond)
        .order_by(film::Column::VoteAverage, Order::Desc)
        .order_by(film::Column::VoteCount, Order::Desc)
        .order_by(film::Column::Id, Order::Asc)
        .limit(limit)
}

/// Mean `vote_average` over rated films, rounded to two decimals.
pub async fn average_rating(store: &Store) -> AppResult<AverageRating> {
    let row: Option<(Option<f64>, i64)> = film::Entity::find()
        .select_only()
        .column_as(SimpleExpr::from(Func::avg(Expr::col(film::Column::VoteAverage))), "average")
        .column_as(SimpleExpr::from(Func::count(Expr::col(film::Column::Id))), "rated")
        .filter(is_rated())
        .into_tuple::<(Option<f64>, i64)>()
        .one(store.db())
        .await?;

    match row {
        Some((Some(average), rated)) if rated > 0 => Ok(AverageRating {
            average_rating: round2(average),
            rated_films: rated,
        }),
        _ => Err(AppError::not_found("no rated films to average")),
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

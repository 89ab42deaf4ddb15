use sea_orm::{
    ColumnTrait, Condition, Order,
    sea_query::{Expr, SimpleExpr},
};
use tracing::debug;

use crate::{
    entities::film,
    error::{AppError, AppResult},
    models::{Film, Genre, SearchFilter},
    store::{FilmQuery, Store},
};

/// Matches films whose `genre_ids` contain `genre_id` at least once.
pub fn has_genre(genre_id: i64) -> SimpleExpr {
    Expr::cust_with_values(
        r#"EXISTS (SELECT 1 FROM json_each("film"."genre_ids") WHERE json_each.value = ?)"#,
        [genre_id],
    )
}

/// Excludes the `vote_average == 0` "no votes yet" sentinel.
pub fn is_rated() -> SimpleExpr {
    film::Column::VoteAverage.ne(0.0)
}

pub fn search_condition(filter: &SearchFilter) -> AppResult<Condition> {
    filter.validate()?;

    let mut cond = Condition::all();
    if let Some(needle) = filter.title_needle() {
        cond = cond.add(Expr::cust_with_values(r#"instr("film"."title_key", ?) > 0"#, [needle]));
    }
    if let Some(genre_id) = filter.genre_id {
        cond = cond.add(has_genre(genre_id));
    }
    if let Some(min) = filter.min_rating {
        cond = cond.add(film::Column::VoteAverage.gte(min));
    }
    if let Some(max) = filter.max_rating {
        cond = cond.add(film::Column::VoteAverage.lte(max));
    }
    Ok(cond)
}

pub async fn list_films(store: &Store, skip: u64, limit: u64) -> AppResult<Vec<Film>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let query =
        FilmQuery::default().order_by(film::Column::Id, Order::Asc).offset(skip).limit(limit);
    store.find_films(query).await
}

pub async fn get_film(store: &Store, id: i64) -> AppResult<Film> {
    store.get_film(id).await?.ok_or_else(|| AppError::not_found(format!("film {id} not found")))
}

pub async fn search_films(store: &Store, filter: &SearchFilter) -> AppResult<Vec<Film>> {
    let query = FilmQuery::filter(search_condition(filter)?).order_by(film::Column::Id, Order::Asc);
    let films = store.find_films(query).await?;
    debug!(matches = films.len(), ?filter, "searched films");
    Ok(films)
}

/// Every film tagged with `genre_id`, best rated first; unrated films are kept.
pub async fn films_by_genre(store: &Store, genre_id: i64) -> AppResult<Vec<Film>> {
    let query = FilmQuery::filter(Condition::all().add(has_genre(genre_id)))
        .order_by(film::Column::VoteAverage, Order::Desc)
        .order_by(film::Column::VoteCount, Order::Desc)
        .order_by(film::Column::Id, Order::Asc);
    store.find_films(query).await
}

pub async fn oldest_film(store: &Store) -> AppResult<Film> {
    by_release_date(store, Order::Asc).await
}

pub async fn newest_film(store: &Store) -> AppResult<Film> {
    by_release_date(store, Order::Desc).await
}

async fn by_release_date(store: &Store, order: Order) -> AppResult<Film> {
    let dated = Condition::all()
        .add(film::Column::ReleaseDate.is_not_null())
        .add(film::Column::ReleaseDate.ne(""));
    let query = FilmQuery::filter(dated)
        .order_by(film::Column::ReleaseDate, order)
        .order_by(film::Column::Id, Order::Asc);

    store
        .find_one_film(query)
        .await?
        .ok_or_else(|| AppError::not_found("no dated films in the catalog"))
}

pub async fn count_films(store: &Store, filter: &SearchFilter) -> AppResult<u64> {
    store.count_films(search_condition(filter)?).await
}

pub async fn list_genres(store: &Store) -> AppResult<Vec<Genre>> {
    store.all_genres().await
}

pub async fn get_genre(store: &Store, id: i64) -> AppResult<Genre> {
    store.get_genre(id).await?.ok_or_else(|| AppError::not_found(format!("genre {id} not found")))
}

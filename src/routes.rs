use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    AppState, aggregate,
    error::AppResult,
    models::{AverageRating, Film, Genre, GenreCount, SearchFilter},
    query, sync,
};

const DEFAULT_TOP_GENRES: u64 = 5;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/films", get(list_films).post(add_film))
        .route("/films/search", get(search_films))
        .route("/films/count", get(count_films))
        .route("/films/oldest", get(oldest_film))
        .route("/films/newest", get(newest_film))
        .route("/films/top", get(top_films))
        .route("/films/top-by-genre", post(top_films_by_genre))
        .route("/films/by-genre", post(films_by_genre))
        .route("/films/average-rating", get(average_rating))
        .route("/films/genres/stats", get(genre_stats))
        .route("/films/genres/top5", get(top_five_genres))
        .route("/films/genres/top", get(top_genres))
        .route("/films/{id}", get(get_film).put(update_film).delete(delete_film))
        .route("/genres", get(list_genres))
        .route("/genres/{id}", get(get_genre))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    skip: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct GenreRequest {
    genre_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TopGenresParams {
    n: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct FilmTotal {
    total_films: u64,
}

async fn list_films(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Vec<Film>>> {
    let skip = params.skip.unwrap_or(0);
    let limit = params.limit.unwrap_or(state.config.default_list_limit);
    Ok(Json(query::list_films(&state.store, skip, limit).await?))
}

async fn add_film(
    State(state): State<Arc<AppState>>,
    Json(doc): Json<serde_json::Value>,
) -> AppResult<(StatusCode, Json<Film>)> {
    let film = sync::add_film(&state.store, doc).await?;
    Ok((StatusCode::CREATED, Json(film)))
}

async fn get_film(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Film>> {
    Ok(Json(query::get_film(&state.store, id).await?))
}

async fn update_film(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(doc): Json<serde_json::Value>,
) -> AppResult<Json<Film>> {
    Ok(Json(sync::update_film(&state.store, id, doc).await?))
}

async fn delete_film(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    sync::delete_film(&state.store, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_films(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SearchFilter>,
) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(query::search_films(&state.store, &filter).await?))
}

async fn count_films(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<SearchFilter>,
) -> AppResult<Json<FilmTotal>> {
    let total_films = query::count_films(&state.store, &filter).await?;
    Ok(Json(FilmTotal { total_films }))
}

async fn oldest_film(State(state): State<Arc<AppState>>) -> AppResult<Json<Film>> {
    Ok(Json(query::oldest_film(&state.store).await?))
}

async fn newest_film(State(state): State<Arc<AppState>>) -> AppResult<Json<Film>> {
    Ok(Json(query::newest_film(&state.store).await?))
}

async fn top_films(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(aggregate::top_films(&state.store).await?))
}

async fn top_films_by_genre(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenreRequest>,
) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(aggregate::top_films_by_genre(&state.store, req.genre_id).await?))
}

async fn films_by_genre(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenreRequest>,
) -> AppResult<Json<Vec<Film>>> {
    Ok(Json(query::films_by_genre(&state.store, req.genre_id).await?))
}

async fn average_rating(State(state): State<Arc<AppState>>) -> AppResult<Json<AverageRating>> {
    Ok(Json(aggregate::average_rating(&state.store).await?))
}

async fn genre_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<GenreCount>>> {
    Ok(Json(aggregate::genre_distribution(&state.store, &state.genres).await?))
}

async fn top_five_genres(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<GenreCount>>> {
    Ok(Json(aggregate::top_genres(&state.store, &state.genres, DEFAULT_TOP_GENRES).await?))
}

async fn top_genres(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopGenresParams>,
) -> AppResult<Json<Vec<GenreCount>>> {
    let n = params.n.unwrap_or(DEFAULT_TOP_GENRES);
    Ok(Json(aggregate::top_genres(&state.store, &state.genres, n).await?))
}

async fn list_genres(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Genre>>> {
    Ok(Json(query::list_genres(&state.store).await?))
}

async fn get_genre(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<Genre>> {
    Ok(Json(query::get_genre(&state.store, id).await?))
}

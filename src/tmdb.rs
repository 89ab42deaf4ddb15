use std::{num::NonZeroU32, sync::Arc};

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use serde::Deserialize;
use tracing::debug;
use wreq::header::USER_AGENT;

use crate::{
    error::{AppError, AppResult},
    models::Genre,
};

/// One page of raw film records from the external catalog.
#[derive(Debug, Default)]
pub struct CatalogPage {
    pub records: Vec<serde_json::Value>,
    pub total_pages: Option<u32>,
}

/// Where ingestion pulls genres and film pages from.
#[allow(async_fn_in_trait)]
pub trait CatalogSource {
    async fn genres(&self) -> AppResult<Vec<Genre>>;

    async fn discover_page(&self, page: u32) -> AppResult<CatalogPage>;
}

pub struct TmdbClient {
    client: wreq::Client,
    access_token: String,
    base_url: String,
    language: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(
        client: wreq::Client,
        access_token: String,
        base_url: String,
        language: String,
        rps: u32,
    ) -> Self {
        if access_token.trim().is_empty() {
            tracing::warn!("no TMDB_ACCESS_TOKEN provided, catalog requests will fail");
        }

        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN),
        )));
        Self { client, access_token, base_url, language, limiter }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> AppResult<T> {
        if self.access_token.trim().is_empty() {
            return Err(AppError::Upstream("TMDB access token is not configured".to_string()));
        }

        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(url = %url, "catalog request");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header(USER_AGENT, "filmdex/0.1")
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?;
        Ok(resp)
    }
}

impl CatalogSource for TmdbClient {
    async fn genres(&self) -> AppResult<Vec<Genre>> {
        let resp: GenreListResponse =
            self.get("genre/movie/list", &[("language", self.language.clone())]).await?;
        Ok(resp.genres)
    }

    async fn discover_page(&self, page: u32) -> AppResult<CatalogPage> {
        let resp: DiscoverResponse = self
            .get(
                "discover/movie",
                &[
                    ("language", self.language.clone()),
                    ("page", page.to_string()),
                    ("sort_by", "popularity.desc".to_string()),
                ],
            )
            .await?;
        Ok(CatalogPage { records: resp.results, total_pages: resp.total_pages })
    }
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    #[serde(default)]
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
struct DiscoverResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    total_pages: Option<u32>,
}

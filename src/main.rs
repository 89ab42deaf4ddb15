use std::{sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand};
use filmdex::{AppState, config::Config, routes, store::Store, sync, tmdb::TmdbClient};

#[derive(Parser)]
#[command(name = "filmdex")]
#[command(about = "Film catalog with search, statistics and TMDB ingestion", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the JSON API (default)
    Serve,

    /// Pull genres and popular films from TMDB into the store
    Ingest {
        /// Number of discover pages to fetch (defaults to INGEST_PAGES)
        #[arg(long)]
        pages: Option<u32>,

        /// Leave the genre collection untouched
        #[arg(long)]
        skip_genres: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,filmdex=debug,sqlx=warn".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env()?);

    let store = Store::connect(&config.database_url)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    let state = Arc::new(AppState::new(config.clone(), store.clone()));

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(state).await,
        Command::Ingest { pages, skip_genres } => ingest(state, pages, skip_genres).await,
    };

    store.close().await.context("closing store")?;
    result
}

async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = state.config.addr;
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("server stopped");

    Ok(())
}

async fn ingest(state: Arc<AppState>, pages: Option<u32>, skip_genres: bool) -> anyhow::Result<()> {
    let config = &state.config;
    let http = wreq::Client::builder().timeout(Duration::from_secs(30)).build()?;
    let tmdb = TmdbClient::new(
        http,
        config.tmdb_access_token.clone(),
        config.tmdb_base_url.clone(),
        config.tmdb_language.clone(),
        config.tmdb_rps,
    );

    if !skip_genres {
        sync::ingest_genres(&tmdb, &state.store, &state.genres).await.context("ingesting genres")?;
    }

    let report =
        sync::ingest_films(&tmdb, &state.store, pages.unwrap_or(config.ingest_pages)).await;
    tracing::info!(
        pages_ok = report.pages_ok,
        pages_failed = ?report.pages_failed,
        films_written = report.films_written,
        films_skipped = report.films_skipped,
        "ingestion finished"
    );

    if report.pages_ok == 0 && !report.pages_failed.is_empty() {
        anyhow::bail!("every catalog page failed");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

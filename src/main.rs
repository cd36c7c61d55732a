mod catalog;
mod config;
mod db;
mod entities;
mod error;
mod genres;
mod models;
mod routes;
mod store;
#[cfg(test)]
mod testing;
mod tmdb;

use std::{sync::Arc, time::Duration};

use crate::{
    catalog::Catalog, config::Config, genres::GenreCache, store::MovieStore, tmdb::TmdbClient,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Catalog,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,movieshelf=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let http = reqwest::Client::builder()
        .user_agent("movieshelf/0.1")
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store = MovieStore::new(db);

    let tmdb: Arc<dyn tmdb::MovieProvider> = Arc::new(TmdbClient::new(
        http,
        config.tmdb_access_token.clone(),
        config.tmdb_base_url.clone(),
        config.tmdb_language.clone(),
        config.tmdb_rps,
    ));
    let genres = Arc::new(GenreCache::new(tmdb.clone()));
    let catalog = Catalog::new(store, tmdb, genres);

    let state = Arc::new(AppState { config: config.clone(), catalog });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}

use std::net::SocketAddr;

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub tmdb_access_token: String,
    pub tmdb_base_url: String,
    pub tmdb_language: String,
    pub tmdb_rps: u32,
    pub image_base_url: String,
    pub database_url: String,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");
        let port: u16 = var("PORT", "3000").parse().context("PORT")?;

        let tmdb_access_token = var("TMDB_ACCESS_TOKEN", "");
        let tmdb_base_url = var("TMDB_BASE_URL", "https://api.themoviedb.org/3");
        let tmdb_language = var("TMDB_LANGUAGE", "fr-FR");
        let image_base_url = var("TMDB_IMAGE_BASE_URL", "https://image.tmdb.org/t/p/w500");

        let database_url = var("DATABASE_URL", "sqlite://movies.db?mode=rwc");

        let tmdb_rps: u32 = lookup("TMDB_RPS").and_then(|s| s.parse().ok()).unwrap_or(4);

        let http_timeout_secs: u64 =
            lookup("HTTP_TIMEOUT_SECS").and_then(|s| s.parse().ok()).unwrap_or(30);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            tmdb_access_token,
            tmdb_base_url,
            tmdb_language,
            tmdb_rps,
            image_base_url,
            database_url,
            http_timeout_secs,
        })
    }
}

use std::{num::NonZeroU32, sync::Arc};

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use jiff::civil::Date;
use reqwest::{StatusCode, header::ACCEPT};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::models::{Genre, MovieFilters, MovieRecord};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("TMDB rejected the access token")]
    Unauthorized,

    #[error("not found at TMDB")]
    NotFound,

    #[error("TMDB returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("TMDB request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("undecodable TMDB response: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Read-only access to the movie metadata provider.
#[async_trait]
pub trait MovieProvider: Send + Sync {
    async fn search_by_text(
        &self,
        text: &str,
        page: u32,
        filters: &MovieFilters,
    ) -> ProviderResult<Page>;

    async fn discover(&self, filters: &MovieFilters, page: u32) -> ProviderResult<Page>;

    async fn get_by_id(&self, id: i64) -> ProviderResult<TmdbMovie>;

    async fn list_genres(&self) -> ProviderResult<Vec<Genre>>;

    async fn popular(&self, page: u32) -> ProviderResult<Page>;
}

pub struct TmdbClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
    language: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl TmdbClient {
    pub fn new(
        client: reqwest::Client,
        access_token: String,
        base_url: String,
        language: String,
        rps: u32,
    ) -> Self {
        if access_token.trim().is_empty() {
            tracing::warn!("no TMDB_ACCESS_TOKEN provided, provider calls will be rejected");
        }

        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN),
        )));
        Self { client, access_token, base_url, language, limiter }
    }

    async fn fetch(&self, path: &str, params: &[(&str, String)]) -> ProviderResult<String> {
        self.limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        debug!(path = %path, "calling TMDB");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .header(ACCEPT, "application/json")
            .query(&[("language", self.language.as_str())])
            .query(params)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED => ProviderError::Unauthorized,
                StatusCode::NOT_FOUND => ProviderError::NotFound,
                _ => ProviderError::Upstream {
                    status: status.as_u16(),
                    message: status_message(&body),
                },
            });
        }

        Ok(resp.text().await?)
    }
}

#[async_trait]
impl MovieProvider for TmdbClient {
    async fn search_by_text(
        &self,
        text: &str,
        page: u32,
        filters: &MovieFilters,
    ) -> ProviderResult<Page> {
        let mut params = vec![("query", text.to_string()), ("page", page.to_string())];
        params.extend(filter_params(filters, Endpoint::Search));
        decode_page(&self.fetch("search/movie", &params).await?)
    }

    async fn discover(&self, filters: &MovieFilters, page: u32) -> ProviderResult<Page> {
        let mut params = vec![("page", page.to_string())];
        params.extend(filter_params(filters, Endpoint::Discover));
        decode_page(&self.fetch("discover/movie", &params).await?)
    }

    async fn get_by_id(&self, id: i64) -> ProviderResult<TmdbMovie> {
        let body = self.fetch(&format!("movie/{id}"), &[]).await?;
        decode_movie(serde_json::from_str(&body)?)
    }

    async fn list_genres(&self) -> ProviderResult<Vec<Genre>> {
        let body = self.fetch("genre/movie/list", &[]).await?;
        let resp: GenreListResponse = serde_json::from_str(&body)?;
        Ok(resp.genres)
    }

    async fn popular(&self, page: u32) -> ProviderResult<Page> {
        decode_page(&self.fetch("movie/popular", &[("page", page.to_string())]).await?)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Endpoint {
    Search,
    Discover,
}

/// The one place where local filter names become TMDB query parameters.
fn filter_params(filters: &MovieFilters, endpoint: Endpoint) -> Vec<(&'static str, String)> {
    let mut params = vec![("include_adult", "false".to_string())];

    if !filters.genres.is_empty() {
        let joined = filters.genres.iter().map(|g| g.to_string()).collect::<Vec<_>>().join(",");
        params.push(("with_genres", joined));
    }
    if let Some(year) = filters.year {
        params.push(("primary_release_year", year.to_string()));
    }
    if let Some(country) = &filters.country {
        let key = match endpoint {
            Endpoint::Search => "region",
            Endpoint::Discover => "with_origin_country",
        };
        params.push((key, country.clone()));
    }
    if endpoint == Endpoint::Discover {
        let sort = filters.sort_by.map(|s| s.as_tmdb_param()).unwrap_or("popularity.desc");
        params.push(("sort_by", sort.to_string()));
    }

    params
}

/// One page of provider results. Records that failed to decode are already dropped.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub results: Vec<TmdbMovie>,
}

fn decode_page(body: &str) -> ProviderResult<Page> {
    let raw: RawPage = serde_json::from_str(body)?;

    let results = raw
        .results
        .into_iter()
        .filter_map(|value| match decode_movie(value) {
            Ok(movie) => Some(movie),
            Err(err) => {
                debug!(error = %err, "skipping malformed TMDB record");
                None
            },
        })
        .collect();

    Ok(Page { page: raw.page, total_pages: raw.total_pages, total_results: raw.total_results, results })
}

fn decode_movie(value: serde_json::Value) -> ProviderResult<TmdbMovie> {
    let movie: TmdbMovie = serde_json::from_value(value)?;
    if movie.id <= 0 {
        return Err(ProviderError::Decode(format!("invalid movie id {}", movie.id)));
    }
    if movie.title.trim().is_empty() {
        return Err(ProviderError::Decode(format!("movie {} has no title", movie.id)));
    }
    Ok(movie)
}

fn status_message(body: &str) -> String {
    serde_json::from_str::<StatusBody>(body).map(|s| s.status_message).unwrap_or_else(|_| body.to_string())
}

/// A movie as TMDB sends it, from list endpoints or the detail endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct TmdbMovie {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    #[serde(default, deserialize_with = "release_date")]
    pub release_date: Option<Date>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i32>,
    pub popularity: Option<f64>,
    pub revenue: Option<f64>,
    pub budget: Option<f64>,
    genre_ids: Option<Vec<GenreRef>>,
    genres: Option<Vec<GenreRef>>,
    origin_country: Option<Vec<CountryRef>>,
    production_countries: Option<Vec<CountryRef>>,
    pub original_language: Option<String>,
    pub runtime: Option<i32>,
}

impl TmdbMovie {
    /// List endpoints send `genre_ids`, the detail endpoint sends `genres`.
    pub fn genre_ids(&self) -> Option<Vec<i32>> {
        self.genre_ids
            .as_ref()
            .or(self.genres.as_ref())
            .map(|refs| refs.iter().map(GenreRef::id).collect())
    }

    pub fn country_codes(&self) -> Option<Vec<String>> {
        self.production_countries
            .as_ref()
            .or(self.origin_country.as_ref())
            .map(|refs| refs.iter().map(|c| c.code().to_string()).collect())
    }

    pub fn into_record(self) -> MovieRecord {
        let genre_ids = self.genre_ids();
        let production_countries = self.country_codes();
        MovieRecord {
            external_id: self.id,
            title: self.title.trim().to_string(),
            overview: non_empty(self.overview),
            poster_path: non_empty(self.poster_path),
            backdrop_path: non_empty(self.backdrop_path),
            release_date: self.release_date,
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            popularity: self.popularity,
            revenue: self.revenue,
            budget: self.budget,
            genre_ids,
            production_countries,
            original_language: non_empty(self.original_language),
            runtime: self.runtime,
        }
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.trim().is_empty())
}

/// Absent, null and empty dates are all "unknown"; anything else must parse.
fn release_date<'de, D>(deserializer: D) -> Result<Option<Date>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<Date>().map(Some).map_err(serde::de::Error::custom),
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum GenreRef {
    Id(i32),
    Named { id: i32 },
}

impl GenreRef {
    fn id(&self) -> i32 {
        match self {
            GenreRef::Id(id) | GenreRef::Named { id } => *id,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum CountryRef {
    Code(String),
    Named { iso_3166_1: String },
}

impl CountryRef {
    fn code(&self) -> &str {
        match self {
            CountryRef::Code(code) | CountryRef::Named { iso_3166_1: code } => code,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    total_results: u32,
    results: Vec<serde_json::Value>,
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    genres: Vec<Genre>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status_message: String,
}

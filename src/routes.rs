use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{
    AppState,
    catalog::Catalog,
    error::{AppError, AppResult},
    models::{Genre, MovieDetail, MovieFilters, MovieSummary, NewMovieRequest, PopularPage, SortBy},
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/search", get(search_movies))
        .route("/movies/popular", get(popular_movies))
        .route("/movies/{id}", get(movie_detail))
        .route("/genres", get(list_genres))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    query: Option<String>,
    genre: Option<String>,
    year: Option<String>,
    #[serde(alias = "region")]
    country: Option<String>,
    sort_by: Option<String>,
    page: Option<String>,
}

impl SearchParams {
    fn has_input(&self) -> bool {
        [&self.query, &self.genre, &self.year, &self.country, &self.sort_by]
            .into_iter()
            .any(|v| non_blank(v.as_deref()).is_some())
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    page: Option<String>,
}

pub async fn list_movies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<MovieSummary>>> {
    search(&state.catalog, params).await
}

pub async fn search_movies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> AppResult<Json<Vec<MovieSummary>>> {
    if !params.has_input() {
        return Err(AppError::validation("query or filters are required"));
    }
    search(&state.catalog, params).await
}

async fn search(catalog: &Catalog, params: SearchParams) -> AppResult<Json<Vec<MovieSummary>>> {
    let query = non_blank(params.query.as_deref()).map(str::to_string);
    let page = parse_page(params.page.as_deref())?;

    let filters = match parse_filters(catalog, &params).await {
        Ok(filters) => filters,
        Err(err) if err.is_degradable() => {
            warn!(error = %err, "could not resolve genre filter, returning no results");
            return Ok(Json(Vec::new()));
        },
        Err(err) => return Err(err),
    };

    let movies = catalog.search(query.as_deref(), &filters, page).await?;
    Ok(Json(movies.iter().map(MovieSummary::from).collect()))
}

async fn parse_filters(catalog: &Catalog, params: &SearchParams) -> AppResult<MovieFilters> {
    let year = non_blank(params.year.as_deref()).map(parse_year).transpose()?;
    let country = non_blank(params.country.as_deref()).map(parse_country).transpose()?;
    let sort_by = non_blank(params.sort_by.as_deref())
        .map(|raw| {
            SortBy::from_param(raw)
                .ok_or_else(|| AppError::validation(format!("unknown sortBy '{raw}'")))
        })
        .transpose()?;

    let genres = match non_blank(params.genre.as_deref()) {
        Some(raw) => catalog.resolve_genres(raw).await?,
        None => Vec::new(),
    };

    Ok(MovieFilters { genres, year, country, sort_by })
}

pub async fn movie_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<MovieDetail>> {
    let movie = state.catalog.movie(id).await?;
    let genre_names = state.catalog.genre_names(&movie.genre_ids.0).await;
    Ok(Json(MovieDetail::new(movie, genre_names, &state.config.image_base_url)))
}

pub async fn popular_movies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<PopularPage>> {
    let page = parse_page(params.page.as_deref())?;
    Ok(Json(state.catalog.popular(page).await))
}

pub async fn list_genres(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Genre>>> {
    Ok(Json(state.catalog.genres().all().await?))
}

pub async fn create_movie(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewMovieRequest>,
) -> AppResult<(StatusCode, Json<MovieDetail>)> {
    let movie = state.catalog.create(req).await?;
    let genre_names = state.catalog.genre_names(&movie.genre_ids.0).await;
    Ok((StatusCode::CREATED, Json(MovieDetail::new(movie, genre_names, &state.config.image_base_url))))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_year(raw: &str) -> AppResult<i16> {
    if raw.len() != 4 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("year must be a 4-digit year"));
    }
    raw.parse().map_err(|_| AppError::validation("year must be a 4-digit year"))
}

fn parse_country(raw: &str) -> AppResult<String> {
    let country = raw.to_uppercase();
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::validation("country must be a 2-letter code"));
    }
    Ok(country)
}

fn parse_page(raw: Option<&str>) -> AppResult<u32> {
    match non_blank(raw) {
        None => Ok(1),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|p| *p >= 1)
            .ok_or_else(|| AppError::validation("page must be a positive integer")),
    }
}

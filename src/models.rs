use jiff::civil::Date;
use serde::{Deserialize, Serialize};

use crate::entities::movie;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum SortBy {
    VoteAverage,
    Title,
    Popularity,
    ReleaseDate,
    Revenue,
    VoteCount,
}

impl SortBy {
    /// Accepts the camelCase keys used by the front-end and the provider's snake_case names.
    pub fn from_param(raw: &str) -> Option<Self> {
        match raw.trim() {
            "voteAverage" | "vote_average" => Some(SortBy::VoteAverage),
            "title" => Some(SortBy::Title),
            "popularity" => Some(SortBy::Popularity),
            "releaseDate" | "release_date" => Some(SortBy::ReleaseDate),
            "revenue" => Some(SortBy::Revenue),
            "voteCount" | "vote_count" => Some(SortBy::VoteCount),
            _ => None,
        }
    }

    pub fn as_tmdb_param(self) -> &'static str {
        match self {
            SortBy::VoteAverage => "vote_average.desc",
            SortBy::Title => "title.asc",
            SortBy::Popularity => "popularity.desc",
            SortBy::ReleaseDate => "primary_release_date.desc",
            SortBy::Revenue => "revenue.desc",
            SortBy::VoteCount => "vote_count.desc",
        }
    }

    pub fn is_ascending(self) -> bool {
        matches!(self, SortBy::Title)
    }
}

/// Conjunctive movie filters. Empty fields impose no constraint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MovieFilters {
    pub genres: Vec<i32>,
    pub year: Option<i16>,
    pub country: Option<String>,
    pub sort_by: Option<SortBy>,
}

/// A provider movie mapped into the store's shape.
///
/// `None` means the provider did not send the field, so an existing stored value is kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MovieRecord {
    pub external_id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub release_date: Option<Date>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i32>,
    pub popularity: Option<f64>,
    pub revenue: Option<f64>,
    pub budget: Option<f64>,
    pub genre_ids: Option<Vec<i32>>,
    pub production_countries: Option<Vec<String>>,
    pub original_language: Option<String>,
    pub runtime: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
    pub release_date: Option<String>,
    pub genres: Vec<i32>,
}

impl From<&movie::Model> for MovieSummary {
    fn from(m: &movie::Model) -> Self {
        Self {
            id: m.external_id,
            title: m.title.clone(),
            overview: m.overview.clone(),
            poster_path: m.poster_path.clone(),
            vote_average: m.vote_average,
            release_date: m.release_date.clone(),
            genres: m.genre_ids.0.clone(),
        }
    }
}

impl From<&MovieRecord> for MovieSummary {
    fn from(r: &MovieRecord) -> Self {
        Self {
            id: r.external_id,
            title: r.title.clone(),
            overview: r.overview.clone(),
            poster_path: r.poster_path.clone(),
            vote_average: r.vote_average,
            release_date: r.release_date.map(|d| d.to_string()),
            genres: r.genre_ids.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetail {
    pub id: i64,
    pub title: String,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_path: Option<String>,
    pub backdrop_url: Option<String>,
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i32>,
    pub popularity: Option<f64>,
    pub revenue: Option<f64>,
    pub budget: Option<f64>,
    pub genres: Vec<i32>,
    pub genre_names: Vec<String>,
    pub production_countries: Vec<String>,
    pub original_language: Option<String>,
    pub runtime: Option<i32>,
}

impl MovieDetail {
    pub fn new(m: movie::Model, genre_names: Vec<String>, image_base_url: &str) -> Self {
        let image_url = |path: &Option<String>| {
            path.as_deref().map(|p| format!("{}/{}", image_base_url.trim_end_matches('/'), p.trim_start_matches('/')))
        };
        Self {
            id: m.external_id,
            poster_url: image_url(&m.poster_path),
            backdrop_url: image_url(&m.backdrop_path),
            title: m.title,
            overview: m.overview,
            poster_path: m.poster_path,
            backdrop_path: m.backdrop_path,
            release_date: m.release_date,
            vote_average: m.vote_average,
            vote_count: m.vote_count,
            popularity: m.popularity,
            revenue: m.revenue,
            budget: m.budget,
            genres: m.genre_ids.0,
            genre_names,
            production_countries: m.production_countries.0,
            original_language: m.original_language,
            runtime: m.runtime,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopularPage {
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u32,
    pub results: Vec<MovieSummary>,
}

impl PopularPage {
    pub fn empty(page: u32) -> Self {
        Self { page, total_pages: 0, total_results: 0, results: Vec::new() }
    }
}

/// Body of a manual create. Mirrors the summary shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMovieRequest {
    pub id: Option<i64>,
    pub title: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<i32>,
}

use std::{future::Future, sync::Arc};

use jiff::civil::Date;
use tracing::{debug, warn};

use crate::{
    entities::movie,
    error::{AppError, AppResult},
    genres::GenreCache,
    models::{MovieFilters, MovieRecord, MovieSummary, NewMovieRequest, PopularPage},
    store::MovieStore,
    tmdb::{MovieProvider, Page, ProviderResult, TmdbMovie},
};

/// Store-first movie lookups with provider fallback and write-back.
#[derive(Clone)]
pub struct Catalog {
    store: MovieStore,
    provider: Arc<dyn MovieProvider>,
    genres: Arc<GenreCache>,
}

impl Catalog {
    pub fn new(store: MovieStore, provider: Arc<dyn MovieProvider>, genres: Arc<GenreCache>) -> Self {
        Self { store, provider, genres }
    }

    pub fn genres(&self) -> &GenreCache {
        &self.genres
    }

    /// Like [`Catalog::try_search`], but provider and database failures come back as an
    /// empty list.
    pub async fn search(
        &self,
        query: Option<&str>,
        filters: &MovieFilters,
        page: u32,
    ) -> AppResult<Vec<movie::Model>> {
        match self.try_search(query, filters, page).await {
            Err(err) if err.is_degradable() => {
                warn!(query = ?query, filters = ?filters, error = %err, "search failed, returning no results");
                Ok(Vec::new())
            },
            other => other,
        }
    }

    pub async fn try_search(
        &self,
        query: Option<&str>,
        filters: &MovieFilters,
        page: u32,
    ) -> AppResult<Vec<movie::Model>> {
        let query = query.map(str::trim).filter(|q| !q.is_empty());

        let local = self.store.find_by_filters(query, filters);
        let remote = async {
            match query {
                Some(text) => listing(self.provider.search_by_text(text, page, filters).await),
                None => listing(self.provider.discover(filters, page).await).map(|records| {
                    records.into_iter().map(|record| with_requested_country(record, filters)).collect()
                }),
            }
        };

        self.read_through(local, remote).await
    }

    /// By-id read-through. Provider and database failures are logged and reported as
    /// not found.
    pub async fn movie(&self, id: i64) -> AppResult<movie::Model> {
        match self.try_movie(id).await {
            Err(err) if err.is_degradable() => {
                warn!(id = id, error = %err, "movie lookup failed, reporting not found");
                Err(AppError::NotFound)
            },
            other => other,
        }
    }

    async fn try_movie(&self, id: i64) -> AppResult<movie::Model> {
        let local = async { Ok::<Vec<_>, AppError>(self.store.find_by_id(id).await?.into_iter().collect()) };
        let remote = async { Ok::<_, AppError>(vec![self.provider.get_by_id(id).await?.into_record()]) };

        self.read_through(local, remote).await?.into_iter().next().ok_or(AppError::NotFound)
    }

    /// Provider passthrough; nothing is persisted.
    pub async fn popular(&self, page: u32) -> PopularPage {
        match self.provider.popular(page).await {
            Ok(p) => PopularPage {
                page: p.page,
                total_pages: p.total_pages,
                total_results: p.total_results,
                results: p.results.into_iter().map(|m| MovieSummary::from(&m.into_record())).collect(),
            },
            Err(err) => {
                warn!(page = page, error = %err, "popular listing unavailable");
                PopularPage::empty(page)
            },
        }
    }

    pub async fn create(&self, req: NewMovieRequest) -> AppResult<movie::Model> {
        let record = validate_new_movie(req)?;
        let created = self.store.insert_new(&record).await?;
        debug!(external_id = created.external_id, "created movie manually");
        Ok(created)
    }

    /// Turns a `genre` parameter (ids or names, comma separated) into genre ids.
    pub async fn resolve_genres(&self, raw: &str) -> AppResult<Vec<i32>> {
        let mut ids = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match self.genres.resolve(part).await? {
                Some(id) => ids.push(id),
                None => return Err(AppError::validation(format!("unknown genre '{part}'"))),
            }
        }
        Ok(ids)
    }

    /// Genre names for display. An unreachable provider yields no names, not an error.
    pub async fn genre_names(&self, ids: &[i32]) -> Vec<String> {
        self.genres.names_for(ids).await.unwrap_or_else(|err| {
            warn!(error = %err, "genre names unavailable");
            Vec::new()
        })
    }

    async fn read_through<L, R>(&self, local: L, remote: R) -> AppResult<Vec<movie::Model>>
    where
        L: Future<Output = AppResult<Vec<movie::Model>>>,
        R: Future<Output = AppResult<Vec<MovieRecord>>>,
    {
        let cached = local.await?;
        if !cached.is_empty() {
            debug!(count = cached.len(), "served from store");
            return Ok(cached);
        }

        let fetched = remote.await?;
        debug!(count = fetched.len(), "fetched from provider");

        let mut persisted = Vec::with_capacity(fetched.len());
        for record in &fetched {
            persisted.push(self.store.upsert(record).await?);
        }
        Ok(persisted)
    }
}

/// Any failure of a listing call, a 404 included, is an upstream failure.
fn listing(page: ProviderResult<Page>) -> AppResult<Vec<MovieRecord>> {
    page.map(|p| p.results.into_iter().map(TmdbMovie::into_record).collect())
        .map_err(AppError::UpstreamUnavailable)
}

/// Listing results carry no production countries. A movie discovered through
/// `with_origin_country` is known to come from that country, so the code is kept with it.
fn with_requested_country(mut record: MovieRecord, filters: &MovieFilters) -> MovieRecord {
    if let Some(country) = &filters.country {
        if record.production_countries.as_ref().is_none_or(Vec::is_empty) {
            record.production_countries = Some(vec![country.clone()]);
        }
    }
    record
}

fn validate_new_movie(req: NewMovieRequest) -> AppResult<MovieRecord> {
    let external_id = match req.id {
        Some(id) if id > 0 => id,
        _ => return Err(AppError::validation("id must be a positive provider id")),
    };
    let title = req.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        return Err(AppError::validation("title is required"));
    }
    if let Some(vote) = req.vote_average {
        if !(0.0..=10.0).contains(&vote) {
            return Err(AppError::validation("voteAverage must be between 0 and 10"));
        }
    }
    let release_date = match req.release_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<Date>()
                .map_err(|_| AppError::validation("releaseDate must be YYYY-MM-DD"))?,
        ),
    };

    Ok(MovieRecord {
        external_id,
        title: title.to_string(),
        overview: req.overview,
        poster_path: req.poster_path,
        release_date,
        vote_average: req.vote_average,
        genre_ids: Some(req.genres),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::{
        models::{Genre, SortBy},
        testing::{ProviderCall, StubProvider, memory_store},
        tmdb::ProviderError,
    };

    async fn catalog(provider: StubProvider) -> (Catalog, Arc<StubProvider>) {
        let provider = Arc::new(provider);
        let genres = Arc::new(GenreCache::new(provider.clone()));
        (Catalog::new(memory_store().await, provider.clone(), genres), provider)
    }

    fn matrix() -> serde_json::Value {
        json!({ "id": 603, "title": "The Matrix", "vote_average": 8.2, "genre_ids": [28, 878] })
    }

    #[tokio::test]
    async fn matrix_is_fetched_persisted_and_found() {
        let (catalog, provider) = catalog(StubProvider::default().with_movies(vec![matrix()])).await;

        let found = catalog.search(Some("Matrix"), &MovieFilters::default(), 1).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].external_id, 603);
        assert_eq!(found[0].genre_ids.0, vec![28, 878]);
        assert_eq!(found[0].release_date, None);
        assert_eq!(provider.list_calls.load(Ordering::SeqCst), 1);

        let stored = catalog.store.find_by_id(603).await.unwrap().unwrap();
        assert_eq!(stored.title, "The Matrix");
        assert_eq!(stored.vote_average, Some(8.2));
    }

    #[tokio::test]
    async fn second_search_is_served_from_the_store() {
        let (catalog, provider) = catalog(StubProvider::default().with_movies(vec![
            json!({ "id": 11, "title": "Star Wars", "vote_average": 8.2, "genre_ids": [12] }),
            json!({ "id": 1891, "title": "The Empire Strikes Back", "vote_average": 8.4, "genre_ids": [12] }),
            json!({ "id": 1892, "title": "Return of the Jedi", "vote_average": 7.9, "genre_ids": [12] }),
        ]))
        .await;
        let filters = MovieFilters { genres: vec![12], ..Default::default() };

        let first = catalog.search(None, &filters, 1).await.unwrap();
        let second = catalog.search(None, &filters, 1).await.unwrap();

        let ids = |movies: &[movie::Model]| movies.iter().map(|m| m.external_id).collect::<Vec<_>>();
        assert_eq!(ids(&first), vec![11, 1891, 1892]);
        let mut second_ids = ids(&second);
        second_ids.sort();
        assert_eq!(second_ids, vec![11, 1891, 1892]);
        assert_eq!(provider.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn query_goes_to_search_and_filters_ride_along() {
        let (catalog, provider) = catalog(StubProvider::default()).await;
        let filters = MovieFilters {
            year: Some(1999),
            country: Some("US".to_string()),
            ..Default::default()
        };

        let found = catalog.search(Some("  Matrix "), &filters, 3).await.unwrap();
        assert!(found.is_empty());

        assert_eq!(
            provider.calls.lock().unwrap().as_slice(),
            &[ProviderCall::Search { text: "Matrix".to_string(), page: 3, filters }]
        );
    }

    #[tokio::test]
    async fn empty_query_goes_to_discover() {
        let (catalog, provider) = catalog(StubProvider::default()).await;
        let filters = MovieFilters { sort_by: Some(SortBy::Popularity), ..Default::default() };

        catalog.search(Some(""), &filters, 1).await.unwrap();

        assert_eq!(
            provider.calls.lock().unwrap().as_slice(),
            &[ProviderCall::Discover { page: 1, filters }]
        );
    }

    #[tokio::test]
    async fn reappearing_movie_is_updated_in_place() {
        let (catalog, _) = catalog(StubProvider::default().with_movies(vec![json!({
            "id": 603, "title": "The Matrix", "vote_average": 8.7, "genre_ids": [28, 878], "release_date": "1999-03-30"
        })]))
        .await;
        let mut old = MovieRecord {
            external_id: 603,
            title: "Matrix".to_string(),
            vote_average: Some(7.0),
            genre_ids: Some(vec![878]),
            ..Default::default()
        };
        old.runtime = Some(136);
        let before = catalog.store.upsert(&old).await.unwrap();

        // genre 28 misses locally, so the provider answers and the row is refreshed
        let filters = MovieFilters { genres: vec![28], ..Default::default() };
        let found = catalog.search(None, &filters, 1).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "The Matrix");
        assert_eq!(found[0].vote_average, Some(8.7));
        assert_eq!(found[0].release_date.as_deref(), Some("1999-03-30"));
        assert_eq!(found[0].runtime, Some(136));
        assert_eq!(found[0].created_at, before.created_at);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_empty() {
        let (catalog, provider) = catalog(StubProvider::default().with_movies(vec![matrix()])).await;
        provider.fail_next(ProviderError::Upstream { status: 503, message: "down".to_string() });

        let found = catalog.search(Some("Matrix"), &MovieFilters::default(), 1).await.unwrap();
        assert!(found.is_empty());

        let retried = catalog.try_search(Some("Matrix"), &MovieFilters::default(), 1).await;
        assert_eq!(retried.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn listing_404_is_an_upstream_failure() {
        let (catalog, provider) = catalog(StubProvider::default().with_movies(vec![matrix()])).await;

        provider.fail_next(ProviderError::NotFound);
        let found = catalog.search(Some("Matrix"), &MovieFilters::default(), 1).await.unwrap();
        assert!(found.is_empty());

        provider.fail_next(ProviderError::NotFound);
        let err = catalog.try_search(None, &MovieFilters::default(), 1).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(ProviderError::NotFound)));
    }

    #[tokio::test]
    async fn country_filtered_discover_is_served_from_the_store_next_time() {
        let (catalog, provider) = catalog(StubProvider::default().with_movies(vec![matrix()])).await;
        let filters = MovieFilters { country: Some("US".to_string()), ..Default::default() };

        let first = catalog.search(None, &filters, 1).await.unwrap();
        let second = catalog.search(None, &filters, 1).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].production_countries.0, vec!["US".to_string()]);
        assert_eq!(second.len(), 1);
        assert_eq!(provider.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn text_search_does_not_invent_countries() {
        let (catalog, _) = catalog(StubProvider::default().with_movies(vec![matrix()])).await;
        let filters = MovieFilters { country: Some("US".to_string()), ..Default::default() };

        let found = catalog.search(Some("Matrix"), &filters, 1).await.unwrap();

        assert_eq!(found.len(), 1);
        assert!(found[0].production_countries.0.is_empty());
    }

    #[tokio::test]
    async fn try_search_surfaces_upstream_errors() {
        let (catalog, provider) = catalog(StubProvider::default()).await;
        provider.fail_next(ProviderError::Unauthorized);

        let err = catalog.try_search(None, &MovieFilters::default(), 1).await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(ProviderError::Unauthorized)));
    }

    #[tokio::test]
    async fn movie_reads_through_by_id() {
        let (catalog, provider) = catalog(StubProvider::default().with_detail(json!({
            "id": 603,
            "title": "The Matrix",
            "runtime": 136,
            "genres": [{ "id": 28, "name": "Action" }],
            "production_countries": [{ "iso_3166_1": "US", "name": "United States of America" }]
        })))
        .await;

        let first = catalog.movie(603).await.unwrap();
        let second = catalog.movie(603).await.unwrap();

        assert_eq!(first.runtime, Some(136));
        assert_eq!(first.genre_ids.0, vec![28]);
        assert_eq!(first.production_countries.0, vec!["US".to_string()]);
        assert_eq!(second.external_id, 603);
        assert_eq!(provider.detail_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_lookup_by_id_is_not_found() {
        let (catalog, provider) = catalog(StubProvider::default().with_detail(matrix())).await;

        provider.fail_next(ProviderError::Upstream { status: 503, message: "down".to_string() });
        assert!(matches!(catalog.movie(603).await, Err(AppError::NotFound)));

        provider.fail_next(ProviderError::Unauthorized);
        assert!(matches!(catalog.movie(603).await, Err(AppError::NotFound)));

        assert_eq!(catalog.movie(603).await.unwrap().external_id, 603);
        assert_eq!(provider.detail_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (catalog, _) = catalog(StubProvider::default()).await;
        assert!(matches!(catalog.movie(999).await, Err(AppError::NotFound)));
    }

    #[tokio::test]
    async fn popular_maps_without_persisting() {
        let (catalog, provider) = catalog(StubProvider::default().with_movies(vec![matrix()])).await;

        let page = catalog.popular(2).await;
        assert_eq!(page.page, 2);
        assert_eq!(page.results[0].id, 603);
        assert_eq!(page.results[0].genres, vec![28, 878]);
        assert!(catalog.store.find_by_id(603).await.unwrap().is_none());

        provider.fail_next(ProviderError::Unauthorized);
        assert_eq!(catalog.popular(1).await, PopularPage::empty(1));
        assert_eq!(provider.popular_calls.load(Ordering::SeqCst), 2);
        assert_eq!(provider.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn genre_parameter_accepts_ids_and_names() {
        let (catalog, _) = catalog(StubProvider::default().with_genres(vec![
            Genre { id: 12, name: "Adventure".to_string() },
            Genre { id: 35, name: "Comedy".to_string() },
        ]))
        .await;

        assert_eq!(catalog.resolve_genres("adventure, 878,,Comedy").await.unwrap(), vec![12, 878, 35]);
        assert!(matches!(catalog.resolve_genres("polka").await, Err(AppError::Validation(_))));
        assert_eq!(catalog.genre_names(&[35, 12]).await, vec!["Comedy", "Adventure"]);
    }

    #[tokio::test]
    async fn create_validates_and_refuses_duplicates() {
        let (catalog, _) = catalog(StubProvider::default()).await;
        let req = |id: Option<i64>, title: &str, date: &str| NewMovieRequest {
            id,
            title: Some(title.to_string()),
            overview: None,
            poster_path: None,
            vote_average: Some(6.5),
            release_date: Some(date.to_string()),
            genres: vec![18],
        };

        let created = catalog.create(req(Some(77), "Home movie", "2024-06-01")).await.unwrap();
        assert_eq!(created.release_date.as_deref(), Some("2024-06-01"));
        assert_eq!(created.genre_ids.0, vec![18]);

        assert!(matches!(catalog.create(req(Some(77), "Again", "")).await, Err(AppError::Conflict(77))));
        assert!(matches!(catalog.create(req(None, "No id", "")).await, Err(AppError::Validation(_))));
        assert!(matches!(catalog.create(req(Some(78), "  ", "")).await, Err(AppError::Validation(_))));
        assert!(matches!(
            catalog.create(req(Some(79), "Bad date", "June")).await,
            Err(AppError::Validation(_))
        ));
    }
}

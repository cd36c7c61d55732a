use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use sea_orm::{ConnectOptions, Database};
use serde_json::Value;

use crate::{
    db,
    models::{Genre, MovieFilters},
    store::MovieStore,
    tmdb::{MovieProvider, Page, ProviderError, ProviderResult, TmdbMovie},
};

pub async fn memory_store() -> MovieStore {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    db::migrate(&db).await.unwrap();
    MovieStore::new(db)
}

pub fn tmdb_movie(value: Value) -> TmdbMovie {
    serde_json::from_value(value).unwrap()
}

#[derive(Clone, Debug, PartialEq)]
pub enum ProviderCall {
    Search { text: String, page: u32, filters: MovieFilters },
    Discover { page: u32, filters: MovieFilters },
}

/// Canned provider that counts calls. `fail_next` makes the next call of any kind fail.
#[derive(Default)]
pub struct StubProvider {
    movies: Vec<TmdbMovie>,
    details: HashMap<i64, TmdbMovie>,
    genres: Vec<Genre>,
    failure: Mutex<Option<ProviderError>>,
    pub calls: Mutex<Vec<ProviderCall>>,
    pub list_calls: AtomicUsize,
    pub detail_calls: AtomicUsize,
    pub genre_calls: AtomicUsize,
    pub popular_calls: AtomicUsize,
}

impl StubProvider {
    pub fn with_movies(mut self, movies: Vec<Value>) -> Self {
        self.movies = movies.into_iter().map(tmdb_movie).collect();
        self
    }

    pub fn with_detail(mut self, movie: Value) -> Self {
        let movie = tmdb_movie(movie);
        self.details.insert(movie.id, movie);
        self
    }

    pub fn with_genres(mut self, genres: Vec<Genre>) -> Self {
        self.genres = genres;
        self
    }

    pub fn fail_next(&self, err: ProviderError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    fn check(&self) -> ProviderResult<()> {
        match self.failure.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn page(&self, page: u32) -> Page {
        Page {
            page,
            total_pages: 1,
            total_results: self.movies.len() as u32,
            results: self.movies.clone(),
        }
    }
}

#[async_trait]
impl MovieProvider for StubProvider {
    async fn search_by_text(
        &self,
        text: &str,
        page: u32,
        filters: &MovieFilters,
    ) -> ProviderResult<Page> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(ProviderCall::Search {
            text: text.to_string(),
            page,
            filters: filters.clone(),
        });
        self.check()?;
        Ok(self.page(page))
    }

    async fn discover(&self, filters: &MovieFilters, page: u32) -> ProviderResult<Page> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(ProviderCall::Discover { page, filters: filters.clone() });
        self.check()?;
        Ok(self.page(page))
    }

    async fn get_by_id(&self, id: i64) -> ProviderResult<TmdbMovie> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.details.get(&id).cloned().ok_or(ProviderError::NotFound)
    }

    async fn list_genres(&self) -> ProviderResult<Vec<Genre>> {
        self.genre_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.genres.clone())
    }

    async fn popular(&self, page: u32) -> ProviderResult<Page> {
        self.popular_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.page(page))
    }
}

use std::{collections::HashMap, sync::Arc};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    models::Genre,
    tmdb::MovieProvider,
};

/// Genre id → name lookup, loaded from the provider on first use and kept for the
/// life of the process. A failed load leaves the cell empty so the next call retries.
pub struct GenreCache {
    provider: Arc<dyn MovieProvider>,
    cell: OnceCell<Taxonomy>,
}

struct Taxonomy {
    genres: Vec<Genre>,
    names: HashMap<i32, String>,
}

impl GenreCache {
    pub fn new(provider: Arc<dyn MovieProvider>) -> Self {
        Self { provider, cell: OnceCell::new() }
    }

    async fn taxonomy(&self) -> AppResult<&Taxonomy> {
        self.cell
            .get_or_try_init(|| async {
                let genres = self.provider.list_genres().await?;
                debug!(count = genres.len(), "loaded genre taxonomy");
                let names = genres.iter().map(|g| (g.id, g.name.clone())).collect();
                Ok::<_, AppError>(Taxonomy { genres, names })
            })
            .await
    }

    pub async fn all(&self) -> AppResult<Vec<Genre>> {
        Ok(self.taxonomy().await?.genres.clone())
    }

    /// Names for `ids` in the same order; unknown ids are dropped.
    pub async fn names_for(&self, ids: &[i32]) -> AppResult<Vec<String>> {
        let taxonomy = self.taxonomy().await?;
        Ok(ids.iter().filter_map(|id| taxonomy.names.get(id).cloned()).collect())
    }

    /// Resolves a numeric id or a case-insensitive genre name.
    ///
    /// Numeric input never touches the provider.
    pub async fn resolve(&self, raw: &str) -> AppResult<Option<i32>> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<i32>() {
            return Ok(Some(id));
        }
        let taxonomy = self.taxonomy().await?;
        Ok(taxonomy.genres.iter().find(|g| g.name.eq_ignore_ascii_case(raw)).map(|g| g.id))
    }
}

use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, Order, QueryFilter, QueryOrder, Set, SqlErr,
    sea_query::{Expr, LikeExpr, OnConflict},
};

use crate::{
    entities::movie::{self, CountryCodes, GenreIds},
    error::{AppError, AppResult},
    models::{MovieFilters, MovieRecord, SortBy},
};

#[derive(Clone)]
pub struct MovieStore {
    db: DatabaseConnection,
}

impl MovieStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, external_id: i64) -> AppResult<Option<movie::Model>> {
        Ok(movie::Entity::find_by_id(external_id).one(&self.db).await?)
    }

    pub async fn find_by_filters(
        &self,
        query: Option<&str>,
        filters: &MovieFilters,
    ) -> AppResult<Vec<movie::Model>> {
        let mut select = movie::Entity::find();

        if let Some(q) = query.map(str::trim).filter(|q| !q.is_empty()) {
            select = select.filter(
                movie::Column::Title.like(LikeExpr::new(format!("%{}%", escape_like(q))).escape('!')),
            );
        }
        for genre in &filters.genres {
            select = select.filter(Expr::cust_with_values(
                "EXISTS (SELECT 1 FROM json_each(movies.genre_ids) WHERE json_each.value = ?)",
                [*genre],
            ));
        }
        if let Some(year) = filters.year {
            select = select.filter(movie::Column::ReleaseDate.starts_with(format!("{year:04}-")));
        }
        if let Some(country) = &filters.country {
            select = select.filter(Expr::cust_with_values(
                "EXISTS (SELECT 1 FROM json_each(movies.production_countries) WHERE json_each.value = ?)",
                [country.clone()],
            ));
        }

        let sort = filters.sort_by.unwrap_or(SortBy::VoteAverage);
        let order = if sort.is_ascending() { Order::Asc } else { Order::Desc };

        Ok(select
            .order_by(sort_column(sort), order)
            .order_by_asc(movie::Column::ExternalId)
            .all(&self.db)
            .await?)
    }

    /// Create-or-update keyed by external id. `created_at` is only written on insert and
    /// fields the record does not carry keep their stored value.
    pub async fn upsert(&self, record: &MovieRecord) -> AppResult<movie::Model> {
        let now = now_sec();

        movie::Entity::insert(active_model(record, now))
            .on_conflict(
                OnConflict::column(movie::Column::ExternalId)
                    .update_columns(carried_columns(record))
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        self.find_by_id(record.external_id).await?.ok_or_else(|| {
            AppError::Persistence(DbErr::RecordNotFound(format!(
                "movie {} missing after upsert",
                record.external_id
            )))
        })
    }

    /// Plain insert that refuses to touch an existing id.
    pub async fn insert_new(&self, record: &MovieRecord) -> AppResult<movie::Model> {
        if self.find_by_id(record.external_id).await?.is_some() {
            return Err(AppError::Conflict(record.external_id));
        }

        match movie::Entity::insert(active_model(record, now_sec())).exec(&self.db).await {
            Ok(_) => {},
            Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Err(AppError::Conflict(record.external_id));
            },
            Err(err) => return Err(err.into()),
        }

        self.find_by_id(record.external_id).await?.ok_or(AppError::NotFound)
    }
}

fn active_model(record: &MovieRecord, now: i64) -> movie::ActiveModel {
    movie::ActiveModel {
        external_id: Set(record.external_id),
        title: Set(record.title.clone()),
        overview: Set(record.overview.clone()),
        poster_path: Set(record.poster_path.clone()),
        backdrop_path: Set(record.backdrop_path.clone()),
        release_date: Set(record.release_date.map(|d| d.to_string())),
        vote_average: Set(record.vote_average),
        vote_count: Set(record.vote_count),
        popularity: Set(record.popularity),
        revenue: Set(record.revenue),
        budget: Set(record.budget),
        genre_ids: Set(GenreIds(record.genre_ids.clone().unwrap_or_default())),
        production_countries: Set(CountryCodes(
            record.production_countries.clone().unwrap_or_default(),
        )),
        original_language: Set(record.original_language.clone()),
        runtime: Set(record.runtime),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

fn carried_columns(record: &MovieRecord) -> Vec<movie::Column> {
    let optional = [
        (record.overview.is_some(), movie::Column::Overview),
        (record.poster_path.is_some(), movie::Column::PosterPath),
        (record.backdrop_path.is_some(), movie::Column::BackdropPath),
        (record.release_date.is_some(), movie::Column::ReleaseDate),
        (record.vote_average.is_some(), movie::Column::VoteAverage),
        (record.vote_count.is_some(), movie::Column::VoteCount),
        (record.popularity.is_some(), movie::Column::Popularity),
        (record.revenue.is_some(), movie::Column::Revenue),
        (record.budget.is_some(), movie::Column::Budget),
        (record.genre_ids.is_some(), movie::Column::GenreIds),
        (record.production_countries.is_some(), movie::Column::ProductionCountries),
        (record.original_language.is_some(), movie::Column::OriginalLanguage),
        (record.runtime.is_some(), movie::Column::Runtime),
    ];

    let mut columns = vec![movie::Column::Title, movie::Column::UpdatedAt];
    columns.extend(optional.into_iter().filter_map(|(sent, column)| sent.then_some(column)));
    columns
}

fn sort_column(sort: SortBy) -> movie::Column {
    match sort {
        SortBy::VoteAverage => movie::Column::VoteAverage,
        SortBy::Title => movie::Column::Title,
        SortBy::Popularity => movie::Column::Popularity,
        SortBy::ReleaseDate => movie::Column::ReleaseDate,
        SortBy::Revenue => movie::Column::Revenue,
        SortBy::VoteCount => movie::Column::VoteCount,
    }
}

/// `%` and `_` in user input match literally.
fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}

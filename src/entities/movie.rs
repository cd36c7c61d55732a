use sea_orm::{FromJsonQueryResult, entity::prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub external_id: i64,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    /// `YYYY-MM-DD`, validated on decode.
    pub release_date: Option<String>,
    pub vote_average: Option<f64>,
    pub vote_count: Option<i32>,
    pub popularity: Option<f64>,
    pub revenue: Option<f64>,
    pub budget: Option<f64>,
    #[sea_orm(column_type = "Json")]
    pub genre_ids: GenreIds,
    #[sea_orm(column_type = "Json")]
    pub production_countries: CountryCodes,
    pub original_language: Option<String>,
    pub runtime: Option<i32>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Provider genre ids, in provider order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct GenreIds(pub Vec<i32>);

/// ISO 3166-1 alpha-2 production country codes, in provider order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct CountryCodes(pub Vec<String>);

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

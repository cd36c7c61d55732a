use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(big_integer(Movies::ExternalId).primary_key())
                    .col(string(Movies::Title))
                    .col(text_null(Movies::Overview))
                    .col(string_null(Movies::PosterPath))
                    .col(string_null(Movies::BackdropPath))
                    .col(string_null(Movies::ReleaseDate))
                    .col(double_null(Movies::VoteAverage))
                    .col(integer_null(Movies::VoteCount))
                    .col(double_null(Movies::Popularity))
                    .col(double_null(Movies::Revenue))
                    .col(double_null(Movies::Budget))
                    .col(json(Movies::GenreIds))
                    .col(json(Movies::ProductionCountries))
                    .col(string_null(Movies::OriginalLanguage))
                    .col(integer_null(Movies::Runtime))
                    .col(big_integer(Movies::CreatedAt))
                    .col(big_integer(Movies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_title")
                    .table(Movies::Table)
                    .col(Movies::Title)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    ExternalId,
    Title,
    Overview,
    PosterPath,
    BackdropPath,
    ReleaseDate,
    VoteAverage,
    VoteCount,
    Popularity,
    Revenue,
    Budget,
    GenreIds,
    ProductionCountries,
    OriginalLanguage,
    Runtime,
    CreatedAt,
    UpdatedAt,
}

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_movies_vote_average")
                    .table(Movies::Table)
                    .col(Movies::VoteAverage)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_release_date")
                    .table(Movies::Table)
                    .col(Movies::ReleaseDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_movies_release_date").table(Movies::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_movies_vote_average").table(Movies::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Movies {
    Table,
    VoteAverage,
    ReleaseDate,
}

pub use sea_orm_migration::prelude::*;

mod m20250108_000001_create_movies_table;
mod m20250109_000001_add_movie_sort_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250108_000001_create_movies_table::Migration),
            Box::new(m20250109_000001_add_movie_sort_indexes::Migration),
        ]
    }
}

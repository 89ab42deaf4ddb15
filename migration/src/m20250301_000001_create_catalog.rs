use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Film::Table)
                    .if_not_exists()
                    .col(big_integer(Film::Id).primary_key())
                    .col(string(Film::Title))
                    .col(string(Film::TitleKey))
                    .col(json(Film::GenreIds))
                    .col(double(Film::VoteAverage))
                    .col(big_integer(Film::VoteCount))
                    .col(string_null(Film::ReleaseDate))
                    .col(json(Film::Extra))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_vote_average")
                    .table(Film::Table)
                    .col(Film::VoteAverage)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_film_release_date")
                    .table(Film::Table)
                    .col(Film::ReleaseDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Genre::Table)
                    .if_not_exists()
                    .col(big_integer(Genre::Id).primary_key())
                    .col(string(Genre::Name))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Genre::Table).to_owned()).await?;
        manager.drop_table(Table::drop().table(Film::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Film {
    Table,
    Id,
    Title,
    TitleKey,
    GenreIds,
    VoteAverage,
    VoteCount,
    ReleaseDate,
    Extra,
}

#[derive(DeriveIden)]
enum Genre {
    Table,
    Id,
    Name,
}

//! Initial schema of the tally remote store.
//!
//! - `owners`: account identities and their credentials
//! - `expenses`: personal and business expense rows, told apart by `book`
//! - `income`: income rows, grouped by `year` on the client
//! - `settings`: one row per owner
//!
//! Row identities use SQLite `AUTOINCREMENT`, so they are never reused and
//! always grow with creation order.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Owners {
    Table,
    Username,
    Password,
}

#[derive(Iden)]
enum Expenses {
    Table,
    Id,
    OwnerId,
    Book,
    Name,
    Cost,
    Status,
    Billing,
    MonthlyBase,
    YearlyBase,
    MonthlyConverted,
    YearlyConverted,
    Icon,
    SortOrder,
    NextDueDate,
    CreatedAt,
}

#[derive(Iden)]
enum Income {
    Table,
    Id,
    OwnerId,
    Name,
    Cost,
    Status,
    Billing,
    MonthlyBase,
    YearlyBase,
    MonthlyConverted,
    YearlyConverted,
    Icon,
    SortOrder,
    NextDueDate,
    Tags,
    Date,
    GrossAmount,
    PaidAmount,
    PaidConverted,
    Method,
    Year,
    CreatedAt,
}

#[derive(Iden)]
enum Settings {
    Table,
    OwnerId,
    ConversionRate,
    Theme,
    AutosaveMode,
    IncludeAnnualInMonthly,
    LockFlag,
    ColumnOrder,
    KnownYears,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared columns
// ─────────────────────────────────────────────────────────────────────────────

fn id_column(iden: impl IntoIden) -> ColumnDef {
    ColumnDef::new(iden)
        .integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn amount_column(iden: impl IntoIden) -> ColumnDef {
    ColumnDef::new(iden).double().not_null().default(0.0).to_owned()
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Owners
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Owners::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Owners::Username)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Owners::Password).string().not_null())
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Expenses
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(id_column(Expenses::Id))
                    .col(ColumnDef::new(Expenses::OwnerId).string().not_null())
                    .col(ColumnDef::new(Expenses::Book).string().not_null())
                    .col(ColumnDef::new(Expenses::Name).string().not_null())
                    .col(amount_column(Expenses::Cost))
                    .col(ColumnDef::new(Expenses::Status).string().not_null())
                    .col(ColumnDef::new(Expenses::Billing).string().not_null())
                    .col(amount_column(Expenses::MonthlyBase))
                    .col(amount_column(Expenses::YearlyBase))
                    .col(amount_column(Expenses::MonthlyConverted))
                    .col(amount_column(Expenses::YearlyConverted))
                    .col(ColumnDef::new(Expenses::Icon).string().not_null().default(""))
                    .col(
                        ColumnDef::new(Expenses::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Expenses::NextDueDate).date())
                    .col(
                        ColumnDef::new(Expenses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-expenses-owner_id")
                            .from(Expenses::Table, Expenses::OwnerId)
                            .to(Owners::Table, Owners::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-expenses-owner_id-book")
                    .table(Expenses::Table)
                    .col(Expenses::OwnerId)
                    .col(Expenses::Book)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Income
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Income::Table)
                    .if_not_exists()
                    .col(id_column(Income::Id))
                    .col(ColumnDef::new(Income::OwnerId).string().not_null())
                    .col(ColumnDef::new(Income::Name).string().not_null())
                    .col(amount_column(Income::Cost))
                    .col(ColumnDef::new(Income::Status).string().not_null())
                    .col(ColumnDef::new(Income::Billing).string().not_null())
                    .col(amount_column(Income::MonthlyBase))
                    .col(amount_column(Income::YearlyBase))
                    .col(amount_column(Income::MonthlyConverted))
                    .col(amount_column(Income::YearlyConverted))
                    .col(ColumnDef::new(Income::Icon).string().not_null().default(""))
                    .col(
                        ColumnDef::new(Income::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Income::NextDueDate).date())
                    .col(ColumnDef::new(Income::Tags).text().not_null().default("[]"))
                    .col(ColumnDef::new(Income::Date).date().not_null())
                    .col(amount_column(Income::GrossAmount))
                    .col(amount_column(Income::PaidAmount))
                    .col(amount_column(Income::PaidConverted))
                    .col(ColumnDef::new(Income::Method).string().not_null().default(""))
                    .col(ColumnDef::new(Income::Year).integer().not_null())
                    .col(
                        ColumnDef::new(Income::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-income-owner_id")
                            .from(Income::Table, Income::OwnerId)
                            .to(Owners::Table, Owners::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-income-owner_id-year")
                    .table(Income::Table)
                    .col(Income::OwnerId)
                    .col(Income::Year)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Settings
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Settings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Settings::OwnerId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Settings::ConversionRate)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(ColumnDef::new(Settings::Theme).string().not_null())
                    .col(ColumnDef::new(Settings::AutosaveMode).string().not_null())
                    .col(
                        ColumnDef::new(Settings::IncludeAnnualInMonthly)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Settings::LockFlag)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Settings::ColumnOrder)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(
                        ColumnDef::new(Settings::KnownYears)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-settings-owner_id")
                            .from(Settings::Table, Settings::OwnerId)
                            .to(Owners::Table, Owners::Username)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Settings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Income::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Owners::Table).to_owned())
            .await?;
        Ok(())
    }
}

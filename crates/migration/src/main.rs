use sea_orm::Database;
use sea_orm_migration::prelude::*;

const DEFAULT_DATABASE: &str = "sqlite:./tally.db?mode=rwc";

/// Same variable the server configuration reads, then the sea-orm default.
fn database_url() -> String {
    ["TALLY_SERVER__DATABASE", "DATABASE_URL"]
        .iter()
        .find_map(|key| std::env::var(key).ok())
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cmd = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    let db = Database::connect(&database_url()).await?;

    match cmd.as_str() {
        "up" => migration::Migrator::up(&db, None).await?,
        "down" => migration::Migrator::down(&db, None).await?,
        "fresh" => migration::Migrator::fresh(&db).await?,
        "status" => migration::Migrator::status(&db).await?,
        _ => {
            eprintln!("Usage: cargo run -p migration -- [up|down|fresh|status]");
            std::process::exit(2);
        }
    }

    Ok(())
}

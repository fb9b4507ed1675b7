use std::path::PathBuf;

use api_types::{
    Table,
    expense::{Billing, Status},
};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use engine::{Collection, EntityKey};

#[derive(Debug, Parser)]
#[command(name = "tally", version)]
#[command(about = "Personal bookkeeping with a durable sync engine")]
pub struct Cli {
    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

/// Values that win over the config file and the environment.
#[derive(Debug, Args)]
pub struct Overrides {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    pub config: Option<String>,
    /// Override the log level.
    #[arg(long, global = true)]
    pub level: Option<String>,
    /// Override the remote store URL (e.g. http://127.0.0.1:3000).
    #[arg(long, global = true)]
    pub base_url: Option<String>,
    /// Override the username (the password is never read from the CLI).
    #[arg(long, global = true)]
    pub username: Option<String>,
    /// Override the local cache directory.
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,
}

fn parse_collection(raw: &str) -> Result<Collection, String> {
    raw.parse::<Table>()
        .ok()
        .and_then(Collection::from_table)
        .ok_or_else(|| format!("expected personal, business or income, got {raw}"))
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the remote store service.
    Serve,
    /// Show the local ledger, its sync state and whether the remote answers.
    Status,
    /// List the rows of a collection with their keys.
    List {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        /// Only this year group (income).
        #[arg(long)]
        year: Option<i32>,
    },
    /// Push every row and the settings to the remote store.
    Sync,
    /// Replace the local ledger with the remote content.
    Pull,
    /// Append the rows of a CSV file and reconcile the table.
    Import {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        path: PathBuf,
    },
    /// Remove duplicate remote rows.
    Dedupe {
        /// Every row table when omitted.
        #[arg(value_parser = parse_collection)]
        collection: Option<Collection>,
    },
    /// Keep every following change local.
    Lock,
    /// Leave lock mode and push everything edited meanwhile.
    Unlock,
    Add(AddArgs),
    Edit(EditArgs),
    Delete {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        key: EntityKey,
    },
    /// Move a row to a new position inside its collection.
    Move {
        #[arg(value_parser = parse_collection)]
        collection: Collection,
        key: EntityKey,
        to: usize,
    },
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(value_parser = parse_collection)]
    pub collection: Collection,
    #[arg(long)]
    pub name: String,
    /// Cost of an expense, gross amount of an income row.
    #[arg(long)]
    pub amount: f64,
    #[arg(long, default_value = "monthly")]
    pub billing: Billing,
    /// Income date (YYYY-MM-DD); required for income rows.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub icon: Option<String>,
    #[arg(long)]
    pub method: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    #[arg(value_parser = parse_collection)]
    pub collection: Collection,
    pub key: EntityKey,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub amount: Option<f64>,
    #[arg(long)]
    pub billing: Option<Billing>,
    #[arg(long)]
    pub status: Option<Status>,
    /// Moves an income row to the year of the new date.
    #[arg(long)]
    pub date: Option<NaiveDate>,
    #[arg(long)]
    pub paid: Option<f64>,
}

use std::sync::Arc;

use api_types::{expense::ExpenseFields, income::IncomeFields};
use engine::{
    Collection, EntityKey, EntityRef, FileCache, HttpRemote, Loader, RemoteId, RemoteStore,
    SaveOrchestrator, SyncEvent,
};
use migration::{Migrator, MigratorTrait};
use tokio::sync::broadcast;

use crate::{
    cli::{AddArgs, Command, EditArgs},
    error::{AppError, Result},
    import,
    settings::{self, Settings},
};

pub async fn run(command: Command, settings: Settings) -> Result<()> {
    if let Command::Serve = command {
        return serve(&settings.server).await;
    }
    Session::open(&settings)?.execute(command).await
}

async fn serve(config: &settings::Server) -> Result<()> {
    let db = sea_orm::Database::connect(config.database_url()).await?;
    Migrator::up(&db, None).await?;

    let listener = tokio::net::TcpListener::bind(config.address()).await?;
    server::run_with_listener(db, listener).await?;
    Ok(())
}

/// One client run: the ledger restored from the cache, wired to the remote.
struct Session {
    orchestrator: SaveOrchestrator,
    remote: Arc<HttpRemote>,
    events: broadcast::Receiver<SyncEvent>,
}

impl Session {
    fn open(settings: &Settings) -> Result<Self> {
        let client = &settings.client;
        if client.username.is_empty() {
            return Err(AppError::Usage(
                "client.username is not configured".to_string(),
            ));
        }

        let remote = Arc::new(HttpRemote::new(
            &client.base_url,
            &client.username,
            &client.password,
            settings.sync.remote_timeout(),
        )?);
        let cache = Arc::new(FileCache::new(&client.cache_dir, &client.namespace));
        tracing::debug!(path = %cache.path().display(), "using local cache");

        let orchestrator =
            SaveOrchestrator::restore(cache, remote.clone(), settings.sync.clone());
        let events = orchestrator.events();
        Ok(Self {
            orchestrator,
            remote,
            events,
        })
    }

    async fn execute(mut self, command: Command) -> Result<()> {
        match command {
            Command::Serve => {
                return Err(AppError::Usage(
                    "serve does not open a client session".to_string(),
                ));
            }
            Command::Status => return self.status().await,
            Command::List { collection, year } => {
                self.list(collection, year);
                return Ok(());
            }
            Command::Sync => {
                let count = self.orchestrator.reconnect().await?;
                println!("pushing {count} entities");
            }
            Command::Pull => {
                let report = Loader::new(self.orchestrator.clone()).full_reload().await?;
                println!(
                    "reloaded {} rows, removed {} duplicates{}",
                    report.rows,
                    report.duplicates_removed,
                    if report.settings_found {
                        ""
                    } else {
                        ", no remote settings"
                    }
                );
            }
            Command::Import { collection, path } => {
                let rate = self.orchestrator.state().settings().conversion_rate;
                let rows = import::read_file(&path, collection, rate)?;
                let report = Loader::new(self.orchestrator.clone())
                    .bulk_import(collection, rows)
                    .await?;
                println!("imported {} rows into {collection}", report.imported);
                if report.reconciled {
                    println!(
                        "removed {} duplicates ({} local rows dropped)",
                        report.duplicates_removed, report.dropped_locally
                    );
                } else {
                    println!("rows kept locally, run `tally sync` then `tally dedupe`");
                }
            }
            Command::Dedupe { collection } => {
                let loader = Loader::new(self.orchestrator.clone());
                let collections = match collection {
                    Some(collection) => vec![collection],
                    None => Collection::ALL.to_vec(),
                };
                for collection in collections {
                    let report = loader.deduplicate(collection).await?;
                    println!(
                        "{collection}: scanned {}, removed {}, dropped {} local rows",
                        report.scanned,
                        report.removed.len(),
                        report.dropped_locally
                    );
                }
            }
            Command::Lock => self.orchestrator.set_lock(true),
            Command::Unlock => self.orchestrator.set_lock(false),
            Command::Add(args) => {
                let target = self.add(args)?;
                self.orchestrator.request_save(target, "add");
                if let EntityRef::Row { key, .. } = target {
                    println!("added {key}");
                }
            }
            Command::Edit(args) => {
                let target = self.edit(args)?;
                self.orchestrator.request_save(target, "edit");
            }
            Command::Delete { collection, key } => {
                self.orchestrator
                    .request_delete(EntityRef::row(collection, key))
                    .await?;
            }
            Command::Move {
                collection,
                key,
                to,
            } => self.move_row(collection, key, to)?,
        }

        self.orchestrator.settled().await;
        self.report();
        Ok(())
    }

    fn add(&self, args: AddArgs) -> Result<EntityRef> {
        let state = self.orchestrator.state();
        let rate = state.settings().conversion_rate;

        let mut expense = ExpenseFields::new(args.name, args.amount, args.billing);
        if let Some(icon) = args.icon {
            expense = expense.icon(icon);
        }
        expense.reprice(rate);

        if args.collection != Collection::Income {
            return Ok(state.add_expense(args.collection, expense)?);
        }

        let date = args
            .date
            .ok_or_else(|| AppError::Usage("income rows need --date".to_string()))?;
        let mut income = IncomeFields::new(expense.name.clone(), date, args.amount);
        income.base = expense;
        income.method = args.method.unwrap_or_default();
        income.tags = args.tags;
        Ok(state.add_income(income))
    }

    fn edit(&self, args: EditArgs) -> Result<EntityRef> {
        let state = self.orchestrator.state();
        let rate = state.settings().conversion_rate;
        let target = EntityRef::row(args.collection, args.key);

        let apply = |fields: &mut ExpenseFields| {
            if let Some(name) = &args.name {
                fields.name = name.clone();
            }
            if let Some(amount) = args.amount {
                fields.cost = amount;
            }
            if let Some(billing) = args.billing {
                fields.billing = billing;
            }
            if let Some(status) = args.status {
                fields.status = status;
            }
            fields.reprice(rate);
        };

        if args.collection != Collection::Income {
            state.update_expense(target, apply)?;
            return Ok(target);
        }

        state.update_income(target, |fields| {
            apply(&mut fields.base);
            if let Some(amount) = args.amount {
                fields.gross_amount = amount;
            }
            if let Some(date) = args.date {
                fields.date = date;
                fields.year = chrono::Datelike::year(&date);
            }
            if let Some(paid) = args.paid {
                fields.paid_amount = paid;
                fields.paid_converted = paid * rate;
            }
        })?;
        Ok(target)
    }

    /// Reorder; the save picks up every renumbered sibling.
    fn move_row(&self, collection: Collection, key: EntityKey, to: usize) -> Result<()> {
        let target = EntityRef::row(collection, key);
        self.orchestrator.state().move_row(target, to)?;
        self.orchestrator.request_save(target, "move");
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let snapshot = self.orchestrator.state().snapshot();
        let bound = self.orchestrator.state().bound_flags();
        let unbound = bound.iter().filter(|(_, bound)| !bound).count();

        println!("owner:      {}", self.remote.owner());
        println!("personal:   {} rows", snapshot.personal.len());
        println!("business:   {} rows", snapshot.business.len());
        for (year, rows) in &snapshot.income {
            println!("income {year}: {} rows", rows.len());
        }
        println!("not created remotely: {unbound}");
        println!("locked:     {}", snapshot.settings.lock_flag);
        match self.remote.ping().await {
            Ok(()) => println!("remote:     reachable"),
            Err(err) => println!("remote:     {err}"),
        }
        Ok(())
    }

    fn list(&self, collection: Collection, year: Option<i32>) {
        let snapshot = self.orchestrator.state().snapshot();
        let identity =
            |id: Option<RemoteId>| id.map_or_else(|| "-".to_string(), |id| id.to_string());

        match collection {
            Collection::Income => {
                for (group, rows) in &snapshot.income {
                    if year.is_some_and(|year| year != *group) {
                        continue;
                    }
                    for row in rows {
                        println!(
                            "{} {:>6} {:>3} {} {:<24} {:>10.2}",
                            row.key(),
                            identity(row.identity()),
                            row.fields.base.order,
                            row.fields.date,
                            row.fields.name(),
                            row.fields.gross_amount
                        );
                    }
                }
            }
            Collection::Personal | Collection::Business => {
                let rows = if collection == Collection::Personal {
                    &snapshot.personal
                } else {
                    &snapshot.business
                };
                for row in rows {
                    println!(
                        "{} {:>6} {:>3} {:<24} {:>10.2} {}",
                        row.key(),
                        identity(row.identity()),
                        row.fields.order,
                        row.fields.name,
                        row.fields.cost,
                        row.fields.billing.as_str()
                    );
                }
            }
        }
    }

    /// Print the final status and every failure seen during the run.
    fn report(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            if let SyncEvent::Failed {
                target, message, ..
            } = event
            {
                match target {
                    Some(target) => eprintln!("{target}: {message}"),
                    None => eprintln!("{message}"),
                }
            }
        }
        println!("status: {}", *self.orchestrator.status().borrow());
        let pending = self.orchestrator.pending_count();
        if pending > 0 {
            println!("{pending} change(s) kept locally");
        }
    }
}

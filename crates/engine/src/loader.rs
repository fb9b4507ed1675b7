//! Whole-ledger transfers: reload from the remote store and bulk import.

use std::collections::HashSet;

use api_types::{RemoteRow, Table};

use crate::{
    EngineError, ResultEngine,
    entity::{Collection, Entity, Row},
    orchestrator::{SaveOrchestrator, with_retry},
    reconcile::{DedupReport, Reconciler, plan},
    state::Snapshot,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub rows: usize,
    pub duplicates_removed: usize,
    pub settings_found: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Whether the import reached the remote store and was deduplicated.
    pub reconciled: bool,
    pub duplicates_removed: usize,
    pub dropped_locally: usize,
}

pub struct Loader {
    orchestrator: SaveOrchestrator,
    reconciler: Reconciler,
}

impl Loader {
    pub fn new(orchestrator: SaveOrchestrator) -> Self {
        let reconciler = Reconciler::new(
            orchestrator.remote().clone(),
            orchestrator.options().clone(),
        );
        Self {
            orchestrator,
            reconciler,
        }
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Replace the ledger with the remote content.
    ///
    /// Pending local changes are pushed first; if some cannot be pushed the
    /// reload is refused rather than dropping them.
    pub async fn full_reload(&self) -> ResultEngine<ReloadReport> {
        if self.orchestrator.pending_count() > 0 {
            self.orchestrator.save_pending("reload");
            self.orchestrator.settled().await;
        }
        let pending = self.orchestrator.pending_count();
        if pending > 0 {
            return Err(EngineError::PendingChanges(pending));
        }

        let remote = self.orchestrator.remote().as_ref();
        let options = self.orchestrator.options();
        let owner = remote.owner();
        let owner = &owner;

        let (personal, business, income, settings) = tokio::try_join!(
            with_retry(options, "list", move || remote.list(Table::Personal, owner)),
            with_retry(options, "list", move || remote.list(Table::Business, owner)),
            with_retry(options, "list", move || remote.list(Table::Income, owner)),
            with_retry(options, "fetch_settings", move || remote.fetch_settings(owner)),
        )?;

        let mut report = ReloadReport {
            settings_found: settings.is_some(),
            ..ReloadReport::default()
        };
        let personal = self.prune(Table::Personal, personal, &mut report).await?;
        let business = self.prune(Table::Business, business, &mut report).await?;
        let income = self.prune(Table::Income, income, &mut report).await?;

        let local = self.orchestrator.state().settings();
        let mut snapshot = Snapshot {
            settings: settings.unwrap_or_else(|| local.clone()),
            ..Snapshot::default()
        };
        snapshot.settings.lock_flag = local.lock_flag;
        for year in local.known_years {
            if !snapshot.settings.known_years.contains(&year) {
                snapshot.settings.known_years.push(year);
            }
        }

        for (collection, rows) in [
            (Collection::Personal, personal),
            (Collection::Business, business),
            (Collection::Income, income),
        ] {
            for row in rows {
                match (collection, row.fields) {
                    (Collection::Personal, Row::Expense(fields)) => {
                        snapshot.personal.push(Entity::bound(row.id, fields));
                    }
                    (Collection::Business, Row::Expense(fields)) => {
                        snapshot.business.push(Entity::bound(row.id, fields));
                    }
                    (Collection::Income, Row::Income(fields)) => {
                        snapshot
                            .income
                            .entry(fields.year)
                            .or_default()
                            .push(Entity::bound(row.id, fields));
                    }
                    (collection, _) => {
                        tracing::warn!(%collection, id = %row.id, "skipping row of the wrong shape");
                        continue;
                    }
                }
                report.rows += 1;
            }
        }

        self.orchestrator.state().replace(snapshot);
        self.orchestrator.reset_tracking();
        self.orchestrator.persist()?;
        // Pruned duplicates leave gaps in the remote `order` values.
        if self.orchestrator.save_reordered("reload") > 0 {
            self.orchestrator.settled().await;
        }
        tracing::info!(
            rows = report.rows,
            duplicates = report.duplicates_removed,
            "ledger reloaded from remote store"
        );
        Ok(report)
    }

    async fn prune(
        &self,
        table: Table,
        rows: Vec<RemoteRow<Row>>,
        report: &mut ReloadReport,
    ) -> ResultEngine<Vec<RemoteRow<Row>>> {
        let (kept, duplicates) = plan(rows);
        self.reconciler.remove(table, &duplicates).await?;
        report.duplicates_removed += duplicates.len();
        Ok(kept)
    }

    /// Append `rows` to `collection`, push them and deduplicate the table.
    pub async fn bulk_import(
        &self,
        collection: Collection,
        rows: Vec<Row>,
    ) -> ResultEngine<ImportReport> {
        let state = self.orchestrator.state();
        let mut imported = Vec::with_capacity(rows.len());
        for row in rows {
            let target = match (collection, row) {
                (Collection::Income, Row::Income(fields)) => state.add_income(fields),
                (Collection::Personal | Collection::Business, Row::Expense(fields)) => {
                    state.add_expense(collection, fields)?
                }
                (collection, _) => {
                    return Err(EngineError::InvalidTarget(format!(
                        "row does not belong to {collection}"
                    )));
                }
            };
            imported.push(target);
        }

        let mut report = ImportReport {
            imported: imported.len(),
            ..ImportReport::default()
        };
        tracing::info!(%collection, rows = report.imported, "importing rows");

        self.orchestrator.save_all("import");
        self.orchestrator.settled().await;

        let unsynced = imported
            .iter()
            .filter(|target| self.orchestrator.is_pending(**target))
            .count();
        if unsynced > 0 {
            tracing::info!(unsynced, "import kept locally, reconciliation postponed");
            return Ok(report);
        }

        let dedup = self.deduplicate(collection).await?;
        report.reconciled = true;
        report.duplicates_removed = dedup.removed.len();
        report.dropped_locally = dedup.dropped_locally;
        Ok(report)
    }

    /// Deduplicate the remote table behind `collection`, then drop the local
    /// rows that mirrored a removed duplicate.
    pub async fn deduplicate(&self, collection: Collection) -> ResultEngine<DedupReport> {
        let owner = self.orchestrator.remote().owner();
        let mut report = self
            .reconciler
            .deduplicate(collection.table(), &owner)
            .await?;
        let removed: HashSet<_> = report.removed.iter().copied().collect();
        report.dropped_locally = self
            .orchestrator
            .state()
            .drop_identities(collection, &removed);
        if report.dropped_locally > 0 {
            self.orchestrator.persist()?;
            if self.orchestrator.save_reordered("dedupe") > 0 {
                self.orchestrator.settled().await;
            }
        }
        Ok(report)
    }
}

//! Removal of duplicate remote rows.
//!
//! Two rows are duplicates when their structural key matches: name, cost and
//! billing for expenses; name, date and gross amount for income. Of every
//! group the earliest row (creation time, then identity) survives.

use std::{collections::HashMap, sync::Arc};

use api_types::{OwnerId, RemoteId, RemoteRow, Table, expense::Billing};
use chrono::NaiveDate;

use crate::{
    RemoteError, ResultEngine, SyncOptions, entity::Row, orchestrator::with_retry,
    remote::RemoteStore,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum StructuralKey {
    Expense {
        name: String,
        cost: i64,
        billing: Billing,
    },
    Income {
        name: String,
        date: NaiveDate,
        gross: i64,
    },
}

/// Amounts are compared at cent precision.
fn cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn structural_key(row: &Row) -> StructuralKey {
    match row {
        Row::Expense(fields) => StructuralKey::Expense {
            name: fields.name.trim().to_string(),
            cost: cents(fields.cost),
            billing: fields.billing,
        },
        Row::Income(fields) => StructuralKey::Income {
            name: fields.name().trim().to_string(),
            date: fields.date,
            gross: cents(fields.gross_amount),
        },
    }
}

/// Split rows into survivors (original order kept) and duplicate identities.
pub(crate) fn plan(rows: Vec<RemoteRow<Row>>) -> (Vec<RemoteRow<Row>>, Vec<RemoteId>) {
    let mut earliest: HashMap<StructuralKey, (chrono::DateTime<chrono::Utc>, RemoteId)> =
        HashMap::new();
    for row in &rows {
        let rank = (row.created_at, row.id);
        earliest
            .entry(structural_key(&row.fields))
            .and_modify(|kept| {
                if rank < *kept {
                    *kept = rank;
                }
            })
            .or_insert(rank);
    }

    let mut duplicates = Vec::new();
    let kept = rows
        .into_iter()
        .filter(|row| {
            let survivor = earliest
                .get(&structural_key(&row.fields))
                .is_some_and(|(_, id)| *id == row.id);
            if !survivor {
                duplicates.push(row.id);
            }
            survivor
        })
        .collect();
    duplicates.sort_unstable();
    (kept, duplicates)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DedupReport {
    pub scanned: usize,
    pub removed: Vec<RemoteId>,
    /// Local rows dropped because they mirrored a removed duplicate.
    pub dropped_locally: usize,
}

/// Deduplicates remote tables; talks to the remote store only.
#[derive(Clone)]
pub struct Reconciler {
    remote: Arc<dyn RemoteStore>,
    options: SyncOptions,
}

impl Reconciler {
    pub fn new(remote: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        Self { remote, options }
    }

    /// Delete every duplicate of `table` owned by `owner`.
    ///
    /// Running it again right after finds nothing left to delete.
    pub async fn deduplicate(&self, table: Table, owner: &OwnerId) -> ResultEngine<DedupReport> {
        if table == Table::Settings {
            return Ok(DedupReport::default());
        }

        let remote = self.remote.as_ref();
        let rows = with_retry(&self.options, "list", move || remote.list(table, owner)).await?;
        let scanned = rows.len();
        let (_, duplicates) = plan(rows);
        self.remove(table, &duplicates).await?;

        if !duplicates.is_empty() {
            tracing::info!(%table, %owner, removed = duplicates.len(), "removed duplicate rows");
        }
        Ok(DedupReport {
            scanned,
            removed: duplicates,
            dropped_locally: 0,
        })
    }

    /// Delete rows by identity; a row that is already gone counts as deleted.
    pub(crate) async fn remove(&self, table: Table, ids: &[RemoteId]) -> ResultEngine<()> {
        let remote = self.remote.as_ref();
        for id in ids.iter().copied() {
            match with_retry(&self.options, "delete", move || remote.delete(table, id)).await {
                Ok(()) | Err(RemoteError::NotFound(_)) => {
                    tracing::debug!(%table, %id, "duplicate row deleted");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

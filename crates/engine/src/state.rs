//! The `StateStore` holds the in-memory ledger the UI reads and edits.
//!
//! It owns no persistence logic. Every structural change (insert, delete,
//! reorder, year move) leaves each touched collection with `order` values
//! forming a dense `0..n` permutation. Rows renumbered as a side effect are
//! remembered until the orchestrator picks them up for a save.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use api_types::{
    RemoteId, expense::ExpenseFields, income::IncomeFields, settings::SettingsFields,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::{
    EngineError, ResultEngine,
    binder::BindOutcome,
    entity::{Collection, Entity, EntityKey, EntityRef, ExpenseRow, IncomeRow, Ordered, Row},
};

/// The whole ledger; also the local cache blob format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub personal: Vec<ExpenseRow>,
    pub business: Vec<ExpenseRow>,
    pub income: BTreeMap<i32, Vec<IncomeRow>>,
    pub settings: SettingsFields,
}

impl Snapshot {
    fn expenses(&self, collection: Collection) -> Option<&Vec<ExpenseRow>> {
        match collection {
            Collection::Personal => Some(&self.personal),
            Collection::Business => Some(&self.business),
            Collection::Income => None,
        }
    }

    fn expenses_mut(&mut self, collection: Collection) -> Option<&mut Vec<ExpenseRow>> {
        match collection {
            Collection::Personal => Some(&mut self.personal),
            Collection::Business => Some(&mut self.business),
            Collection::Income => None,
        }
    }

    fn income_position(&self, key: EntityKey) -> Option<(i32, usize)> {
        self.income.iter().find_map(|(year, rows)| {
            rows.iter()
                .position(|row| row.key() == key)
                .map(|index| (*year, index))
        })
    }

    /// Every row reference, collection by collection, in display order.
    pub fn refs(&self) -> Vec<EntityRef> {
        let mut refs = Vec::new();
        for collection in [Collection::Personal, Collection::Business] {
            if let Some(rows) = self.expenses(collection) {
                refs.extend(rows.iter().map(|row| EntityRef::row(collection, row.key())));
            }
        }
        for rows in self.income.values() {
            refs.extend(
                rows.iter()
                    .map(|row| EntityRef::row(Collection::Income, row.key())),
            );
        }
        refs
    }

    /// Renumber every collection; used after loading foreign data.
    ///
    /// Returns the rows whose `order` changed.
    pub fn normalize(&mut self) -> Vec<EntityRef> {
        let mut changed = Vec::new();
        for collection in [Collection::Personal, Collection::Business] {
            if let Some(rows) = self.expenses_mut(collection) {
                changed.extend(refs_of(collection, normalize(rows)));
            }
        }
        self.income.retain(|_, rows| !rows.is_empty());
        for rows in self.income.values_mut() {
            changed.extend(refs_of(Collection::Income, normalize(rows)));
        }
        for year in self.income.keys() {
            if !self.settings.known_years.contains(year) {
                self.settings.known_years.push(*year);
            }
        }
        self.settings.known_years.sort_unstable();
        changed
    }
}

/// Stable sort by current order, then renumber from zero.
fn normalize<T: Ordered>(rows: &mut [Entity<T>]) -> Vec<EntityKey> {
    rows.sort_by_key(|row| row.fields.order());
    renumber(rows)
}

/// Renumber following the current vector order; returns the keys of the rows
/// that moved.
fn renumber<T: Ordered>(rows: &mut [Entity<T>]) -> Vec<EntityKey> {
    let mut changed = Vec::new();
    for (index, row) in rows.iter_mut().enumerate() {
        let order = index as u32;
        if row.fields.order() != order {
            row.fields.set_order(order);
            changed.push(row.key());
        }
    }
    changed
}

fn refs_of(collection: Collection, keys: Vec<EntityKey>) -> impl Iterator<Item = EntityRef> {
    keys.into_iter().map(move |key| EntityRef::row(collection, key))
}

fn not_found(target: EntityRef) -> EngineError {
    EngineError::EntityNotFound(target.to_string())
}

/// Shared handle to the ledger.
///
/// Cloning is cheap; every clone sees the same tree.
#[derive(Clone, Debug, Default)]
pub struct StateStore {
    inner: Arc<RwLock<Snapshot>>,
    /// Rows renumbered by a change to another row, not saved since.
    reordered: Arc<Mutex<HashSet<EntityRef>>>,
}

impl StateStore {
    pub fn new(mut snapshot: Snapshot) -> Self {
        snapshot.normalize();
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
            reordered: Arc::default(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.read().clone()
    }

    pub(crate) fn replace(&self, mut snapshot: Snapshot) {
        let changed = snapshot.normalize();
        *self.inner.write() = snapshot;
        *self.reordered.lock() = changed.into_iter().collect();
    }

    fn mark_reordered(&self, collection: Collection, keys: Vec<EntityKey>) {
        self.reordered.lock().extend(refs_of(collection, keys));
    }

    /// Drain the rows whose `order` changed since the last call.
    pub(crate) fn take_reordered(&self) -> Vec<EntityRef> {
        self.reordered.lock().drain().collect()
    }

    pub fn refs(&self) -> Vec<EntityRef> {
        self.inner.read().refs()
    }

    pub fn settings(&self) -> SettingsFields {
        self.inner.read().settings.clone()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.read().settings.lock_flag
    }

    /// Append an expense at the end of its collection.
    pub fn add_expense(
        &self,
        collection: Collection,
        mut fields: ExpenseFields,
    ) -> ResultEngine<EntityRef> {
        let mut state = self.inner.write();
        let rows = state.expenses_mut(collection).ok_or_else(|| {
            EngineError::InvalidTarget(format!("{collection} does not hold expenses"))
        })?;
        fields.order = rows.len() as u32;
        let row = Entity::new(fields);
        let target = EntityRef::row(collection, row.key());
        rows.push(row);
        Ok(target)
    }

    /// Append an income row at the end of its year group.
    pub fn add_income(&self, mut fields: IncomeFields) -> EntityRef {
        let mut state = self.inner.write();
        let year = fields.year;
        if !state.settings.known_years.contains(&year) {
            state.settings.known_years.push(year);
            state.settings.known_years.sort_unstable();
        }
        let rows = state.income.entry(year).or_default();
        fields.base.order = rows.len() as u32;
        let row = Entity::new(fields);
        let target = EntityRef::row(Collection::Income, row.key());
        rows.push(row);
        target
    }

    pub fn expense(&self, target: EntityRef) -> Option<ExpenseRow> {
        let EntityRef::Row { collection, key } = target else {
            return None;
        };
        let state = self.inner.read();
        state
            .expenses(collection)?
            .iter()
            .find(|row| row.key() == key)
            .cloned()
    }

    pub fn income(&self, target: EntityRef) -> Option<IncomeRow> {
        let EntityRef::Row {
            collection: Collection::Income,
            key,
        } = target
        else {
            return None;
        };
        let state = self.inner.read();
        let (year, index) = state.income_position(key)?;
        state.income.get(&year).map(|rows| rows[index].clone())
    }

    pub fn income_for_year(&self, year: i32) -> Vec<IncomeRow> {
        self.inner
            .read()
            .income
            .get(&year)
            .cloned()
            .unwrap_or_default()
    }

    /// Edit an expense in place. The row keeps its position.
    pub fn update_expense(
        &self,
        target: EntityRef,
        edit: impl FnOnce(&mut ExpenseFields),
    ) -> ResultEngine<()> {
        let EntityRef::Row { collection, key } = target else {
            return Err(not_found(target));
        };
        let mut state = self.inner.write();
        let row = state
            .expenses_mut(collection)
            .and_then(|rows| rows.iter_mut().find(|row| row.key() == key))
            .ok_or_else(|| not_found(target))?;
        let order = row.fields.order;
        edit(&mut row.fields);
        row.fields.order = order;
        Ok(())
    }

    /// Edit an income row in place; a changed `year` moves it to the end of
    /// the new year group.
    pub fn update_income(
        &self,
        target: EntityRef,
        edit: impl FnOnce(&mut IncomeFields),
    ) -> ResultEngine<()> {
        let EntityRef::Row {
            collection: Collection::Income,
            key,
        } = target
        else {
            return Err(not_found(target));
        };
        let mut state = self.inner.write();
        let (year, index) = state.income_position(key).ok_or_else(|| not_found(target))?;
        let Some(rows) = state.income.get_mut(&year) else {
            return Err(not_found(target));
        };
        let order = rows[index].fields.base.order;
        edit(&mut rows[index].fields);
        rows[index].fields.base.order = order;

        let new_year = rows[index].fields.year;
        if new_year != year {
            let row = rows.remove(index);
            let mut changed = renumber(rows);
            if rows.is_empty() {
                state.income.remove(&year);
            }
            let group = state.income.entry(new_year).or_default();
            group.push(row);
            changed.extend(renumber(group));
            self.mark_reordered(Collection::Income, changed);
            if !state.settings.known_years.contains(&new_year) {
                state.settings.known_years.push(new_year);
                state.settings.known_years.sort_unstable();
            }
        }
        Ok(())
    }

    pub fn update_settings(&self, edit: impl FnOnce(&mut SettingsFields)) {
        edit(&mut self.inner.write().settings);
    }

    /// Move a row to `to` inside its collection (or year group).
    pub fn move_row(&self, target: EntityRef, to: usize) -> ResultEngine<()> {
        let EntityRef::Row { collection, key } = target else {
            return Err(not_found(target));
        };
        let mut state = self.inner.write();
        match collection {
            Collection::Income => {
                let (year, index) =
                    state.income_position(key).ok_or_else(|| not_found(target))?;
                let rows = state.income.get_mut(&year).ok_or_else(|| not_found(target))?;
                let changed = move_within(rows, index, to);
                self.mark_reordered(collection, changed);
            }
            _ => {
                let rows = state
                    .expenses_mut(collection)
                    .ok_or_else(|| not_found(target))?;
                let index = rows
                    .iter()
                    .position(|row| row.key() == key)
                    .ok_or_else(|| not_found(target))?;
                let changed = move_within(rows, index, to);
                self.mark_reordered(collection, changed);
            }
        }
        Ok(())
    }

    /// Remove a row and renumber its collection.
    pub(crate) fn remove(&self, target: EntityRef) -> ResultEngine<()> {
        let EntityRef::Row { collection, key } = target else {
            return Err(EngineError::InvalidTarget(
                "settings cannot be removed".to_string(),
            ));
        };
        let mut state = self.inner.write();
        match collection {
            Collection::Income => {
                let (year, index) =
                    state.income_position(key).ok_or_else(|| not_found(target))?;
                if let Some(rows) = state.income.get_mut(&year) {
                    rows.remove(index);
                    let changed = renumber(rows);
                    if rows.is_empty() {
                        state.income.remove(&year);
                    }
                    self.mark_reordered(collection, changed);
                }
            }
            _ => {
                let rows = state
                    .expenses_mut(collection)
                    .ok_or_else(|| not_found(target))?;
                let index = rows
                    .iter()
                    .position(|row| row.key() == key)
                    .ok_or_else(|| not_found(target))?;
                rows.remove(index);
                let changed = renumber(rows);
                self.mark_reordered(collection, changed);
            }
        }
        self.reordered.lock().remove(&target);
        Ok(())
    }

    /// Remote identity of a row, `Ok(None)` while it is pending creation.
    pub fn identity(&self, target: EntityRef) -> ResultEngine<Option<RemoteId>> {
        match target {
            EntityRef::Settings => Ok(None),
            EntityRef::Row {
                collection: Collection::Income,
                ..
            } => self
                .income(target)
                .map(|row| row.identity())
                .ok_or_else(|| not_found(target)),
            EntityRef::Row { .. } => self
                .expense(target)
                .map(|row| row.identity())
                .ok_or_else(|| not_found(target)),
        }
    }

    /// Payload and identity of a row as it is right now.
    pub(crate) fn row_payload(&self, target: EntityRef) -> Option<(Option<RemoteId>, Row)> {
        match target {
            EntityRef::Settings => None,
            EntityRef::Row {
                collection: Collection::Income,
                ..
            } => self
                .income(target)
                .map(|row| (row.identity(), Row::Income(row.fields))),
            EntityRef::Row { .. } => self
                .expense(target)
                .map(|row| (row.identity(), Row::Expense(row.fields))),
        }
    }

    /// Record a server identity on an unbound row.
    pub(crate) fn set_identity(&self, target: EntityRef, identity: RemoteId) -> BindOutcome {
        let EntityRef::Row { collection, key } = target else {
            return BindOutcome::Missing;
        };
        let mut state = self.inner.write();
        match collection {
            Collection::Income => {
                let Some((year, index)) = state.income_position(key) else {
                    return BindOutcome::Missing;
                };
                let Some(rows) = state.income.get_mut(&year) else {
                    return BindOutcome::Missing;
                };
                bind_row(&mut rows[index], identity)
            }
            _ => {
                let Some(row) = state
                    .expenses_mut(collection)
                    .and_then(|rows| rows.iter_mut().find(|row| row.key() == key))
                else {
                    return BindOutcome::Missing;
                };
                bind_row(row, identity)
            }
        }
    }

    /// Drop rows whose identity was deleted remotely.
    pub(crate) fn drop_identities(
        &self,
        collection: Collection,
        removed: &HashSet<RemoteId>,
    ) -> usize {
        if removed.is_empty() {
            return 0;
        }
        let keep = |identity: Option<RemoteId>| identity.is_none_or(|id| !removed.contains(&id));
        let mut state = self.inner.write();
        let mut dropped = 0;
        match collection {
            Collection::Income => {
                let mut changed = Vec::new();
                for rows in state.income.values_mut() {
                    let before = rows.len();
                    rows.retain(|row| keep(row.identity()));
                    dropped += before - rows.len();
                    changed.extend(renumber(rows));
                }
                state.income.retain(|_, rows| !rows.is_empty());
                self.mark_reordered(collection, changed);
            }
            _ => {
                if let Some(rows) = state.expenses_mut(collection) {
                    let before = rows.len();
                    rows.retain(|row| keep(row.identity()));
                    dropped = before - rows.len();
                    let changed = renumber(rows);
                    self.mark_reordered(collection, changed);
                }
            }
        }
        dropped
    }

    /// `(row, bound)` pairs for diagnostic display.
    pub fn bound_flags(&self) -> Vec<(EntityRef, bool)> {
        let state = self.inner.read();
        let mut flags = Vec::new();
        for collection in [Collection::Personal, Collection::Business] {
            if let Some(rows) = state.expenses(collection) {
                flags.extend(
                    rows.iter()
                        .map(|row| (EntityRef::row(collection, row.key()), row.is_bound())),
                );
            }
        }
        for rows in state.income.values() {
            flags.extend(
                rows.iter()
                    .map(|row| (EntityRef::row(Collection::Income, row.key()), row.is_bound())),
            );
        }
        flags
    }
}

fn bind_row<T>(row: &mut Entity<T>, identity: RemoteId) -> BindOutcome {
    match row.identity() {
        Some(existing) => BindOutcome::AlreadyBound(existing),
        None => {
            row.set_identity(identity);
            BindOutcome::Bound
        }
    }
}

fn move_within<T: Ordered>(rows: &mut Vec<Entity<T>>, from: usize, to: usize) -> Vec<EntityKey> {
    let row = rows.remove(from);
    let to = to.min(rows.len());
    rows.insert(to, row);
    renumber(rows)
}

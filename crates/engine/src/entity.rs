//! The module contains the row-shaped entities held by the state store.

use std::fmt;

use api_types::{
    RemoteId, Table, expense::ExpenseFields, income::IncomeFields,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Local, stable handle of an entity.
///
/// Assigned on creation and never sent to the remote store, so an entity can
/// be addressed before it has a remote identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(Uuid);

impl EntityKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntityKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntityKey {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A row plus its (optional) remote identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity<T> {
    key: EntityKey,
    #[serde(default)]
    identity: Option<RemoteId>,
    pub fields: T,
}

pub type ExpenseRow = Entity<ExpenseFields>;
pub type IncomeRow = Entity<IncomeFields>;

impl<T> Entity<T> {
    /// A new entity pending creation.
    pub fn new(fields: T) -> Self {
        Self {
            key: EntityKey::new(),
            identity: None,
            fields,
        }
    }

    /// An entity mirroring an existing remote row.
    pub(crate) fn bound(identity: RemoteId, fields: T) -> Self {
        Self {
            key: EntityKey::new(),
            identity: Some(identity),
            fields,
        }
    }

    pub fn key(&self) -> EntityKey {
        self.key
    }

    pub fn identity(&self) -> Option<RemoteId> {
        self.identity
    }

    pub fn is_bound(&self) -> bool {
        self.identity.is_some()
    }

    /// Only the identity binder goes through here.
    pub(crate) fn set_identity(&mut self, identity: RemoteId) {
        self.identity = Some(identity);
    }
}

/// Row collections of the state store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Personal,
    Business,
    Income,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Self::Personal, Self::Business, Self::Income];

    pub fn table(self) -> Table {
        match self {
            Self::Personal => Table::Personal,
            Self::Business => Table::Business,
            Self::Income => Table::Income,
        }
    }

    pub fn from_table(table: Table) -> Option<Self> {
        match table {
            Table::Personal => Some(Self::Personal),
            Table::Business => Some(Self::Business),
            Table::Income => Some(Self::Income),
            Table::Settings => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table().as_str())
    }
}

/// What a save or delete request addresses.
///
/// Income rows are found by key across every year group, so a reference stays
/// valid when a row changes year.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Row { collection: Collection, key: EntityKey },
    Settings,
}

impl EntityRef {
    pub fn row(collection: Collection, key: EntityKey) -> Self {
        Self::Row { collection, key }
    }

    pub fn table(&self) -> Table {
        match self {
            Self::Row { collection, .. } => collection.table(),
            Self::Settings => Table::Settings,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row { collection, key } => write!(f, "{collection}/{key}"),
            Self::Settings => f.write_str("settings"),
        }
    }
}

/// Row payload sent to the remote store.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    Expense(ExpenseFields),
    Income(IncomeFields),
}

impl Row {
    pub fn order(&self) -> u32 {
        match self {
            Self::Expense(fields) => fields.order,
            Self::Income(fields) => fields.base.order,
        }
    }
}

/// Row types that carry a position inside their collection.
pub(crate) trait Ordered {
    fn order(&self) -> u32;
    fn set_order(&mut self, order: u32);
}

impl Ordered for ExpenseFields {
    fn order(&self) -> u32 {
        self.order
    }

    fn set_order(&mut self, order: u32) {
        self.order = order;
    }
}

impl Ordered for IncomeFields {
    fn order(&self) -> u32 {
        self.base.order
    }

    fn set_order(&mut self, order: u32) {
        self.base.order = order;
    }
}

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical tables exposed by the remote store.
///
/// Personal and business expenses share the same row shape but live in
/// separate tables; settings is a singleton per owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Personal,
    Business,
    Income,
    Settings,
}

impl Table {
    /// Row tables, i.e. every table except the settings singleton.
    pub const ROWS: [Table; 3] = [Table::Personal, Table::Business, Table::Income];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Business => "business",
            Self::Income => "income",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(Self::Personal),
            "business" => Ok(Self::Business),
            "income" => Ok(Self::Income),
            "settings" => Ok(Self::Settings),
            other => Err(format!("unknown table: {other}")),
        }
    }
}

/// Server-assigned row identity.
///
/// Identities are handed out in increasing order, so comparing two of them
/// gives their creation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(pub i64);

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account identity every row is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl OwnerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted row as returned by `list`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow<T> {
    pub id: RemoteId,
    pub owner_id: OwnerId,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: T,
}

/// Response body of a successful insert.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RowCreated {
    pub id: RemoteId,
}

/// Error body returned by the remote store.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub mod expense {
    use chrono::NaiveDate;

    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Status {
        #[default]
        Active,
        Cancelled,
    }

    impl Status {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Active => "active",
                Self::Cancelled => "cancelled",
            }
        }
    }

    impl FromStr for Status {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "active" => Ok(Self::Active),
                "cancelled" => Ok(Self::Cancelled),
                other => Err(format!("unknown status: {other}")),
            }
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Billing {
        #[default]
        Monthly,
        Annually,
    }

    impl Billing {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Monthly => "monthly",
                Self::Annually => "annually",
            }
        }
    }

    impl FromStr for Billing {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "monthly" => Ok(Self::Monthly),
                "annually" => Ok(Self::Annually),
                other => Err(format!("unknown billing: {other}")),
            }
        }
    }

    /// Business fields of an expense row.
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct ExpenseFields {
        pub name: String,
        pub cost: f64,
        #[serde(default)]
        pub status: Status,
        #[serde(default)]
        pub billing: Billing,
        #[serde(default)]
        pub monthly_base: f64,
        #[serde(default)]
        pub yearly_base: f64,
        #[serde(default)]
        pub monthly_converted: f64,
        #[serde(default)]
        pub yearly_converted: f64,
        #[serde(default)]
        pub icon: String,
        #[serde(default)]
        pub order: u32,
        #[serde(default)]
        pub next_due_date: Option<NaiveDate>,
    }

    impl ExpenseFields {
        pub fn new(name: impl Into<String>, cost: f64, billing: Billing) -> Self {
            let mut fields = Self {
                name: name.into(),
                cost,
                billing,
                ..Self::default()
            };
            fields.reprice(1.0);
            fields
        }

        #[must_use]
        pub fn icon(mut self, icon: impl Into<String>) -> Self {
            self.icon = icon.into();
            self
        }

        /// Recompute the derived monthly/yearly amounts for a conversion rate.
        pub fn reprice(&mut self, conversion_rate: f64) {
            let (monthly, yearly) = match self.billing {
                Billing::Monthly => (self.cost, self.cost * 12.0),
                Billing::Annually => (self.cost / 12.0, self.cost),
            };
            self.monthly_base = monthly;
            self.yearly_base = yearly;
            self.monthly_converted = monthly * conversion_rate;
            self.yearly_converted = yearly * conversion_rate;
        }
    }
}

pub mod income {
    use chrono::{Datelike, NaiveDate};

    use super::{expense::ExpenseFields, *};

    /// Business fields of an income row: an expense-shaped row plus the
    /// payment details. `year` groups rows on the client.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct IncomeFields {
        #[serde(flatten)]
        pub base: ExpenseFields,
        #[serde(default)]
        pub tags: Vec<String>,
        pub date: NaiveDate,
        pub gross_amount: f64,
        #[serde(default)]
        pub paid_amount: f64,
        #[serde(default)]
        pub paid_converted: f64,
        #[serde(default)]
        pub method: String,
        pub year: i32,
    }

    impl IncomeFields {
        pub fn new(name: impl Into<String>, date: NaiveDate, gross_amount: f64) -> Self {
            Self {
                base: ExpenseFields::new(name, gross_amount, Default::default()),
                tags: Vec::new(),
                date,
                gross_amount,
                paid_amount: 0.0,
                paid_converted: 0.0,
                method: String::new(),
                year: date.year(),
            }
        }

        pub fn name(&self) -> &str {
            &self.base.name
        }
    }
}

pub mod settings {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Theme {
        #[default]
        System,
        Light,
        Dark,
    }

    impl Theme {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::System => "system",
                Self::Light => "light",
                Self::Dark => "dark",
            }
        }
    }

    impl FromStr for Theme {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "system" => Ok(Self::System),
                "light" => Ok(Self::Light),
                "dark" => Ok(Self::Dark),
                other => Err(format!("unknown theme: {other}")),
            }
        }
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum AutosaveMode {
        #[default]
        Auto,
        Manual,
    }

    impl AutosaveMode {
        pub fn as_str(self) -> &'static str {
            match self {
                Self::Auto => "auto",
                Self::Manual => "manual",
            }
        }
    }

    impl FromStr for AutosaveMode {
        type Err = String;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s {
                "auto" => Ok(Self::Auto),
                "manual" => Ok(Self::Manual),
                other => Err(format!("unknown autosave mode: {other}")),
            }
        }
    }

    /// The per-owner settings singleton.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    pub struct SettingsFields {
        pub conversion_rate: f64,
        pub theme: Theme,
        pub autosave_mode: AutosaveMode,
        pub include_annual_in_monthly: bool,
        pub lock_flag: bool,
        pub column_order: Vec<String>,
        pub known_years: Vec<i32>,
    }

    impl Default for SettingsFields {
        fn default() -> Self {
            Self {
                conversion_rate: 1.0,
                theme: Theme::default(),
                autosave_mode: AutosaveMode::default(),
                include_annual_in_monthly: false,
                lock_flag: false,
                column_order: Vec::new(),
                known_years: Vec::new(),
            }
        }
    }
}

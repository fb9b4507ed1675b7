//! CSV import.
//!
//! Expense files carry `name,cost[,billing,status,icon,next_due_date]`;
//! income files carry `name,date,gross_amount[,paid_amount,method,tags]`
//! with tags separated by `;`.

use std::{fs::File, io::Read, path::Path};

use api_types::{
    expense::{Billing, ExpenseFields, Status},
    income::IncomeFields,
};
use chrono::NaiveDate;
use engine::{Collection, Row};
use serde::Deserialize;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize)]
struct ExpenseRecord {
    name: String,
    cost: f64,
    #[serde(default)]
    billing: Option<Billing>,
    #[serde(default)]
    status: Option<Status>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    next_due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct IncomeRecord {
    name: String,
    date: NaiveDate,
    gross_amount: f64,
    #[serde(default)]
    paid_amount: Option<f64>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    tags: Option<String>,
}

fn checked_name(line: usize, name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Usage(format!("line {line}: name is empty")));
    }
    Ok(name.to_string())
}

impl ExpenseRecord {
    fn into_row(self, line: usize, conversion_rate: f64) -> Result<Row> {
        let mut fields = ExpenseFields::new(
            checked_name(line, &self.name)?,
            self.cost,
            self.billing.unwrap_or_default(),
        );
        fields.status = self.status.unwrap_or_default();
        fields.icon = self.icon.unwrap_or_default();
        fields.next_due_date = self.next_due_date;
        fields.reprice(conversion_rate);
        Ok(Row::Expense(fields))
    }
}

impl IncomeRecord {
    fn into_row(self, line: usize, conversion_rate: f64) -> Result<Row> {
        let mut fields =
            IncomeFields::new(checked_name(line, &self.name)?, self.date, self.gross_amount);
        fields.paid_amount = self.paid_amount.unwrap_or_default();
        fields.paid_converted = fields.paid_amount * conversion_rate;
        fields.method = self.method.unwrap_or_default();
        fields.tags = self
            .tags
            .unwrap_or_default()
            .split(';')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect();
        fields.base.reprice(conversion_rate);
        Ok(Row::Income(fields))
    }
}

/// Parse every record of `input` into rows of `collection`.
pub fn read_rows<R: Read>(
    input: R,
    collection: Collection,
    conversion_rate: f64,
) -> Result<Vec<Row>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(input);
    let mut rows = Vec::new();
    // Line 1 is the header, so record `index` sits on line `index + 2`.
    match collection {
        Collection::Income => {
            for (index, record) in reader.deserialize::<IncomeRecord>().enumerate() {
                rows.push(record?.into_row(index + 2, conversion_rate)?);
            }
        }
        Collection::Personal | Collection::Business => {
            for (index, record) in reader.deserialize::<ExpenseRecord>().enumerate() {
                rows.push(record?.into_row(index + 2, conversion_rate)?);
            }
        }
    }
    Ok(rows)
}

pub fn read_file(path: &Path, collection: Collection, conversion_rate: f64) -> Result<Vec<Row>> {
    let file = File::open(path)?;
    read_rows(file, collection, conversion_rate)
}

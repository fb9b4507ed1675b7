//! Personal and business expense rows share this table; `book` tells them
//! apart.

use api_types::{
    OwnerId, RemoteId, RemoteRow, Table,
    expense::{Billing, ExpenseFields, Status},
};
use chrono::Utc;
use sea_orm::{ActiveValue, entity::prelude::*};

use crate::ServerError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "expenses")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub owner_id: String,
    pub book: String,
    pub name: String,
    pub cost: f64,
    pub status: String,
    pub billing: String,
    pub monthly_base: f64,
    pub yearly_base: f64,
    pub monthly_converted: f64,
    pub yearly_converted: f64,
    pub icon: String,
    pub sort_order: i32,
    pub next_due_date: Option<Date>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn fields(&self) -> Result<ExpenseFields, ServerError> {
        Ok(ExpenseFields {
            name: self.name.clone(),
            cost: self.cost,
            status: self.status.parse::<Status>().map_err(ServerError::Corrupt)?,
            billing: self.billing.parse::<Billing>().map_err(ServerError::Corrupt)?,
            monthly_base: self.monthly_base,
            yearly_base: self.yearly_base,
            monthly_converted: self.monthly_converted,
            yearly_converted: self.yearly_converted,
            icon: self.icon.clone(),
            order: u32::try_from(self.sort_order).unwrap_or_default(),
            next_due_date: self.next_due_date,
        })
    }

    pub fn remote_row(&self) -> Result<RemoteRow<ExpenseFields>, ServerError> {
        Ok(RemoteRow {
            id: RemoteId(self.id),
            owner_id: OwnerId::new(self.owner_id.clone()),
            created_at: self.created_at,
            fields: self.fields()?,
        })
    }
}

/// Columns written by both insert and update.
pub fn apply(active: &mut ActiveModel, fields: &ExpenseFields) {
    active.name = ActiveValue::Set(fields.name.trim().to_string());
    active.cost = ActiveValue::Set(fields.cost);
    active.status = ActiveValue::Set(fields.status.as_str().to_string());
    active.billing = ActiveValue::Set(fields.billing.as_str().to_string());
    active.monthly_base = ActiveValue::Set(fields.monthly_base);
    active.yearly_base = ActiveValue::Set(fields.yearly_base);
    active.monthly_converted = ActiveValue::Set(fields.monthly_converted);
    active.yearly_converted = ActiveValue::Set(fields.yearly_converted);
    active.icon = ActiveValue::Set(fields.icon.clone());
    active.sort_order = ActiveValue::Set(i32::try_from(fields.order).unwrap_or(i32::MAX));
    active.next_due_date = ActiveValue::Set(fields.next_due_date);
}

pub fn new_row(owner: &str, book: Table, fields: &ExpenseFields) -> ActiveModel {
    let mut active = ActiveModel {
        id: ActiveValue::NotSet,
        owner_id: ActiveValue::Set(owner.to_string()),
        book: ActiveValue::Set(book.as_str().to_string()),
        created_at: ActiveValue::Set(Utc::now()),
        ..Default::default()
    };
    apply(&mut active, fields);
    active
}

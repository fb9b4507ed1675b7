use api_types::{
    OwnerId, RemoteId, RemoteRow,
    expense::{Billing, ExpenseFields, Status},
    income::IncomeFields,
};
use chrono::Utc;
use sea_orm::{ActiveValue, entity::prelude::*};

use crate::ServerError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "income")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub owner_id: String,
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
    /// JSON array of strings.
    pub tags: String,
    pub date: Date,
    pub gross_amount: f64,
    pub paid_amount: f64,
    pub paid_converted: f64,
    pub method: String,
    pub year: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn fields(&self) -> Result<IncomeFields, ServerError> {
        let tags = serde_json::from_str(&self.tags)
            .map_err(|err| ServerError::Corrupt(format!("income {} tags: {err}", self.id)))?;
        Ok(IncomeFields {
            base: ExpenseFields {
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
            },
            tags,
            date: self.date,
            gross_amount: self.gross_amount,
            paid_amount: self.paid_amount,
            paid_converted: self.paid_converted,
            method: self.method.clone(),
            year: self.year,
        })
    }

    pub fn remote_row(&self) -> Result<RemoteRow<IncomeFields>, ServerError> {
        Ok(RemoteRow {
            id: RemoteId(self.id),
            owner_id: OwnerId::new(self.owner_id.clone()),
            created_at: self.created_at,
            fields: self.fields()?,
        })
    }
}

pub fn apply(active: &mut ActiveModel, fields: &IncomeFields) -> Result<(), ServerError> {
    let base = &fields.base;
    let tags = serde_json::to_string(&fields.tags)
        .map_err(|err| ServerError::Validation(err.to_string()))?;

    active.name = ActiveValue::Set(base.name.trim().to_string());
    active.cost = ActiveValue::Set(base.cost);
    active.status = ActiveValue::Set(base.status.as_str().to_string());
    active.billing = ActiveValue::Set(base.billing.as_str().to_string());
    active.monthly_base = ActiveValue::Set(base.monthly_base);
    active.yearly_base = ActiveValue::Set(base.yearly_base);
    active.monthly_converted = ActiveValue::Set(base.monthly_converted);
    active.yearly_converted = ActiveValue::Set(base.yearly_converted);
    active.icon = ActiveValue::Set(base.icon.clone());
    active.sort_order = ActiveValue::Set(i32::try_from(base.order).unwrap_or(i32::MAX));
    active.next_due_date = ActiveValue::Set(base.next_due_date);
    active.tags = ActiveValue::Set(tags);
    active.date = ActiveValue::Set(fields.date);
    active.gross_amount = ActiveValue::Set(fields.gross_amount);
    active.paid_amount = ActiveValue::Set(fields.paid_amount);
    active.paid_converted = ActiveValue::Set(fields.paid_converted);
    active.method = ActiveValue::Set(fields.method.clone());
    active.year = ActiveValue::Set(fields.year);
    Ok(())
}

pub fn new_row(owner: &str, fields: &IncomeFields) -> Result<ActiveModel, ServerError> {
    let mut active = ActiveModel {
        id: ActiveValue::NotSet,
        owner_id: ActiveValue::Set(owner.to_string()),
        created_at: ActiveValue::Set(Utc::now()),
        ..Default::default()
    };
    apply(&mut active, fields)?;
    Ok(active)
}

//! The settings singleton, upserted by owner.

use api_types::settings::{AutosaveMode, SettingsFields, Theme};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use sea_orm::{ActiveValue, IntoActiveModel, entity::prelude::*};

use crate::{ServerError, owner, rows::ensure_owner, server::ServerState, validate};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub owner_id: String,
    pub conversion_rate: f64,
    pub theme: String,
    pub autosave_mode: String,
    pub include_annual_in_monthly: bool,
    pub lock_flag: bool,
    /// JSON array of column names.
    pub column_order: String,
    /// JSON array of years.
    pub known_years: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    fn fields(&self) -> Result<SettingsFields, ServerError> {
        let corrupt = |err: serde_json::Error| {
            ServerError::Corrupt(format!("settings of {}: {err}", self.owner_id))
        };
        Ok(SettingsFields {
            conversion_rate: self.conversion_rate,
            theme: self.theme.parse::<Theme>().map_err(ServerError::Corrupt)?,
            autosave_mode: self
                .autosave_mode
                .parse::<AutosaveMode>()
                .map_err(ServerError::Corrupt)?,
            include_annual_in_monthly: self.include_annual_in_monthly,
            lock_flag: self.lock_flag,
            column_order: serde_json::from_str(&self.column_order).map_err(corrupt)?,
            known_years: serde_json::from_str(&self.known_years).map_err(corrupt)?,
        })
    }
}

fn apply(active: &mut ActiveModel, fields: &SettingsFields) -> Result<(), ServerError> {
    let encode = |err: serde_json::Error| ServerError::Validation(err.to_string());
    active.conversion_rate = ActiveValue::Set(fields.conversion_rate);
    active.theme = ActiveValue::Set(fields.theme.as_str().to_string());
    active.autosave_mode = ActiveValue::Set(fields.autosave_mode.as_str().to_string());
    active.include_annual_in_monthly = ActiveValue::Set(fields.include_annual_in_monthly);
    active.lock_flag = ActiveValue::Set(fields.lock_flag);
    active.column_order = ActiveValue::Set(serde_json::to_string(&fields.column_order).map_err(encode)?);
    active.known_years = ActiveValue::Set(serde_json::to_string(&fields.known_years).map_err(encode)?);
    Ok(())
}

/// `GET /settings/{owner}`
pub async fn get(
    Extension(user): Extension<owner::Model>,
    State(state): State<ServerState>,
    Path(owner): Path<String>,
) -> Result<Json<SettingsFields>, ServerError> {
    ensure_owner(&user, &owner)?;
    let row = Entity::find_by_id(owner.clone())
        .one(&state.db)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("no settings for {owner}")))?;
    Ok(Json(row.fields()?))
}

/// `PUT /settings/{owner}`
pub async fn put(
    Extension(user): Extension<owner::Model>,
    State(state): State<ServerState>,
    Path(owner): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<StatusCode, ServerError> {
    ensure_owner(&user, &owner)?;
    let fields: SettingsFields =
        serde_json::from_value(payload).map_err(|err| ServerError::Validation(err.to_string()))?;
    validate::settings(&fields)?;

    match Entity::find_by_id(owner.clone()).one(&state.db).await? {
        Some(row) => {
            let mut active = row.into_active_model();
            apply(&mut active, &fields)?;
            active.update(&state.db).await?;
        }
        None => {
            let mut active = ActiveModel {
                owner_id: ActiveValue::Set(owner.clone()),
                ..Default::default()
            };
            apply(&mut active, &fields)?;
            Entity::insert(active).exec(&state.db).await?;
        }
    }

    tracing::debug!(%owner, "settings stored");
    Ok(StatusCode::NO_CONTENT)
}

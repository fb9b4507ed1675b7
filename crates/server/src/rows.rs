//! Row endpoints shared by the personal, business and income tables.

use api_types::{RemoteId, RowCreated, Table, expense::ExpenseFields, income::IncomeFields};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{ServerError, expense, income, owner, server::ServerState, validate};

fn row_table(raw: &str) -> Result<Table, ServerError> {
    match raw.parse::<Table>() {
        Ok(Table::Settings) | Err(_) => Err(ServerError::NotFound(format!("unknown table {raw}"))),
        Ok(table) => Ok(table),
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ServerError> {
    serde_json::from_value(payload).map_err(|err| ServerError::Validation(err.to_string()))
}

pub(crate) fn ensure_owner(user: &owner::Model, owner: &str) -> Result<(), ServerError> {
    if user.username != owner {
        return Err(ServerError::Forbidden(format!(
            "{} cannot access rows of {owner}",
            user.username
        )));
    }
    Ok(())
}

/// `GET /tables/{table}/{owner}`
pub async fn list(
    Extension(user): Extension<owner::Model>,
    State(state): State<ServerState>,
    Path((table, owner)): Path<(String, String)>,
) -> Result<Response, ServerError> {
    let table = row_table(&table)?;
    ensure_owner(&user, &owner)?;

    if table == Table::Income {
        let rows = income::Entity::find()
            .filter(income::Column::OwnerId.eq(owner))
            .order_by_asc(income::Column::SortOrder)
            .order_by_asc(income::Column::Id)
            .all(&state.db)
            .await?
            .iter()
            .map(income::Model::remote_row)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Json(rows).into_response());
    }

    let rows = expense::Entity::find()
        .filter(expense::Column::OwnerId.eq(owner))
        .filter(expense::Column::Book.eq(table.as_str()))
        .order_by_asc(expense::Column::SortOrder)
        .order_by_asc(expense::Column::Id)
        .all(&state.db)
        .await?
        .iter()
        .map(expense::Model::remote_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(rows).into_response())
}

/// `POST /tables/{table}`
pub async fn insert(
    Extension(user): Extension<owner::Model>,
    State(state): State<ServerState>,
    Path(table): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<RowCreated>), ServerError> {
    let table = row_table(&table)?;

    let id = if table == Table::Income {
        let fields: IncomeFields = decode(payload)?;
        validate::income(&fields)?;
        let row = income::new_row(&user.username, &fields)?;
        income::Entity::insert(row).exec(&state.db).await?.last_insert_id
    } else {
        let fields: ExpenseFields = decode(payload)?;
        validate::expense(&fields)?;
        let row = expense::new_row(&user.username, table, &fields);
        expense::Entity::insert(row).exec(&state.db).await?.last_insert_id
    };

    tracing::debug!(%table, owner = %user.username, id, "row inserted");
    Ok((StatusCode::CREATED, Json(RowCreated { id: RemoteId(id) })))
}

/// `PUT /tables/{table}/{id}`
pub async fn update(
    Extension(user): Extension<owner::Model>,
    State(state): State<ServerState>,
    Path((table, id)): Path<(String, i64)>,
    Json(payload): Json<Value>,
) -> Result<StatusCode, ServerError> {
    let table = row_table(&table)?;
    let missing = || ServerError::NotFound(format!("{table} row {id} not found"));

    if table == Table::Income {
        let fields: IncomeFields = decode(payload)?;
        validate::income(&fields)?;
        let row = income::Entity::find_by_id(id)
            .filter(income::Column::OwnerId.eq(user.username.as_str()))
            .one(&state.db)
            .await?
            .ok_or_else(missing)?;
        let mut active = row.into_active_model();
        income::apply(&mut active, &fields)?;
        active.update(&state.db).await?;
    } else {
        let fields: ExpenseFields = decode(payload)?;
        validate::expense(&fields)?;
        let row = expense::Entity::find_by_id(id)
            .filter(expense::Column::OwnerId.eq(user.username.as_str()))
            .filter(expense::Column::Book.eq(table.as_str()))
            .one(&state.db)
            .await?
            .ok_or_else(missing)?;
        let mut active = row.into_active_model();
        expense::apply(&mut active, &fields);
        active.update(&state.db).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /tables/{table}/{id}`
pub async fn delete(
    Extension(user): Extension<owner::Model>,
    State(state): State<ServerState>,
    Path((table, id)): Path<(String, i64)>,
) -> Result<StatusCode, ServerError> {
    let table = row_table(&table)?;

    let deleted = if table == Table::Income {
        income::Entity::delete_many()
            .filter(income::Column::Id.eq(id))
            .filter(income::Column::OwnerId.eq(user.username.as_str()))
            .exec(&state.db)
            .await?
            .rows_affected
    } else {
        expense::Entity::delete_many()
            .filter(expense::Column::Id.eq(id))
            .filter(expense::Column::OwnerId.eq(user.username.as_str()))
            .filter(expense::Column::Book.eq(table.as_str()))
            .exec(&state.db)
            .await?
            .rows_affected
    };

    if deleted == 0 {
        return Err(ServerError::NotFound(format!("{table} row {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

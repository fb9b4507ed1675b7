//! Account identities. The username is the owner id of every row.

use sea_orm::{ActiveValue, QueryOrder, entity::prelude::*};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "owners")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    pub password: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Register an owner; returns `false` if the username is taken.
pub async fn create(db: &DatabaseConnection, username: &str, password: &str) -> Result<bool, DbErr> {
    if Entity::find_by_id(username.to_string())
        .one(db)
        .await?
        .is_some()
    {
        return Ok(false);
    }

    let owner = ActiveModel {
        username: ActiveValue::Set(username.to_string()),
        password: ActiveValue::Set(password.to_string()),
    };
    Entity::insert(owner).exec(db).await?;
    Ok(true)
}

/// Owner matching the credentials, if any.
pub async fn authenticate(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
) -> Result<Option<Model>, DbErr> {
    let owner = Entity::find_by_id(username.to_string()).one(db).await?;
    Ok(owner.filter(|owner| owner.password == password))
}

/// Every registered username, sorted.
pub async fn usernames(db: &DatabaseConnection) -> Result<Vec<String>, DbErr> {
    let owners = Entity::find()
        .order_by_asc(Column::Username)
        .all(db)
        .await?;
    Ok(owners.into_iter().map(|owner| owner.username).collect())
}

//! The tally remote store: a multi-table HTTP service scoped by owner.

use api_types::ErrorResponse;
use axum::{Json, http::StatusCode, response::IntoResponse};
use sea_orm::DbErr;

pub use server::{router, run_with_listener, spawn_with_listener};

mod expense;
mod income;
pub mod owner;
mod rows;
mod server;
mod settings;
mod validate;

#[derive(Debug)]
pub enum ServerError {
    Unauthorized,
    Forbidden(String),
    NotFound(String),
    Validation(String),
    Database(DbErr),
    /// Stored data that no longer decodes.
    Corrupt(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Database(_) | ServerError::Corrupt(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let error = match self {
            ServerError::Unauthorized => "invalid credentials".to_string(),
            ServerError::Database(err) => {
                tracing::error!("database error: {err}");
                "internal server error".to_string()
            }
            ServerError::Corrupt(err) => {
                tracing::error!("corrupt row: {err}");
                "internal server error".to_string()
            }
            ServerError::Forbidden(err)
            | ServerError::NotFound(err)
            | ServerError::Validation(err) => err,
        };

        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<DbErr> for ServerError {
    fn from(value: DbErr) -> Self {
        Self::Database(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_401() {
        let res = ServerError::Unauthorized.into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn forbidden_maps_to_403() {
        let res = ServerError::Forbidden("bob".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn not_found_maps_to_404() {
        let res = ServerError::NotFound("7".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_422() {
        let res = ServerError::Validation("empty name".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn database_maps_to_500() {
        let res = ServerError::from(DbErr::Custom("boom".to_string())).into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

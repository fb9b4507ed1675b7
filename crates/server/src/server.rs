use axum::{
    Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Basic},
};
use sea_orm::DatabaseConnection;

use crate::{ServerError, owner, rows, settings};

#[derive(Clone)]
pub struct ServerState {
    pub db: DatabaseConnection,
}

/// Basic auth against the owners table; the owner goes into the request
/// extensions for the handlers.
async fn auth(
    auth_header: Option<TypedHeader<Authorization<Basic>>>,
    State(state): State<ServerState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let Some(TypedHeader(auth_header)) = auth_header else {
        return Err(ServerError::Unauthorized);
    };
    if auth_header.username().is_empty() || auth_header.password().is_empty() {
        return Err(ServerError::Unauthorized);
    }

    let owner = owner::authenticate(&state.db, auth_header.username(), auth_header.password())
        .await
        .map_err(|err| {
            tracing::warn!("owner lookup failed: {err}");
            ServerError::Unauthorized
        })?
        .ok_or(ServerError::Unauthorized)?;

    request.extensions_mut().insert(owner);
    Ok(next.run(request).await)
}

async fn ping() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// The full service; every route requires credentials.
pub fn router(db: DatabaseConnection) -> Router {
    let state = ServerState { db };
    Router::new()
        .route("/ping", get(ping))
        .route("/tables/{table}", post(rows::insert))
        .route(
            "/tables/{table}/{key}",
            get(rows::list).put(rows::update).delete(rows::delete),
        )
        .route("/settings/{owner}", get(settings::get).put(settings::put))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .with_state(state)
}

pub async fn run_with_listener(
    db: DatabaseConnection,
    listener: tokio::net::TcpListener,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, router(db)).await
}

pub fn spawn_with_listener(
    db: DatabaseConnection,
    listener: tokio::net::TcpListener,
) -> Result<std::net::SocketAddr, std::io::Error> {
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(err) = run_with_listener(db, listener).await {
            tracing::error!("server failed: {err}");
        }
    });

    Ok(addr)
}

//! `RemoteStore` over the tally HTTP API.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use api_types::{
    ErrorResponse, OwnerId, RemoteId, RemoteRow, RowCreated, Table, expense::ExpenseFields,
    income::IncomeFields, settings::SettingsFields,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use super::{RemoteResult, RemoteStore};
use crate::{EngineError, RemoteError, ResultEngine, entity::Row};

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// HTTP client for the remote store, authenticated with Basic auth.
///
/// The username is the owner identity.
#[derive(Debug)]
pub struct HttpRemote {
    base_url: Url,
    http: reqwest::Client,
    timeout: Duration,
    credentials: RwLock<Credentials>,
    reachable: AtomicBool,
}

impl HttpRemote {
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> ResultEngine<Self> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|err| EngineError::InvalidUrl(err.to_string()))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| EngineError::InvalidUrl(err.to_string()))?;

        Ok(Self {
            base_url,
            http,
            timeout,
            credentials: RwLock::new(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            reachable: AtomicBool::new(true),
        })
    }

    /// Swap credentials after the user signed in again.
    pub fn set_credentials(&self, username: &str, password: &str) {
        *self.credentials.write() = Credentials {
            username: username.to_string(),
            password: password.to_string(),
        };
    }

    fn endpoint(&self, path: &str) -> RemoteResult<Url> {
        self.base_url
            .join(path)
            .map_err(|err| RemoteError::Validation(format!("invalid endpoint {path}: {err}")))
    }

    fn row_table(table: Table) -> RemoteResult<Table> {
        match table {
            Table::Settings => Err(RemoteError::Validation(
                "settings is not a row table".to_string(),
            )),
            other => Ok(other),
        }
    }

    /// Send with credentials and map non-2xx answers to `RemoteError`.
    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let credentials = self.credentials.read().clone();
        let res = match request
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
        {
            Ok(res) => res,
            Err(err) => {
                self.reachable.store(false, Ordering::SeqCst);
                return Err(self.transport_error(err));
            }
        };
        self.reachable.store(true, Ordering::SeqCst);

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }

        let body = res
            .json::<ErrorResponse>()
            .await
            .map(|err| err.error)
            .unwrap_or_else(|_| "unknown error".to_string());

        let err = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Auth(body),
            StatusCode::NOT_FOUND => RemoteError::NotFound(body),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                RemoteError::Validation(body)
            }
            _ => RemoteError::Network(format!("{status}: {body}")),
        };
        Err(err)
    }

    fn transport_error(&self, err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(self.timeout)
        } else {
            RemoteError::Network(err.to_string())
        }
    }

    async fn decode<T: DeserializeOwned>(&self, res: Response) -> RemoteResult<T> {
        res.json::<T>().await.map_err(|err| {
            if err.is_decode() {
                RemoteError::Validation(format!("unexpected response shape: {err}"))
            } else {
                self.transport_error(err)
            }
        })
    }
}

fn into_row<T>(row: RemoteRow<T>, wrap: fn(T) -> Row) -> RemoteRow<Row> {
    RemoteRow {
        id: row.id,
        owner_id: row.owner_id,
        created_at: row.created_at,
        fields: wrap(row.fields),
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    fn owner(&self) -> OwnerId {
        OwnerId::new(self.credentials.read().username.clone())
    }

    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> RemoteResult<()> {
        let endpoint = self.endpoint("ping")?;
        self.send(self.http.get(endpoint)).await?;
        Ok(())
    }

    async fn insert(&self, table: Table, row: &Row) -> RemoteResult<RemoteId> {
        let table = Self::row_table(table)?;
        let endpoint = self.endpoint(&format!("tables/{table}"))?;
        let res = self.send(self.http.post(endpoint).json(row)).await?;
        let created: RowCreated = self.decode(res).await?;
        Ok(created.id)
    }

    async fn update(&self, table: Table, id: RemoteId, row: &Row) -> RemoteResult<()> {
        let table = Self::row_table(table)?;
        let endpoint = self.endpoint(&format!("tables/{table}/{id}"))?;
        self.send(self.http.put(endpoint).json(row)).await?;
        Ok(())
    }

    async fn delete(&self, table: Table, id: RemoteId) -> RemoteResult<()> {
        let table = Self::row_table(table)?;
        let endpoint = self.endpoint(&format!("tables/{table}/{id}"))?;
        self.send(self.http.delete(endpoint)).await?;
        Ok(())
    }

    async fn list(&self, table: Table, owner: &OwnerId) -> RemoteResult<Vec<RemoteRow<Row>>> {
        let table = Self::row_table(table)?;
        let endpoint = self.endpoint(&format!("tables/{table}/{owner}"))?;
        let res = self.send(self.http.get(endpoint)).await?;

        let rows = match table {
            Table::Income => self
                .decode::<Vec<RemoteRow<IncomeFields>>>(res)
                .await?
                .into_iter()
                .map(|row| into_row(row, Row::Income))
                .collect(),
            _ => self
                .decode::<Vec<RemoteRow<ExpenseFields>>>(res)
                .await?
                .into_iter()
                .map(|row| into_row(row, Row::Expense))
                .collect(),
        };
        Ok(rows)
    }

    async fn upsert_by_owner(
        &self,
        owner: &OwnerId,
        settings: &SettingsFields,
    ) -> RemoteResult<()> {
        let endpoint = self.endpoint(&format!("settings/{owner}"))?;
        self.send(self.http.put(endpoint).json(settings)).await?;
        Ok(())
    }

    async fn fetch_settings(&self, owner: &OwnerId) -> RemoteResult<Option<SettingsFields>> {
        let endpoint = self.endpoint(&format!("settings/{owner}"))?;
        match self.send(self.http.get(endpoint)).await {
            Ok(res) => Ok(Some(self.decode(res).await?)),
            Err(RemoteError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let remote = HttpRemote::new(
            "http://127.0.0.1:3000/api",
            "alice",
            "secret",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            remote.endpoint("tables/personal").unwrap().as_str(),
            "http://127.0.0.1:3000/api/tables/personal"
        );
        assert_eq!(remote.owner(), OwnerId::new("alice"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = HttpRemote::new("not a url", "a", "b", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidUrl(_)));
    }
}

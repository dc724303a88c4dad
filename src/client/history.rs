use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::protocol::{Message, User};

use super::ClientError;

/// Read-only queries against the relay's HTTP surface.
#[derive(Debug, Clone)]
pub struct HistoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HistoryClient {
    /// `base_url` is the relay root, e.g. `http://localhost:5000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    pub async fn before(
        &self,
        before: Option<OffsetDateTime>,
        limit: Option<usize>,
    ) -> Result<Vec<Message>, ClientError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }
        if let Some(before) = before {
            query.push(("before", before.format(&Rfc3339)?));
        }
        self.get("/messages", &query).await
    }

    pub async fn search(&self, q: &str) -> Result<Vec<Message>, ClientError> {
        self.get("/messages/search", &[("q", q.to_owned())]).await
    }

    pub async fn users(&self) -> Result<Vec<User>, ClientError> {
        self.get("/users", &[]).await
    }

    async fn get<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

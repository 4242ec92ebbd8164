//! HTTP remote source.
//!
//! Talks to the query API of the analytics server:
//! - `GET  {base}/api/queries?page=N&page_size=M` lists queries
//! - `POST {base}/api/queries/{id}` with `{"query": ...}` replaces a body
//!
//! Every request carries `Authorization: Key <api key>`.

use serde::{Deserialize, Serialize};

use crate::model::{QueryId, RemoteQuery};

use super::source::{RemoteError, RemoteResult, RemoteSource};

/// Maximum number of response-body characters kept in error messages.
const ERROR_BODY_LIMIT: usize = 300;

/// Remote source backed by the server's REST API.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRemote {
    /// Create a client for `base_url` authenticating with `api_key`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Base URL with any trailing slash removed.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }

    fn queries_url(&self) -> String {
        format!("{}/api/queries", self.base_url)
    }

    fn query_url(&self, id: &QueryId) -> String {
        format!("{}/api/queries/{id}", self.base_url)
    }
}

/// One page of the list endpoint.
#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// Body of the update request.
#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    query: &'a str,
}

async fn check_status(
    response: reqwest::Response,
    operation: &'static str,
    url: &str,
) -> RemoteResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::Status {
        operation,
        url: url.to_string(),
        status: status.as_u16(),
        body: body.chars().take(ERROR_BODY_LIMIT).collect(),
    })
}

fn request_err(url: &str) -> impl FnOnce(reqwest::Error) -> RemoteError + '_ {
    move |e| RemoteError::Request {
        url: url.to_string(),
        message: e.to_string(),
    }
}

fn decode_err(url: &str) -> impl FnOnce(reqwest::Error) -> RemoteError + '_ {
    move |e| RemoteError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    }
}

impl RemoteSource for HttpRemote {
    async fn fetch_page(
        &self,
        page: usize,
        page_size: usize,
    ) -> RemoteResult<Vec<serde_json::Value>> {
        let url = self.queries_url();

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[("page", page), ("page_size", page_size)])
            .send()
            .await
            .map_err(request_err(&url))?;

        let response = check_status(response, "Listing queries", &url).await?;
        let data: QueryPage = response.json().await.map_err(decode_err(&url))?;

        Ok(data.results)
    }

    async fn update(&self, id: &QueryId, body: &str) -> RemoteResult<RemoteQuery> {
        let url = self.query_url(id);

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&UpdateRequest { query: body })
            .send()
            .await
            .map_err(request_err(&url))?;

        let response = check_status(response, "Updating query", &url).await?;
        response.json().await.map_err(decode_err(&url))
    }
}

//! Typed client for the REIMS backend REST API.

mod endpoints;
pub mod models;

use std::io;
use std::path::PathBuf;

use reqwest::multipart::Form;
use reqwest::{RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::config::ApiSettings;
use crate::query::QueryError;

pub use endpoints::keys;

/// Fields checked, in order, for an application error message.
const ERROR_FIELDS: [&str; 3] = ["error", "detail", "message"];

/// Errors raised while building an [`ApiClient`].
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Failed to read token from {path}: {source}")]
    Token {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// JSON-over-HTTP client for the REIMS backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    /// Creates a client without authentication and with reqwest's default timeouts.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: parse_base(base_url)?,
            token: None,
        })
    }

    /// Creates a client from the `api` configuration section.
    ///
    /// An inline token wins over `token_path`.
    pub async fn from_settings(settings: &ApiSettings) -> Result<Self, ApiError> {
        let token = match (&settings.token, &settings.token_path) {
            (Some(token), _) => Some(token.clone()),
            (None, Some(path)) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ApiError::Token {
                        path: path.clone(),
                        source,
                    })?;
                Some(raw.trim().to_string())
            }
            (None, None) => None,
        };

        let client = reqwest::Client::builder().timeout(settings.timeout()).build()?;

        Ok(Self {
            client,
            base_url: parse_base(&settings.base_url)?,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, QueryError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| QueryError::FetchError(format!("invalid path {path}: {e}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a GET request and decodes the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, QueryError> {
        let url = self.url(path)?;
        tracing::debug!(%url, "GET");
        let mut request = self.client.get(url);
        if !query.is_empty() {
            request = request.query(query);
        }
        send(self.authorize(request)).await
    }

    /// Sends a POST request with a JSON body and decodes the JSON response.
    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, QueryError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path)?;
        tracing::debug!(%url, "POST");
        send(self.authorize(self.client.post(url).json(body))).await
    }

    /// Sends a multipart POST request and decodes the JSON response.
    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> Result<T, QueryError> {
        let url = self.url(path)?;
        tracing::debug!(%url, "POST multipart");
        send(self.authorize(self.client.post(url).multipart(form))).await
    }
}

fn parse_base(raw: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, QueryError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify(status, &body));
    }

    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Maps a non-2xx response to an application or HTTP error.
pub(crate) fn classify(status: StatusCode, body: &str) -> QueryError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ERROR_FIELDS
            .iter()
            .find_map(|field| json.get(field).and_then(Value::as_str).map(str::to_string))
    });

    match message {
        Some(message) => QueryError::Application {
            status: status.as_u16(),
            message,
        },
        None => QueryError::Http {
            status: status.as_u16(),
            message: status.canonical_reason().unwrap_or("unknown status").to_string(),
        },
    }
}

//! HTTP remote store over a REST document API.
//!
//! Wire contract: `GET /{collection}` (filter clauses as query pairs)
//! returns a JSON array of documents, `GET|PUT|DELETE /{collection}/{id}`
//! operate on one document. A document is `{"id": ..., "fields": {...}}`.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use caresync_common::{Error, Result};

use crate::provider::{Document, QueryFilter, RemoteStore};

/// Characters escaped when an id or collection name lands in a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Configuration for the HTTP remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRemoteConfig {
    /// Base URL of the document API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Optional bearer token attached to every request.
    #[serde(default)]
    pub bearer_token: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpRemoteConfig {
    /// Create a config with default timeout and no token.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            bearer_token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Remote store backed by a REST document API.
pub struct HttpRemote {
    http: Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl HttpRemote {
    /// Create a new HTTP remote store.
    ///
    /// # Errors
    /// - Invalid base URL
    pub fn new(config: HttpRemoteConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid base url: {}", e)))?;

        let http = Client::builder()
            .user_agent("CareSync/0.1")
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url,
            bearer_token: config.bearer_token,
        })
    }

    fn url_for(&self, collection: &str, id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.as_str().trim_end_matches('/').to_string();
        url.push('/');
        url.push_str(&encode_segment(collection));
        if let Some(id) = id {
            url.push('/');
            url.push_str(&encode_segment(id));
        }
        Url::parse(&url).map_err(|e| Error::InvalidInput(format!("Invalid request url: {}", e)))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.header(header::AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }
}

fn send_err(context: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{}: {}", context, e))
    } else {
        Error::Network(format!("{}: {}", context, e))
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::PAYMENT_REQUIRED
        | StatusCode::TOO_MANY_REQUESTS => {
            Error::QuotaOrPermission(format!("HTTP {}: {}", status, body))
        }
        s if s.is_server_error() => Error::Network(format!("HTTP {}: {}", s, body)),
        s => Error::InvalidInput(format!("HTTP {}: {}", s, body)),
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_all(&self, collection: &str, filter: &QueryFilter) -> Result<Vec<Document>> {
        let url = self.url_for(collection, None)?;
        debug!("GET {}", url);

        let response = self
            .authorize(self.http.get(url))
            .query(filter.clauses())
            .send()
            .await
            .map_err(|e| send_err("fetch_all", e))?;

        Self::check_status(response)
            .await?
            .json::<Vec<Document>>()
            .await
            .map_err(|e| Error::Deserialization(format!("fetch_all {}: {}", collection, e)))
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = self.url_for(collection, Some(id))?;
        debug!("GET {}", url);

        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| send_err("get", e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let doc = Self::check_status(response)
            .await?
            .json::<Document>()
            .await
            .map_err(|e| Error::Deserialization(format!("get {}/{}: {}", collection, id, e)))?;
        Ok(Some(doc))
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<Document> {
        let url = self.url_for(collection, Some(id))?;
        debug!("PUT {}", url);

        let response = self
            .authorize(self.http.put(url))
            .json(&doc)
            .send()
            .await
            .map_err(|e| send_err("set", e))?;

        Self::check_status(response)
            .await?
            .json::<Document>()
            .await
            .map_err(|e| Error::Deserialization(format!("set {}/{}: {}", collection, id, e)))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let url = self.url_for(collection, Some(id))?;
        debug!("DELETE {}", url);

        let response = self
            .authorize(self.http.delete(url))
            .send()
            .await
            .map_err(|e| send_err("delete", e))?;

        // An already-absent document is a successful delete.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }

        Self::check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(base: &str) -> HttpRemote {
        HttpRemote::new(HttpRemoteConfig::new(base)).unwrap()
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(HttpRemote::new(HttpRemoteConfig::new("not a url")).is_err());
    }

    #[test]
    fn test_url_building() {
        let remote = remote("https://api.example.com/v1/");
        let url = remote.url_for("notifications", None).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v1/notifications");

        let url = remote.url_for("notifications", Some("abc-123")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/notifications/abc-123"
        );
    }

    #[test]
    fn test_url_building_escapes_segments() {
        let remote = remote("https://api.example.com");
        let url = remote
            .url_for("client_history", Some("odd id/with#chars"))
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/client_history/odd%20id%2Fwith%23chars"
        );
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, ""),
            Error::QuotaOrPermission(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            Error::QuotaOrPermission(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            Error::Network(_)
        ));
        assert!(matches!(
            status_error(StatusCode::UNPROCESSABLE_ENTITY, ""),
            Error::InvalidInput(_)
        ));
    }
}

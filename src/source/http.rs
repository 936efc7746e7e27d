use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::Uri;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

use crate::config::SourceConfig;
use crate::error::{Result, SyncError};
use crate::model::{Direction, FetchRequest, LogRecord};
use crate::source::LogSource;

/// Reads logs from a master's REST API.
///
/// Master logs live at `GET {base}/logs`, trial logs at
/// `GET {base}/trials/{id}/logs`. Forward polls send
/// `greater_than_id=X&limit=N`; history pages send `less_than_id=X&tail=N`,
/// and the initial load sends only `tail=N`. The body is a JSON array of
/// records.
#[derive(Clone)]
pub struct HttpLogSource {
    base_url: String,
    client: Client<HttpConnector, Empty<Bytes>>,
    timeout: Duration,
}

impl HttpLogSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        let uri = base_url.parse::<Uri>().map_err(|e| SyncError::InvalidUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;
        if uri.scheme_str() != Some("http") {
            return Err(SyncError::InvalidUrl {
                url: base_url,
                reason: "only http:// URLs are supported".into(),
            });
        }

        let client = Client::builder(TokioExecutor::new()).build_http();
        Ok(HttpLogSource {
            base_url,
            client,
            timeout: config.request_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URI for a request, query string included.
    pub fn request_uri(&self, request: &FetchRequest) -> Result<Uri> {
        let url = format!(
            "{}{}?{}",
            self.base_url,
            request.scope.path(),
            query_string(request)
        );
        match url.parse::<Uri>() {
            Ok(uri) => Ok(uri),
            Err(e) => Err(SyncError::InvalidUrl {
                reason: e.to_string(),
                url,
            }),
        }
    }

    fn timeout_error(&self) -> SyncError {
        SyncError::Timeout {
            millis: self.timeout.as_millis() as u64,
        }
    }
}

fn query_string(request: &FetchRequest) -> String {
    match (request.direction, request.anchor) {
        (Direction::Older, Some(anchor)) => {
            format!("less_than_id={}&tail={}", anchor, request.page_size)
        }
        (Direction::Older, None) => format!("tail={}", request.page_size),
        (Direction::Newer, Some(anchor)) => {
            format!("greater_than_id={}&limit={}", anchor, request.page_size)
        }
        (Direction::Newer, None) => format!("limit={}", request.page_size),
    }
}

impl LogSource for HttpLogSource {
    async fn fetch(&self, request: FetchRequest) -> Result<Vec<LogRecord>> {
        let uri = self.request_uri(&request)?;
        debug!(%uri, "fetching logs");

        let response = timeout(self.timeout, self.client.get(uri))
            .await
            .map_err(|_| self.timeout_error())??;
        let status = response.status();
        let body = timeout(self.timeout, response.into_body().collect())
            .await
            .map_err(|_| self.timeout_error())??
            .to_bytes();

        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let records: Vec<LogRecord> = serde_json::from_slice(&body)?;
        debug!(status = status.as_u16(), count = records.len(), "fetched logs");
        Ok(records)
    }
}

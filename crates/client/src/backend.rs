// Repository backend client.
//
// `Backend` is the seam the flush protocol and editor talk through; tests
// inject mocks, production uses `HttpBackend` over reqwest.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use reposync_common::protocol::backend::{
    file_route, offline_commit_route, FileBody, OfflineCommitRequest, OfflineCommitResponse,
    REPOS_ROUTE,
};

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Could not reach the backend (connection refused, DNS, timeout).
    Network { message: String },
    /// The backend answered with a non-success status.
    Status { status: u16, body: String },
    /// The backend answered, but the body was not what we expected.
    Decode { message: String },
    InvalidEndpoint { url: String, message: String },
}

impl BackendError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// True when the request never got an answer from the server.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// True for 4xx answers: the server saw the request and refused it.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Status { status, .. } if (400..500).contains(status))
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network { message } => write!(f, "backend unreachable: {message}"),
            Self::Status { status, body } if body.is_empty() => {
                write!(f, "backend returned HTTP {status}")
            }
            Self::Status { status, body } => write!(f, "backend returned HTTP {status}: {body}"),
            Self::Decode { message } => write!(f, "unexpected backend response: {message}"),
            Self::InvalidEndpoint { url, message } => {
                write!(f, "invalid backend endpoint `{url}`: {message}")
            }
        }
    }
}

impl std::error::Error for BackendError {}

impl From<reqwest::Error> for BackendError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Decode { message: error.to_string() }
        } else if let Some(status) = error.status() {
            Self::Status { status: status.as_u16(), body: String::new() }
        } else {
            Self::Network { message: error.to_string() }
        }
    }
}

// ── Backend trait ──────────────────────────────────────────────────

/// Operations the offline pipeline needs from the repository backend.
///
/// All methods return `Send` futures so flushes can run on a
/// multi-threaded runtime.
pub trait Backend: Send + Sync + 'static {
    /// Write one file's full content.
    fn put_file(
        &self,
        repo_id: &str,
        body: &FileBody,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Apply several files as one commit.
    fn offline_commit(
        &self,
        repo_id: &str,
        request: &OfflineCommitRequest,
    ) -> impl Future<Output = Result<OfflineCommitResponse, BackendError>> + Send;

    /// Fetch one file's current content.
    fn get_file(
        &self,
        repo_id: &str,
        path: &str,
    ) -> impl Future<Output = Result<FileBody, BackendError>> + Send;

    /// Reachability check. Any answer from the server counts as reachable.
    fn ping(&self) -> impl Future<Output = Result<(), BackendError>> + Send;
}

// ── Endpoint ───────────────────────────────────────────────────────

/// Shared, replaceable backend base URL.
#[derive(Debug, Clone)]
pub struct Endpoint {
    url: Arc<RwLock<Url>>,
}

impl Endpoint {
    pub fn new(base: &str) -> Result<Self, BackendError> {
        Ok(Self { url: Arc::new(RwLock::new(parse_base_url(base)?)) })
    }

    /// Replace the base URL for every subsequent request.
    pub fn set(&self, base: &str) -> Result<(), BackendError> {
        let parsed = parse_base_url(base)?;
        let mut guard = self.url.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = parsed;
        Ok(())
    }

    pub fn get(&self) -> Url {
        self.url.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    fn join(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.get();
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|()| BackendError::InvalidEndpoint {
                url: base,
                message: "URL cannot carry a path".into(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn parse_base_url(base: &str) -> Result<Url, BackendError> {
    let url = Url::parse(base).map_err(|error| BackendError::InvalidEndpoint {
        url: base.to_string(),
        message: error.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(BackendError::InvalidEndpoint {
            url: base.to_string(),
            message: format!("unsupported scheme `{other}`"),
        }),
    }
}

// ── HTTP implementation ────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: Endpoint,
}

impl HttpBackend {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| BackendError::network(error.to_string()))?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Backend for HttpBackend {
    async fn put_file(&self, repo_id: &str, body: &FileBody) -> Result<(), BackendError> {
        let url = self.endpoint.join(&file_route(repo_id))?;
        debug!(%url, path = %body.path, "PUT file");
        let response = self.client.put(url).json(body).send().await?;
        check_status(response).await?;
        Ok(())
    }

    async fn offline_commit(
        &self,
        repo_id: &str,
        request: &OfflineCommitRequest,
    ) -> Result<OfflineCommitResponse, BackendError> {
        let url = self.endpoint.join(&offline_commit_route(repo_id))?;
        debug!(%url, changes = request.changes.len(), "POST offline commit");
        let response = self.client.post(url).json(request).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<OfflineCommitResponse>().await?)
    }

    async fn get_file(&self, repo_id: &str, path: &str) -> Result<FileBody, BackendError> {
        let mut url = self.endpoint.join(&file_route(repo_id))?;
        url.query_pairs_mut().append_pair("path", path);
        debug!(%url, "GET file");
        let response = self.client.get(url).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<FileBody>().await?)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let url = self.endpoint.join(&[REPOS_ROUTE.trim_start_matches('/')])?;
        // Status is irrelevant; getting any response means the server is up.
        self.client.get(url).send().await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Status { status: status.as_u16(), body })
}

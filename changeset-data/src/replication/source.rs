//! Access to the remote replication feed.
//!
//! [`ReplicationSource`] is synchronous so the orchestrator can stay a plain
//! sequential loop. [`HttpReplicationSource`] bridges to `reqwest` by blocking
//! on a Tokio runtime it owns.

use std::time::Duration;

use changeset_core::{RemoteState, SequenceNumber};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use url::Url;

use super::error::TransportError;

/// Public changeset replication feed.
pub const DEFAULT_REPLICATION_URL: &str = "https://planet.openstreetmap.org/replication/changesets/";

/// Default user agent for feed requests.
pub const DEFAULT_USER_AGENT: &str = "changeset-mirror/0.1";

/// State descriptor path relative to the feed root.
pub const STATE_PATH: &str = "state.yaml";

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const LAST_RUN_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %:z";

/// Read access to a replication feed.
pub trait ReplicationSource {
    /// Feed root, always ending in `/`.
    fn base_url(&self) -> &str;

    /// Fetch and decode the state descriptor.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the descriptor cannot be fetched or
    /// decoded.
    fn fetch_state(&self) -> Result<RemoteState, TransportError>;

    /// Fetch the gzip-compressed diff for `sequence`.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the request fails.
    fn fetch_diff(&self, sequence: SequenceNumber) -> Result<Vec<u8>, TransportError>;

    /// Fetch the directory index at a feed-relative `path` such as `""` or
    /// `"005/"`.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the request fails.
    fn fetch_listing(&self, path: &str) -> Result<String, TransportError>;

    /// Absolute location of a feed-relative path, for logging.
    fn url_for(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }
}

#[derive(Debug, Deserialize)]
struct RawState {
    sequence: u64,
    last_run: String,
}

/// Decode a `state.yaml` descriptor.
///
/// # Errors
/// Returns [`TransportError::InvalidState`] when the document is not YAML,
/// lacks `sequence` or `last_run`, or holds values out of range.
///
/// # Examples
/// ```
/// use changeset_data::replication::parse_remote_state;
///
/// let yaml = "---\nlast_run: 2024-03-01 12:00:03.123456000 +00:00\nsequence: 5912345\n";
/// let state = parse_remote_state(yaml, "state.yaml")?;
/// assert_eq!(state.sequence.get(), 5_912_345);
/// assert_eq!(state.last_run.to_rfc3339(), "2024-03-01T12:00:03.123456+00:00");
/// # Ok::<(), changeset_data::replication::TransportError>(())
/// ```
pub fn parse_remote_state(document: &str, url: &str) -> Result<RemoteState, TransportError> {
    let invalid = |message: String| TransportError::InvalidState {
        url: url.to_owned(),
        message,
    };
    let raw: RawState = serde_yaml::from_str(document).map_err(|err| invalid(err.to_string()))?;
    let sequence = SequenceNumber::try_from(raw.sequence).map_err(|err| invalid(err.to_string()))?;
    let last_run = DateTime::parse_from_str(raw.last_run.trim(), LAST_RUN_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw.last_run.trim()))
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| invalid(format!("last_run {:?}: {err}", raw.last_run)))?;
    Ok(RemoteState { sequence, last_run })
}

/// Ensure the base URL ends with exactly one `/` so relative joins descend
/// into it.
fn sanitise_base_url(url: impl Into<String>) -> String {
    let raw = url.into();
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_REPLICATION_URL.to_owned()
    } else {
        format!("{trimmed}/")
    }
}

/// Configuration for [`HttpReplicationSource`].
#[derive(Debug, Clone)]
pub struct HttpReplicationSourceConfig {
    /// Feed root.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for HttpReplicationSourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REPLICATION_URL.to_owned(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpReplicationSourceConfig {
    /// Create a configuration for the feed rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Replication feed served over HTTP(S).
pub struct HttpReplicationSource {
    client: Client,
    base: Url,
    base_text: String,
    timeout: Duration,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpReplicationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReplicationSource")
            .field("client", &self.client)
            .field("base", &self.base_text)
            .field("timeout", &self.timeout)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpReplicationSource {
    /// Create a source with default configuration.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client or runtime
    /// fails to build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::with_config(HttpReplicationSourceConfig::new(base_url))
    }

    /// Create a source with explicit configuration.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client or runtime
    /// fails to build.
    pub fn with_config(config: HttpReplicationSourceConfig) -> Result<Self, TransportError> {
        let base_text = sanitise_base_url(config.base_url);
        let base = Url::parse(&base_text).map_err(|source| TransportError::InvalidUrl {
            base: base_text.clone(),
            path: String::new(),
            source,
        })?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|source| TransportError::Client { source })?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| TransportError::Runtime { source })?;
        Ok(Self {
            client,
            base,
            base_text,
            timeout: config.timeout,
            runtime,
        })
    }

    fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|source| TransportError::InvalidUrl {
                base: self.base_text.clone(),
                path: path.to_owned(),
                source,
            })
    }

    fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }

    async fn get(&self, url: &Url) -> Result<reqwest::Response, TransportError> {
        self.client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url.as_str()))?
            .error_for_status()
            .map_err(|err| self.convert_reqwest_error(&err, url.as_str()))
    }

    async fn get_text(&self, url: Url) -> Result<String, TransportError> {
        let response = self.get(&url).await?;
        response
            .text()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url.as_str()))
    }

    async fn get_bytes(&self, url: Url) -> Result<Vec<u8>, TransportError> {
        let response = self.get(&url).await?;
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| self.convert_reqwest_error(&err, url.as_str()))
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> TransportError {
        if error.is_timeout() {
            return TransportError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return TransportError::Http {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        TransportError::Network {
            url: url.to_owned(),
            source: std::io::Error::other(error.to_string()),
        }
    }
}

impl ReplicationSource for HttpReplicationSource {
    fn base_url(&self) -> &str {
        &self.base_text
    }

    fn fetch_state(&self) -> Result<RemoteState, TransportError> {
        let url = self.resolve(STATE_PATH)?;
        let document = self.block_on(self.get_text(url.clone()))?;
        parse_remote_state(&document, url.as_str())
    }

    fn fetch_diff(&self, sequence: SequenceNumber) -> Result<Vec<u8>, TransportError> {
        let url = self.resolve(&sequence.diff_path())?;
        self.block_on(self.get_bytes(url))
    }

    fn fetch_listing(&self, path: &str) -> Result<String, TransportError> {
        let url = self.resolve(path)?;
        self.block_on(self.get_text(url))
    }
}

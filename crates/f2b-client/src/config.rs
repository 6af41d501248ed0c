use std::str::FromStr;
use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_STREAM_BUFFER_CAPACITY: usize = 128;

/// Connection settings for the code-generation backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the backend (scheme, host, optional prefix).
    pub base_url: String,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Optional whole-request timeout.
    ///
    /// Unset by default: a generation stream stays open for minutes.
    pub request_timeout: Option<Duration>,
    /// Bounded chunk buffer between the transport reader and the session.
    pub stream_buffer_capacity: usize,
    /// Honour `HTTP_PROXY` / `HTTPS_PROXY` from the environment.
    pub use_system_proxy: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl ClientConfig {
    /// Creates a config pointing at `base_url` with default knobs.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: None,
            stream_buffer_capacity: DEFAULT_STREAM_BUFFER_CAPACITY,
            use_system_proxy: true,
        }
    }

    /// Builds a config from the environment.
    ///
    /// - `F2B_API_URL`: base URL (default `http://localhost:8000`).
    /// - `F2B_CONNECT_TIMEOUT_SECS`: connect timeout in seconds (default 10).
    /// - `F2B_REQUEST_TIMEOUT_SECS`: optional whole-request timeout in seconds.
    /// - `F2B_STREAM_BUFFER`: delivery buffer capacity (default 128).
    /// - `F2B_NO_PROXY`: set to `1`/`true` to ignore system proxies.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::new(
            read_env::<String>("F2B_API_URL")?
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        );
        if let Some(secs) = read_env::<u64>("F2B_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_env::<u64>("F2B_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(capacity) = read_env::<usize>("F2B_STREAM_BUFFER")? {
            config.stream_buffer_capacity = capacity;
        }
        if let Some(no_proxy) = read_env::<String>("F2B_NO_PROXY")? {
            config.use_system_proxy = !matches!(
                no_proxy.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets a whole-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Overrides the delivery buffer capacity.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    /// Disables proxy discovery from the environment.
    pub fn without_system_proxy(mut self) -> Self {
        self.use_system_proxy = false;
        self
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https://, got `{base}`"
            )));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn stream_url(&self) -> String {
        self.endpoint("stream-code-gen")
    }

    pub(crate) fn fetch_zip_url(&self) -> String {
        self.endpoint("fetch-zip")
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client, ClientError> {
        let mut builder = reqwest::Client::builder().connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.request_timeout {
            builder = builder.timeout(timeout);
        }
        if !self.use_system_proxy {
            builder = builder.no_proxy();
        }
        builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim().trim_end_matches('/'))
    }
}

fn read_env<T: FromStr>(key: &str) -> Result<Option<T>, ClientError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ClientError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

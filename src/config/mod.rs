//! Configuration types for the OFSC client.

use crate::auth::Credentials;
use crate::errors::{OfscError, OfscErrorKind};
use std::time::Duration;

/// Default backend host; instances live at `https://{instance}.{host}`.
pub const DEFAULT_HOST: &str = "fs.ocs.oraclecloud.com";

/// Core API path prefix.
pub const CORE_API_PATH: &str = "/rest/ofscCore/v1";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Environment variable holding the client ID.
pub const ENV_CLIENT_ID: &str = "OFSC_CLIENT_ID";
/// Environment variable holding the client secret.
pub const ENV_CLIENT_SECRET: &str = "OFSC_CLIENT_SECRET";
/// Environment variable holding the instance name.
pub const ENV_INSTANCE: &str = "OFSC_INSTANCE";
/// Optional environment variable overriding the base URL.
pub const ENV_BASE_URL: &str = "OFSC_BASE_URL";

/// Retry configuration for rate-limited responses.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries allowed after the first 429.
    pub max_retries: u32,
    /// Backoff used for the first retry when no Retry-After is sent.
    pub initial_backoff: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

/// Preemptive page-fetch throttle.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Every n-th page fetch of a collection pass pauses first. Zero disables.
    pub pause_every_pages: u32,
    /// Length of the pause.
    pub pause: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            pause_every_pages: 20,
            pause: Duration::from_secs(10),
        }
    }
}

/// Batched mutation configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Entities per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches.
    pub cooldown: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            cooldown: Duration::from_secs(10),
        }
    }
}

/// Page sizes requested per collection.
#[derive(Debug, Clone)]
pub struct PageSizes {
    /// Resources and users.
    pub resources: u32,
    /// Activities.
    pub activities: u32,
    /// Work zones.
    pub work_zones: u32,
}

impl Default for PageSizes {
    fn default() -> Self {
        Self {
            resources: 100,
            activities: 1000,
            work_zones: 100,
        }
    }
}

/// OFSC client configuration.
#[derive(Debug, Clone)]
pub struct OfscConfig {
    /// Client credentials.
    pub credentials: Credentials,
    /// Backend host suffix.
    pub host: String,
    /// Explicit base URL, replacing `https://{instance}.{host}`.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Retry configuration.
    pub retry: RetryConfig,
    /// Page-fetch throttle.
    pub throttle: ThrottleConfig,
    /// Batch configuration.
    pub batch: BatchConfig,
    /// Page sizes.
    pub page_sizes: PageSizes,
}

impl OfscConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> OfscConfigBuilder {
        OfscConfigBuilder::new()
    }

    /// Builds a configuration from `OFSC_*` environment variables.
    pub fn from_env() -> Result<Self, OfscError> {
        let var = |name: &str| {
            std::env::var(name).map_err(|_| {
                OfscError::new(
                    OfscErrorKind::MissingCredentials,
                    format!("Environment variable {} not set", name),
                )
            })
        };

        let mut builder = Self::builder().credentials(Credentials::new(
            var(ENV_CLIENT_ID)?,
            var(ENV_CLIENT_SECRET)?,
            var(ENV_INSTANCE)?,
        ));

        if let Ok(base_url) = std::env::var(ENV_BASE_URL) {
            builder = builder.base_url(base_url);
        }

        builder.build()
    }

    /// Instance base URL without trailing slash.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}.{}", self.credentials.instance, self.host),
        }
    }

    /// Core API base URL.
    pub fn core_url(&self) -> String {
        format!("{}{}", self.base_url(), CORE_API_PATH)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), OfscError> {
        if self.credentials.client_id.is_empty() {
            return Err(OfscError::new(
                OfscErrorKind::MissingCredentials,
                "Client ID cannot be empty",
            ));
        }

        if self.credentials.instance.is_empty() {
            return Err(OfscError::configuration("Instance name cannot be empty"));
        }

        if let Some(ref url) = self.base_url {
            let parsed = url::Url::parse(url)
                .map_err(|e| OfscError::configuration(format!("Invalid base URL: {}", e)))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(OfscError::configuration(
                    "Base URL must start with http:// or https://",
                ));
            }
        } else if self.host.is_empty() {
            return Err(OfscError::configuration("Host cannot be empty"));
        }

        if self.batch.batch_size == 0 {
            return Err(OfscError::configuration("Batch size must be positive"));
        }

        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(OfscError::configuration(
                "Backoff multiplier must be a finite number of at least 1.0",
            ));
        }

        let sizes = &self.page_sizes;
        if sizes.resources == 0 || sizes.activities == 0 || sizes.work_zones == 0 {
            return Err(OfscError::configuration("Page sizes must be positive"));
        }

        Ok(())
    }
}

/// Builder for OfscConfig.
#[derive(Debug, Default)]
pub struct OfscConfigBuilder {
    credentials: Option<Credentials>,
    host: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    retry: Option<RetryConfig>,
    throttle: Option<ThrottleConfig>,
    batch: Option<BatchConfig>,
    page_sizes: Option<PageSizes>,
}

impl OfscConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the backend host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Overrides the instance base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the retry configuration.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Sets the page-fetch throttle.
    pub fn throttle(mut self, config: ThrottleConfig) -> Self {
        self.throttle = Some(config);
        self
    }

    /// Disables the preemptive page-fetch pause.
    pub fn no_throttle(mut self) -> Self {
        self.throttle = Some(ThrottleConfig {
            pause_every_pages: 0,
            ..Default::default()
        });
        self
    }

    /// Sets the batch configuration.
    pub fn batch(mut self, config: BatchConfig) -> Self {
        self.batch = Some(config);
        self
    }

    /// Sets the page sizes.
    pub fn page_sizes(mut self, sizes: PageSizes) -> Self {
        self.page_sizes = Some(sizes);
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> Result<OfscConfig, OfscError> {
        let credentials = self.credentials.ok_or_else(|| {
            OfscError::new(OfscErrorKind::MissingCredentials, "Credentials are required")
        })?;

        let config = OfscConfig {
            credentials,
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            base_url: self.base_url,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            retry: self.retry.unwrap_or_default(),
            throttle: self.throttle.unwrap_or_default(),
            batch: self.batch.unwrap_or_default(),
            page_sizes: self.page_sizes.unwrap_or_default(),
        };

        config.validate()?;
        Ok(config)
    }
}

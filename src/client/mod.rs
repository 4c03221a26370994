//! OFSC API client implementation.

use crate::auth::{AccessToken, Credentials, OAuthTokenProvider, TokenProvider};
use crate::batch::BatchMutator;
use crate::config::{OfscConfig, OfscConfigBuilder};
use crate::errors::OfscResult;
use crate::observability::{Metrics, ProgressReporter, TracingProgress};
use crate::pagination::PaginatedCollector;
use crate::resilience::{ApiCall, Authorized, ResilientRequester};
use crate::services::{ActivitiesService, ResourcesService, UsersService, WorkZonesService};
use crate::transport::{HttpTransport, ReqwestHttpTransport};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// Characters left as-is inside a single path segment.
const PATH_SEGMENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes an identifier for use as one URL path segment.
pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT_SET).to_string()
}

/// OFSC API client.
pub struct OfscClient {
    /// Configuration.
    config: OfscConfig,
    /// Resilient requester shared by every operation.
    requester: ResilientRequester,
    /// Metrics collector.
    metrics: Arc<Metrics>,
    /// Progress sink for collection passes.
    progress: Arc<dyn ProgressReporter>,
}

impl OfscClient {
    /// Creates a new client over the default reqwest transport.
    pub fn new(config: OfscConfig) -> OfscResult<Self> {
        let transport = Arc::new(ReqwestHttpTransport::new(
            config.timeout,
            config.connect_timeout,
        )?);
        Self::with_transport(config, transport)
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(config: OfscConfig, transport: Arc<dyn HttpTransport>) -> OfscResult<Self> {
        let token_provider = Arc::new(OAuthTokenProvider::new(
            transport.clone(),
            &config.base_url(),
        ));
        Self::with_parts(config, transport, token_provider)
    }

    /// Creates a client from a transport and a token provider.
    pub fn with_parts(
        config: OfscConfig,
        transport: Arc<dyn HttpTransport>,
        token_provider: Arc<dyn TokenProvider>,
    ) -> OfscResult<Self> {
        config.validate()?;

        let metrics = Arc::new(Metrics::new());
        let requester = ResilientRequester::new(
            transport,
            token_provider,
            config.credentials.clone(),
            config.retry.clone(),
            metrics.clone(),
        );

        Ok(Self {
            config,
            requester,
            metrics,
            progress: Arc::new(TracingProgress),
        })
    }

    /// Creates a new client builder.
    pub fn builder() -> OfscClientBuilder {
        OfscClientBuilder::new()
    }

    /// Replaces the progress reporter used by collection passes.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Gets the configuration.
    pub fn config(&self) -> &OfscConfig {
        &self.config
    }

    /// Gets the metrics collector.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Gets the resilient requester.
    pub fn requester(&self) -> &ResilientRequester {
        &self.requester
    }

    // Service accessors

    /// Gets the resources service.
    pub fn resources(&self) -> ResourcesService<'_> {
        ResourcesService::new(self)
    }

    /// Gets the users service.
    pub fn users(&self) -> UsersService<'_> {
        UsersService::new(self)
    }

    /// Gets the activities service.
    pub fn activities(&self) -> ActivitiesService<'_> {
        ActivitiesService::new(self)
    }

    /// Gets the work zones service.
    pub fn work_zones(&self) -> WorkZonesService<'_> {
        WorkZonesService::new(self)
    }

    // Core building blocks

    /// A collector configured with this client's throttle and progress sink.
    pub fn collector(&self) -> PaginatedCollector<'_> {
        PaginatedCollector::new(
            &self.requester,
            self.config.throttle.clone(),
            self.metrics.clone(),
            self.progress.clone(),
        )
    }

    /// A batch mutator configured with this client's batch settings.
    pub fn batch_mutator(&self) -> BatchMutator<'_> {
        BatchMutator::new(&self.requester, self.config.batch.clone(), self.metrics.clone())
    }

    /// Exchanges the configured credentials for a fresh token.
    pub async fn acquire_token(&self) -> OfscResult<AccessToken> {
        self.requester.acquire_token().await
    }

    // HTTP methods

    /// GET a core API path with resilience.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<AccessToken>,
    ) -> OfscResult<Authorized<T>> {
        self.requester
            .execute(&ApiCall::get(self.build_url(path)), token)
            .await
    }

    /// PATCH a core API path with resilience.
    pub async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        token: Option<AccessToken>,
    ) -> OfscResult<Authorized<T>> {
        let call = ApiCall::patch(self.build_url(path), body)?;
        self.requester.execute(&call, token).await
    }

    /// Builds a core API URL from a path relative to `/rest/ofscCore/v1`.
    pub fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.core_url(), path.trim_start_matches('/'))
    }
}

/// Builder for OfscClient.
pub struct OfscClientBuilder {
    config_builder: OfscConfigBuilder,
}

impl OfscClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            config_builder: OfscConfig::builder(),
        }
    }

    /// Sets the credentials.
    pub fn credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        instance: impl Into<String>,
    ) -> Self {
        self.config_builder = self
            .config_builder
            .credentials(Credentials::new(client_id, client_secret, instance));
        self
    }

    /// Overrides the base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config_builder = self.config_builder.base_url(url);
        self
    }

    /// Sets the timeout.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config_builder = self.config_builder.timeout(timeout);
        self
    }

    /// Disables the preemptive page pause.
    pub fn no_throttle(mut self) -> Self {
        self.config_builder = self.config_builder.no_throttle();
        self
    }

    /// Builds the client.
    pub fn build(self) -> OfscResult<OfscClient> {
        let config = self.config_builder.build()?;
        OfscClient::new(config)
    }
}

impl Default for OfscClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

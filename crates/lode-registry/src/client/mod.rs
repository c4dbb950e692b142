//! HTTP client for the JSON simple-repository API with connection pooling
//! and retry logic

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::{debug, warn};

use lode_core::error::LodeError;
use lode_core::types::{Registry, Version};
use lode_core::utils::normalize_name;

use crate::api::{requires_dist, DistributionFile, ProjectPage, SIMPLE_JSON_V1};
use crate::query::{DeclaredDependency, QueryFuture, RegistryQuery};
use crate::RegistryResult;

/// Configuration for exponential backoff retry logic
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Client settings
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub retry: RetryConfig,
    /// Per-request timeout
    pub request_timeout: Duration,
    pub user_agent: String,
    /// Bearer tokens keyed by registry alias
    pub tokens: HashMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("lode/{}", env!("CARGO_PKG_VERSION")),
            tokens: HashMap::new(),
        }
    }
}

impl ClientConfig {
    /// Pick up `LODE_TOKEN_<ALIAS>` for each registry
    pub fn with_env_tokens<'a, I>(mut self, registries: I) -> Self
    where
        I: IntoIterator<Item = &'a Registry>,
    {
        for registry in registries {
            if let Ok(token) = std::env::var(token_variable(&registry.alias)) {
                if !token.is_empty() {
                    self.tokens.insert(registry.alias.clone(), token);
                }
            }
        }
        self
    }
}

/// Name of the environment variable holding a registry's token
pub fn token_variable(alias: &str) -> String {
    let suffix: String = alias
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("LODE_TOKEN_{}", suffix)
}

/// Registry query capability over the JSON simple index
#[derive(Debug, Clone)]
pub struct SimpleIndexClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    /// Retry configuration
    retry_config: RetryConfig,
    tokens: HashMap<String, String>,
    /// Project pages fetched during this process, keyed by page URL
    pages: Arc<DashMap<String, Arc<ProjectPage>>>,
}

impl SimpleIndexClient {
    /// Create new client with default configuration
    pub fn new() -> RegistryResult<Self> {
        Self::with_config(ClientConfig::default())
    }

    /// Create client with custom configuration
    pub fn with_config(config: ClientConfig) -> RegistryResult<Self> {
        let client = ClientBuilder::new()
            // Connection pooling configuration
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(config.request_timeout)
            .gzip(true)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| LodeError::network(format!("Failed to create HTTP client: {}", e), e))?;

        Ok(Self {
            client,
            retry_config: config.retry,
            tokens: config.tokens,
            pages: Arc::new(DashMap::new()),
        })
    }

    /// Execute request with exponential backoff retry logic
    async fn with_retry<F, Fut, T>(&self, operation: F) -> RegistryResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = RegistryResult<T>>,
    {
        let mut delay = self.retry_config.initial_delay;
        let mut last_error = None;

        for attempt in 0..=self.retry_config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    // Only transport failures are worth repeating
                    let retryable = error.is_recoverable();
                    last_error = Some(error);

                    if !retryable || attempt == self.retry_config.max_retries {
                        break;
                    }

                    warn!(
                        "Registry request failed (attempt {}/{}), retrying in {:?}",
                        attempt + 1,
                        self.retry_config.max_retries + 1,
                        delay
                    );
                    tokio::time::sleep(delay).await;

                    delay = std::cmp::min(
                        Duration::from_millis(
                            (delay.as_millis() as f64 * self.retry_config.multiplier) as u64,
                        ),
                        self.retry_config.max_delay,
                    );
                },
            }
        }

        Err(last_error.unwrap_or_else(|| LodeError::Network {
            message: "Retry operation failed without error".to_string(),
            source: None,
        }))
    }

    fn request(&self, registry: &Registry, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match self.tokens.get(&registry.alias) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Fetch a project page, once per process
    pub async fn project_page(
        &self,
        registry: &Registry,
        name: &str,
    ) -> RegistryResult<Arc<ProjectPage>> {
        let url = project_url(registry, name);
        if let Some(page) = self.pages.get(&url) {
            return Ok(Arc::clone(page.value()));
        }

        debug!("GET {}", url);
        let page = self
            .with_retry(|| async {
                let response = self
                    .request(registry, &url)
                    .header(reqwest::header::ACCEPT, SIMPLE_JSON_V1)
                    .send()
                    .await
                    .map_err(|e| {
                        LodeError::network(format!("Failed to fetch {}: {}", url, e), e)
                    })?;

                match response.status() {
                    StatusCode::OK => response.json::<ProjectPage>().await.map_err(|e| {
                        LodeError::RegistryProtocol {
                            registry: registry.alias.clone(),
                            message: format!("invalid project page for '{}': {}", name, e),
                        }
                    }),
                    StatusCode::NOT_FOUND => Err(LodeError::PackageNotFound {
                        name: name.to_string(),
                        registry: registry.alias.clone(),
                    }),
                    status if status.is_server_error() => Err(LodeError::Network {
                        message: format!("Registry returned status {} for {}", status, url),
                        source: None,
                    }),
                    status => Err(LodeError::RegistryProtocol {
                        registry: registry.alias.clone(),
                        message: format!("unexpected status {} for {}", status, url),
                    }),
                }
            })
            .await?;

        let page = Arc::new(page);
        self.pages.insert(url, Arc::clone(&page));
        Ok(page)
    }

    /// Fetch the core metadata document of a distribution file
    async fn core_metadata(
        &self,
        registry: &Registry,
        page_url: &str,
        file: &DistributionFile,
    ) -> RegistryResult<String> {
        let file_url = url::Url::parse(page_url)
            .and_then(|base| base.join(&file.url))
            .map_err(|e| LodeError::RegistryProtocol {
                registry: registry.alias.clone(),
                message: format!("bad file URL '{}': {}", file.url, e),
            })?;
        let mut metadata_url = file_url;
        metadata_url.set_fragment(None);
        let metadata_url = format!("{}.metadata", metadata_url);

        debug!("GET {}", metadata_url);
        self.with_retry(|| async {
            let response = self
                .request(registry, &metadata_url)
                .send()
                .await
                .map_err(|e| {
                    LodeError::network(format!("Failed to fetch {}: {}", metadata_url, e), e)
                })?;

            let status = response.status();
            if status.is_server_error() {
                return Err(LodeError::Network {
                    message: format!("Registry returned status {} for {}", status, metadata_url),
                    source: None,
                });
            }
            if !status.is_success() {
                return Err(LodeError::RegistryProtocol {
                    registry: registry.alias.clone(),
                    message: format!("status {} for {}", status, metadata_url),
                });
            }

            response.text().await.map_err(|e| {
                LodeError::network(format!("Failed to read {}: {}", metadata_url, e), e)
            })
        })
        .await
    }

    fn preferred_file<'p>(
        &self,
        registry: &Registry,
        page: &'p ProjectPage,
        name: &str,
        version: &Version,
    ) -> RegistryResult<&'p DistributionFile> {
        page.preferred_file(version)
            .ok_or_else(|| LodeError::PackageNotFound {
                name: format!("{} {}", name, version),
                registry: registry.alias.clone(),
            })
    }
}

/// `<index>/<normalized-name>/`
fn project_url(registry: &Registry, name: &str) -> String {
    format!("{}/{}/", registry.url.trim_end_matches('/'), normalize_name(name))
}

impl RegistryQuery for SimpleIndexClient {
    fn list_versions<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
    ) -> QueryFuture<'a, Vec<Version>> {
        Box::pin(async move {
            match self.project_page(registry, name).await {
                Ok(page) => Ok(page.available_versions()),
                // An absent project simply has no versions
                Err(LodeError::PackageNotFound { .. }) => Ok(Vec::new()),
                Err(e) => Err(e),
            }
        })
    }

    fn fetch_dependencies<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
        version: &'a Version,
    ) -> QueryFuture<'a, Vec<DeclaredDependency>> {
        Box::pin(async move {
            let page = self.project_page(registry, name).await?;
            let file = self.preferred_file(registry, &page, name, version)?;
            if !file.core_metadata.is_available() {
                return Err(LodeError::RegistryProtocol {
                    registry: registry.alias.clone(),
                    message: format!("no core metadata published for {} {}", name, version),
                });
            }

            let metadata = self
                .core_metadata(registry, &project_url(registry, name), file)
                .await?;
            requires_dist(&metadata)
                .iter()
                .map(|line| {
                    DeclaredDependency::parse(line).map_err(|e| LodeError::RegistryProtocol {
                        registry: registry.alias.clone(),
                        message: format!("{} {} declares {}", name, version, e),
                    })
                })
                .collect()
        })
    }

    fn content_hash<'a>(
        &'a self,
        registry: &'a Registry,
        name: &'a str,
        version: &'a Version,
    ) -> QueryFuture<'a, String> {
        Box::pin(async move {
            let page = self.project_page(registry, name).await?;
            let file = self.preferred_file(registry, &page, name, version)?;
            file.sha256().ok_or_else(|| LodeError::RegistryProtocol {
                registry: registry.alias.clone(),
                message: format!("{} has no sha256 hash", file.filename),
            })
        })
    }
}

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::ScraperConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Where the pipeline gets its documents from.
#[async_trait]
pub trait PageSource {
    /// Fetches a sitemap or other auxiliary document without throttling.
    async fn fetch_document(&self, url: &str) -> Result<String, FetchError>;

    /// Fetches a content page, honouring the inter-request delay.
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    request_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            request_delay: config.request_delay,
        })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch_document(&self, url: &str) -> Result<String, FetchError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
    }

    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        tokio::time::sleep(self.request_delay).await;
        self.fetch_document(url).await
    }
}

/// Loading of config files and manifests from http(s) URLs or local paths
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{Result, WorkloadError};

/// Fetches a document by location, preferring a remote fetch and falling back to disk
#[derive(Clone)]
pub struct ResourceLoader {
    client: Client,
}

impl ResourceLoader {
    /// Create a loader whose remote fetches give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .timeout(timeout)
            .build()
            .map_err(WorkloadError::HttpClient)?;

        Ok(Self { client })
    }

    /// Load the content at `location`.
    ///
    /// An absolute http/https URL is fetched first. Any failure there, including
    /// a non-2xx status or another scheme, falls back to reading `location` as a
    /// local path.
    pub async fn load(&self, location: &str) -> Result<Vec<u8>> {
        if let Some(url) = remote_url(location) {
            match self.fetch(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => debug!("Remote fetch of {} failed, trying local path: {:#}", location, e),
            }
        }

        match tokio::fs::read(location).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(WorkloadError::ResourceUnreachable(location.to_string()))
            }
            Err(source) => Err(WorkloadError::ReadFailed {
                location: location.to_string(),
                source,
            }),
        }
    }

    async fn fetch(&self, url: Url) -> std::result::Result<Vec<u8>, reqwest::Error> {
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Parse `location` as an absolute http/https URL
fn remote_url(location: &str) -> Option<Url> {
    Url::parse(location)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

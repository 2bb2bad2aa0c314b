//! Content-API client for editor media.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use sf_core::config::MediaConfig;

use crate::resource::{ApiItem, ApiPage, MediaResource, ResourceKind, ResourcePage};

/// Lists and resolves editor media through the CMS content API.
#[derive(Debug, Clone)]
pub struct MediaApiClient {
    client: Client,
    config: MediaConfig,
}

impl MediaApiClient {
    pub fn new(config: MediaConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });
        Self { client, config }
    }

    pub fn with_client(client: Client, config: MediaConfig) -> Self {
        Self { client, config }
    }

    /// Listing URL for a kind, including its media-type filter.
    fn listing_url(&self, kind: ResourceKind) -> String {
        let cfg = &self.config;
        match kind {
            ResourceKind::Image => cfg.endpoint_url(&cfg.images_endpoint),
            ResourceKind::Video => format!("{}?type=video", cfg.endpoint_url(&cfg.media_endpoint)),
            ResourceKind::Audio => format!("{}?type=audio", cfg.endpoint_url(&cfg.media_endpoint)),
            ResourceKind::Caption => cfg.endpoint_url(&cfg.documents_endpoint),
        }
    }

    fn detail_url(&self, kind: ResourceKind, id: u64) -> String {
        let cfg = &self.config;
        let endpoint = match kind {
            ResourceKind::Image => &cfg.images_endpoint,
            ResourceKind::Video | ResourceKind::Audio => &cfg.media_endpoint,
            ResourceKind::Caption => &cfg.documents_endpoint,
        };
        format!(
            "{}/{id}/",
            cfg.endpoint_url(endpoint).trim_end_matches('/')
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> sf_core::Result<T> {
        tracing::debug!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| sf_core::Error::api(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(sf_core::Error::api(
                url,
                format!("status {status}: {}", body.trim()),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| sf_core::Error::api(url, format!("invalid response body: {e}")))
    }

    /// Every resource of one kind.
    pub async fn list(&self, kind: ResourceKind) -> sf_core::Result<ResourcePage> {
        let url = self.listing_url(kind);
        let page: ApiPage = self.get_json(&url).await?;
        tracing::debug!(
            "Listed {} {kind} resources ({} total)",
            page.items.len(),
            page.meta.total_count
        );
        Ok(ResourcePage::from_api(kind, page))
    }

    /// One resource by id.
    pub async fn get(&self, kind: ResourceKind, id: u64) -> sf_core::Result<MediaResource> {
        let url = self.detail_url(kind, id);
        let item: ApiItem = self.get_json(&url).await?;
        Ok(MediaResource::from_item(kind, item))
    }

    pub async fn images(&self) -> sf_core::Result<ResourcePage> {
        self.list(ResourceKind::Image).await
    }

    pub async fn videos(&self) -> sf_core::Result<ResourcePage> {
        self.list(ResourceKind::Video).await
    }

    pub async fn audio(&self) -> sf_core::Result<ResourcePage> {
        self.list(ResourceKind::Audio).await
    }

    pub async fn captions(&self) -> sf_core::Result<ResourcePage> {
        self.list(ResourceKind::Caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> MediaApiClient {
        MediaApiClient::new(MediaConfig {
            api_base_url: base.into(),
            ..MediaConfig::default()
        })
    }

    #[test]
    fn listing_urls() {
        let c = client("http://cms/api/v2/");
        assert_eq!(c.listing_url(ResourceKind::Image), "http://cms/api/v2/images/");
        assert_eq!(
            c.listing_url(ResourceKind::Video),
            "http://cms/api/v2/media/?type=video"
        );
        assert_eq!(
            c.listing_url(ResourceKind::Audio),
            "http://cms/api/v2/media/?type=audio"
        );
        assert_eq!(
            c.listing_url(ResourceKind::Caption),
            "http://cms/api/v2/documents/"
        );
    }

    #[test]
    fn detail_urls() {
        let c = client("http://cms/api/v2");
        assert_eq!(c.detail_url(ResourceKind::Image, 7), "http://cms/api/v2/images/7/");
        assert_eq!(c.detail_url(ResourceKind::Audio, 3), "http://cms/api/v2/media/3/");
    }
}

use crate::metrics::{
    ListingKind,
    Listings,
    PathDescriptor,
};
use futures::future::join_all;
use reqwest::{
    Client as HttpClient,
    StatusCode,
};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use strum::IntoEnumIterator;
use url::Url;

/// Per request deadline towards the control API.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound of pages fetched from one listing.
const MAX_PAGES: u64 = 1000;

const PATHS_ENDPOINT: &str = "/v3/paths/list";

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("Invalid API endpoint {0}: {1}")]
    Endpoint(String, url::ParseError),
    #[error("Request to {0} failed: {1}")]
    Request(Url, reqwest::Error),
    #[error("{0} answered with status {1}")]
    Status(Url, StatusCode),
}

/// One page of a `/v3/*/list` response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    page_count: Option<u64>,
    #[serde(default)]
    items: Option<Vec<Value>>,
}

/// Read-only client of the MediaMTX control API.
///
/// Every failure degrades to an empty listing after a warning, so one
/// unreachable endpoint never stops a cycle.
#[derive(Debug, Clone)]
pub struct MediaMtxClient {
    http_client: HttpClient,
    base_url: Url,
    timeout: Duration,
}

impl MediaMtxClient {
    pub fn new(http_client: HttpClient, base_url: Url) -> Self {
        Self {
            http_client,
            base_url,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn fetch_paths(&self) -> Vec<PathDescriptor> {
        let items = self.fetch_items(PATHS_ENDPOINT).await;
        let total = items.len();
        let paths: Vec<_> = items.into_iter().filter_map(PathDescriptor::from_item).collect();
        debug!(total, decoded = paths.len(), "Fetched paths");
        paths
    }

    /// Fetches every connection listing concurrently and indexes them.
    pub async fn fetch_listings(&self) -> Listings {
        let kinds: Vec<_> = ListingKind::iter().collect();
        let fetched = join_all(kinds.iter().map(|kind| self.fetch_items(kind.endpoint()))).await;

        let mut listings = Listings::new();
        for (kind, items) in kinds.into_iter().zip(fetched) {
            let indexed = listings.insert_items(kind, items);
            trace!(%kind, indexed, "Indexed connection listing");
        }
        listings
    }

    /// All items of a paginated listing, empty on any failure.
    pub async fn fetch_items(&self, endpoint: &str) -> Vec<Value> {
        match self.try_fetch_items(endpoint).await {
            Ok(items) => items,
            Err(err) => {
                warn!(%endpoint, %err, "MediaMTX API request failed");
                Vec::new()
            }
        }
    }

    async fn try_fetch_items(&self, endpoint: &str) -> Result<Vec<Value>, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        let mut items = Vec::new();
        let mut page = 0;

        loop {
            let body = self.fetch_page(&url, page).await?;
            items.extend(body.items.unwrap_or_default());
            page += 1;
            match body.page_count {
                Some(page_count) if page < page_count.min(MAX_PAGES) => continue,
                _ => break,
            }
        }

        Ok(items)
    }

    async fn fetch_page(&self, url: &Url, page: u64) -> Result<ListPage, ApiError> {
        let response = self
            .http_client
            .get(url.clone())
            .query(&[("page", page)])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| ApiError::Request(url.clone(), err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(url.clone(), status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| ApiError::Request(url.clone(), err))?;
        Ok(decode_page(url, body))
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        let joined = format!("{}{endpoint}", self.base_url.as_str().trim_end_matches('/'));
        Url::parse(&joined).map_err(|err| ApiError::Endpoint(joined, err))
    }
}

/// A body that is not a listing object counts as an empty page.
fn decode_page(url: &Url, body: Value) -> ListPage {
    match serde_json::from_value(body) {
        Ok(page) => page,
        Err(err) => {
            warn!(%url, %err, "Unexpected listing shape");
            ListPage::default()
        }
    }
}

//! Marketplace listing cache.
//!
//! A TTL-bound cache over the remote paginated listing of publicly available
//! tool providers. Unfiltered browsing delegates straight to the remote's own
//! pagination; search requires the complete listing, so it materializes the
//! full catalog (pages fetched concurrently) and filters/paginates locally.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::types::{Error, MarketConfig, Result};

// =============================================================================
// Listing types
// =============================================================================

/// One remote-listing item. Immutable once fetched; names carry no relation
/// to local provider registrations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketEntry {
    #[serde(default)]
    pub name: String,

    /// Human-readable display name (`name_h` on the wire).
    #[serde(rename = "name_h", default)]
    pub display_name: String,

    #[serde(default)]
    pub description: String,

    /// Opaque passthrough fields (author, repo, tags, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MarketEntry {
    /// Case-insensitive substring match against name/display-name/description.
    fn matches(&self, term_lower: &str) -> bool {
        self.name.to_lowercase().contains(term_lower)
            || self.display_name.to_lowercase().contains(term_lower)
            || self.description.to_lowercase().contains(term_lower)
    }
}

fn default_page() -> u32 {
    1
}

/// Page metadata, mirroring the remote API's camelCase wire names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub total: u64,
    #[serde(default = "default_page")]
    pub total_pages: u32,
    #[serde(default = "default_page")]
    pub current_page: u32,
    #[serde(default)]
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            total: 0,
            total_pages: 1,
            current_page: 1,
            page_size: 0,
        }
    }
}

/// One page of listing results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageResult {
    #[serde(rename = "mcpservers", default)]
    pub entries: Vec<MarketEntry>,

    #[serde(default)]
    pub pagination: Pagination,
}

// =============================================================================
// Remote client seam
// =============================================================================

/// Fetches one page of the remote marketplace listing.
#[async_trait]
pub trait RemoteListingClient: Send + Sync {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult>;
}

/// HTTP implementation over the configured listing endpoint.
#[derive(Debug, Clone)]
pub struct HttpListingClient {
    http: Client,
    endpoint: String,
}

impl HttpListingClient {
    pub fn new(config: &MarketConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl RemoteListingClient for HttpListingClient {
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<PageResult> {
        /// The remote wraps every payload in a `data` envelope.
        #[derive(Deserialize)]
        struct DataEnvelope {
            data: PageResult,
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("page", page), ("page_size", page_size)])
            .send()
            .await?
            .error_for_status()?;

        let envelope: DataEnvelope = response.json().await?;
        Ok(envelope.data)
    }
}

// =============================================================================
// Cache
// =============================================================================

/// A complete listing snapshot as of `fetched_at`. Partial listings are
/// never stored.
struct CachedListing {
    entries: Vec<MarketEntry>,
    fetched_at: Instant,
}

/// TTL-bound cache of the full marketplace listing.
///
/// The cached state is owned by this instance behind a single `RwLock`:
/// readers observe either the previous complete snapshot or the new complete
/// snapshot, never a mix.
pub struct MarketCache {
    client: Arc<dyn RemoteListingClient>,
    ttl: Duration,
    fetch_page_size: u32,
    max_pages: u32,
    state: RwLock<Option<CachedListing>>,
}

impl fmt::Debug for MarketCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketCache")
            .field("ttl", &self.ttl)
            .field("fetch_page_size", &self.fetch_page_size)
            .field("max_pages", &self.max_pages)
            .finish_non_exhaustive()
    }
}

impl MarketCache {
    pub fn new(client: Arc<dyn RemoteListingClient>, config: &MarketConfig) -> Self {
        Self {
            client,
            ttl: config.cache_ttl,
            fetch_page_size: config.fetch_page_size,
            max_pages: config.max_pages,
            state: RwLock::new(None),
        }
    }

    /// Unfiltered browse: a single remote page fetch, no caching. Always
    /// reflects the remote's own pagination and freshness.
    pub async fn get_page(&self, page: u32, page_size: u32) -> Result<PageResult> {
        self.client.fetch_page(page, page_size).await
    }

    /// Search the full listing, then paginate the filtered result locally.
    pub async fn search(
        &self,
        term: &str,
        page: u32,
        page_size: u32,
        force_refresh: bool,
    ) -> Result<PageResult> {
        let listing = self.full_listing(force_refresh).await?;
        let term_lower = term.to_lowercase();
        let filtered: Vec<MarketEntry> = listing
            .iter()
            .filter(|entry| entry.matches(&term_lower))
            .cloned()
            .collect();

        info!(
            term,
            candidates = listing.len(),
            matched = filtered.len(),
            "marketplace search"
        );
        Ok(paginate(filtered, page, page_size))
    }

    /// Clear cached state unconditionally.
    pub async fn invalidate(&self) {
        *self.state.write().await = None;
    }

    /// Return the complete listing, from cache when warm.
    async fn full_listing(&self, force_refresh: bool) -> Result<Vec<MarketEntry>> {
        if !force_refresh {
            let state = self.state.read().await;
            if let Some(cached) = state.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    info!(count = cached.entries.len(), "serving marketplace listing from cache");
                    return Ok(cached.entries.clone());
                }
            }
        }

        let entries = self.fetch_all().await?;
        let mut state = self.state.write().await;
        *state = Some(CachedListing {
            entries: entries.clone(),
            fetched_at: Instant::now(),
        });
        info!(count = entries.len(), "cached full marketplace listing");
        Ok(entries)
    }

    /// Fetch every listing page. Page 1 establishes the page count; the rest
    /// are fetched concurrently. A failing secondary page is dropped with a
    /// warning, so the merged result may undercount on transient errors.
    async fn fetch_all(&self) -> Result<Vec<MarketEntry>> {
        let first = self
            .client
            .fetch_page(1, self.fetch_page_size)
            .await
            .map_err(|err| Error::remote_fetch(format!("listing page 1: {err}")))?;

        let mut entries = first.entries;
        let pages = first.pagination.total_pages.min(self.max_pages);

        if pages > 1 {
            let fetches = (2..=pages).map(|page| self.client.fetch_page(page, self.fetch_page_size));
            for (page, result) in (2..=pages).zip(join_all(fetches).await) {
                match result {
                    Ok(mut fetched) => entries.append(&mut fetched.entries),
                    Err(err) => warn!(page, "dropping failed listing page: {err}"),
                }
            }
        }

        Ok(entries)
    }
}

/// Paginate an already-filtered listing locally.
fn paginate(items: Vec<MarketEntry>, page: u32, page_size: u32) -> PageResult {
    let total = items.len() as u64;
    let page = page.max(1);
    let page_size = page_size.max(1);
    let total_pages = ((total + u64::from(page_size) - 1) / u64::from(page_size)).max(1) as u32;

    let start = (page as usize - 1) * page_size as usize;
    let entries: Vec<MarketEntry> = items
        .into_iter()
        .skip(start)
        .take(page_size as usize)
        .collect();

    PageResult {
        entries,
        pagination: Pagination {
            total,
            total_pages,
            current_page: page,
            page_size,
        },
    }
}

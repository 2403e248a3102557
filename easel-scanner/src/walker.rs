use crate::client::HttpClient;
use crate::error::{Result, ScanError};
use crate::page::{ClassifiedPage, LINK_SELECTOR, PageProfile, TITLE_SELECTOR};
use crate::result::ArtworkRecord;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

pub type PageCallback = Arc<dyn Fn(u32, String) + Send + Sync>;

pub const DEFAULT_MAX_PAGES: u32 = 5000;

/// Why a walk stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkStop {
    /// The page yielded no new valid items and was discarded.
    EmptyPage { page: u32 },
    /// The page had items but no next-page landmark.
    NoNextPage { page: u32 },
    /// The configured page bound was reached.
    PageLimit { page: u32 },
    /// The page could not be fetched after the client's retries.
    FetchFailed { page: u32, reason: String },
}

impl WalkStop {
    /// The listing ran out on its own. A page bound or fetch failure
    /// leaves later pages unseen.
    pub fn is_complete(&self) -> bool {
        matches!(self, WalkStop::EmptyPage { .. } | WalkStop::NoNextPage { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Walk {
    pub records: Vec<ArtworkRecord>,
    pub pages_with_items: u32,
    pub stop: WalkStop,
}

/// Compiled selectors for one page profile.
pub struct ListingSelectors {
    item: Selector,
    id: Selector,
    next: Selector,
    title: Selector,
    link: Selector,
}

impl ListingSelectors {
    pub fn for_profile(profile: &PageProfile) -> Result<Self> {
        Ok(Self {
            item: parse_selector(profile.item_selector)?,
            id: parse_selector(profile.id_selector)?,
            next: parse_selector(profile.next_selector)?,
            title: parse_selector(TITLE_SELECTOR)?,
            link: parse_selector(LINK_SELECTOR)?,
        })
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::ParseError(format!("selector {}: {}", css, e)))
}

/// Items extracted from one listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedListing {
    pub records: Vec<ArtworkRecord>,
    pub skipped: usize,
    pub has_next: bool,
}

/// Extract artwork records from a listing page. Items missing the download
/// link, numeric identifier or title are counted in `skipped`.
pub fn parse_listing(
    html: &str,
    page_url: &str,
    selectors: &ListingSelectors,
    download_prefix: &str,
) -> ParsedListing {
    let document = Html::parse_document(html);
    let mut parsed = ParsedListing::default();

    for item in document.select(&selectors.item) {
        match extract_item(item, page_url, selectors, download_prefix) {
            Some(record) => parsed.records.push(record),
            None => parsed.skipped += 1,
        }
    }

    parsed.has_next = document.select(&selectors.next).next().is_some();
    parsed
}

fn extract_item(
    item: ElementRef<'_>,
    page_url: &str,
    selectors: &ListingSelectors,
    download_prefix: &str,
) -> Option<ArtworkRecord> {
    let url = item
        .select(&selectors.link)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_url(page_url, href))
        .find(|href| href.starts_with(download_prefix))?;

    let id = item
        .select(&selectors.id)
        .find_map(|el| el.value().attr("data-id"))
        .and_then(|raw| raw.trim().parse::<u64>().ok())?;

    let title = item
        .select(&selectors.title)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())?;

    Some(ArtworkRecord { url, id, title })
}

fn resolve_url(base: &str, href: &str) -> Option<String> {
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }

    let base_url = Url::parse(base).ok()?;
    let mut url = base_url.join(href).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Walks every listing page reachable from a classified page, in order.
pub struct ListingWalker {
    client: HttpClient,
    download_prefix: String,
    max_pages: u32,
    page_callback: Option<PageCallback>,
}

impl ListingWalker {
    pub fn new(client: HttpClient, site_url: &str) -> Self {
        Self {
            client,
            download_prefix: format!("{}/dl/", site_url.trim_end_matches('/')),
            max_pages: DEFAULT_MAX_PAGES,
            page_callback: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn with_page_callback(mut self, callback: PageCallback) -> Self {
        self.page_callback = Some(callback);
        self
    }

    pub async fn walk(&self, page: &ClassifiedPage) -> Result<Walk> {
        let selectors = ListingSelectors::for_profile(page.profile())?;
        let mut records = Vec::new();
        let mut seen = HashSet::new();
        let mut page_number = 1u32;

        info!(
            page_type = %page.page_type,
            base = %page.base_url,
            "Walking listing"
        );

        let stop = loop {
            let page_url = page.page_url(page_number);
            if let Some(ref callback) = self.page_callback {
                callback(page_number, page_url.clone());
            }
            debug!("Fetching listing page {}: {}", page_number, page_url);

            let html = match self.client.get_text(&page_url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!("Listing fetch failed for {}: {}", page_url, e);
                    break WalkStop::FetchFailed {
                        page: page_number,
                        reason: e.to_string(),
                    };
                }
            };

            let parsed = parse_listing(&html, &page_url, &selectors, &self.download_prefix);
            let found = parsed.records.len();
            let fresh: Vec<ArtworkRecord> = parsed
                .records
                .into_iter()
                .filter(|r| seen.insert(r.id))
                .collect();

            if parsed.skipped > 0 {
                debug!(
                    "Skipped {} malformed item(s) on {}",
                    parsed.skipped, page_url
                );
            }
            if fresh.len() < found {
                debug!(
                    "Dropped {} duplicate item(s) on {}",
                    found - fresh.len(),
                    page_url
                );
            }

            if fresh.is_empty() {
                info!("No more artworks on page {}, stopping", page_number);
                break WalkStop::EmptyPage { page: page_number };
            }

            records.extend(fresh);

            if !parsed.has_next {
                info!("No next page after page {}", page_number);
                break WalkStop::NoNextPage { page: page_number };
            }
            if page_number >= self.max_pages {
                warn!("Page limit {} reached for {}", self.max_pages, page.base_url);
                break WalkStop::PageLimit { page: page_number };
            }

            page_number += 1;
        };

        let pages_with_items = match &stop {
            WalkStop::NoNextPage { page } | WalkStop::PageLimit { page } => *page,
            WalkStop::EmptyPage { page } | WalkStop::FetchFailed { page, .. } => *page - 1,
        };

        info!(
            "Listing walk finished: {} artworks over {} page(s)",
            records.len(),
            pages_with_items
        );

        Ok(Walk {
            records,
            pages_with_items,
            stop,
        })
    }
}

// Page classification and the per-type profile table

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageType {
    Artist,
    Collection,
    SubCollection,
    Books,
    Topics,
    Culture,
    Movement,
    Search,
    Category,
}

impl PageType {
    pub const ALL: [PageType; 9] = [
        PageType::Artist,
        PageType::Collection,
        PageType::SubCollection,
        PageType::Books,
        PageType::Topics,
        PageType::Culture,
        PageType::Movement,
        PageType::Search,
        PageType::Category,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Artist => "artist",
            PageType::Collection => "collection",
            PageType::SubCollection => "s_collection",
            PageType::Books => "books",
            PageType::Topics => "topics",
            PageType::Culture => "culture",
            PageType::Movement => "movement",
            PageType::Search => "search",
            PageType::Category => "category",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PageType::Artist => "Artist",
            PageType::Collection => "Collection",
            PageType::SubCollection => "SubCollection",
            PageType::Books => "Books",
            PageType::Topics => "Topics",
            PageType::Culture => "Culture",
            PageType::Movement => "Movement",
            PageType::Search => "Search",
            PageType::Category => "Category",
        }
    }

    pub fn profile(&self) -> &'static PageProfile {
        match self {
            PageType::Artist => &ARTIST,
            PageType::Collection => &COLLECTION,
            PageType::SubCollection => &SUB_COLLECTION,
            PageType::Books => &BOOKS,
            PageType::Topics => &TOPICS,
            PageType::Culture => &CULTURE,
            PageType::Movement => &MOVEMENT,
            PageType::Search => &SEARCH,
            PageType::Category => &CATEGORY,
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How listing page `n >= 2` is derived from the page-1 URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// `{base}page/{n}/`, query string kept (search uses this with `?s=`)
    PageSegment,
    /// `{base}{n}/`
    NumberSegment,
}

impl Pagination {
    pub fn page_url(&self, base: &Url, page: u32) -> String {
        if page <= 1 {
            return base.to_string();
        }

        let mut url = base.clone();
        let mut path = url.path().to_string();
        if !path.ends_with('/') {
            path.push('/');
        }
        match self {
            Pagination::PageSegment => path.push_str(&format!("page/{}/", page)),
            Pagination::NumberSegment => path.push_str(&format!("{}/", page)),
        }
        url.set_path(&path);
        url.to_string()
    }
}

/// Everything downstream components need to know about a page type.
#[derive(Debug)]
pub struct PageProfile {
    pub page_type: PageType,
    pub pagination: Pagination,
    pub item_selector: &'static str,
    pub id_selector: &'static str,
    pub next_selector: &'static str,
    pub heading_selector: Option<&'static str>,
}

pub const TITLE_SELECTOR: &str = "h3.product-title";
pub const LINK_SELECTOR: &str = "a[href]";

const fn grid(page_type: PageType, heading_selector: Option<&'static str>) -> PageProfile {
    PageProfile {
        page_type,
        pagination: Pagination::PageSegment,
        item_selector: "div.product-grid-item",
        id_selector: "div.product-image-link",
        next_selector: "a.next.page-numbers",
        heading_selector,
    }
}

static ARTIST: PageProfile = grid(PageType::Artist, Some("h1.artist"));
static COLLECTION: PageProfile = grid(PageType::Collection, Some("h1.entry-title"));
static BOOKS: PageProfile = grid(PageType::Books, Some("h1.book-title"));
static TOPICS: PageProfile = grid(PageType::Topics, Some("h1.topic-title"));
static CULTURE: PageProfile = grid(PageType::Culture, Some("h1.culture-title"));
static MOVEMENT: PageProfile = grid(PageType::Movement, Some("h1.movement-title"));
static SEARCH: PageProfile = grid(PageType::Search, None);
static CATEGORY: PageProfile = grid(PageType::Category, None);
static SUB_COLLECTION: PageProfile = PageProfile {
    page_type: PageType::SubCollection,
    pagination: Pagination::NumberSegment,
    item_selector: "article.product-grid-item",
    id_selector: "header.entry-header",
    next_selector: "a.nextpostslink",
    heading_selector: Some("h1.entry-title"),
};

/// A classified input URL: its type, canonical page-1 URL and cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedPage {
    pub page_type: PageType,
    pub input_url: Url,
    pub base_url: Url,
    pub key: String,
}

impl ClassifiedPage {
    pub fn profile(&self) -> &'static PageProfile {
        self.page_type.profile()
    }

    pub fn page_url(&self, page: u32) -> String {
        self.profile().pagination.page_url(&self.base_url, page)
    }
}

/// Classify `input` by its path markers. Performs no I/O.
pub fn classify(input: &str) -> Result<ClassifiedPage> {
    let input_url = Url::parse(input.trim())
        .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", input.trim(), e)))?;

    let segments: Vec<String> = input_url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();
    let has = |marker: &str| segments.iter().any(|s| s == marker);
    let after = |marker: &str| {
        segments
            .iter()
            .position(|s| s == marker)
            .and_then(|i| segments.get(i + 1))
            .cloned()
    };

    for page_type in [
        PageType::Artist,
        PageType::Collection,
        PageType::Books,
        PageType::Topics,
        PageType::Culture,
        PageType::Movement,
    ] {
        if has(page_type.as_str()) {
            let (base_url, key) = listing_base(&input_url, &segments);
            return Ok(ClassifiedPage {
                page_type,
                input_url,
                base_url,
                key,
            });
        }
    }

    if let Some(id) = after("s_collection").filter(|id| id.chars().all(|c| c.is_ascii_digit()))
    {
        let base_url = rebase(&input_url, &format!("/s_collection/{}/", id), None);
        return Ok(ClassifiedPage {
            page_type: PageType::SubCollection,
            input_url,
            base_url,
            key: id,
        });
    }

    let search_term = input_url
        .query_pairs()
        .find(|(k, _)| k == "s")
        .map(|(_, v)| v.into_owned());
    if let Some(term) = search_term.filter(|_| has("main")) {
        let base_url = rebase(&input_url, "/main/", Some(&term));
        return Ok(ClassifiedPage {
            page_type: PageType::Search,
            input_url,
            base_url,
            key: term,
        });
    }

    if let Some(slug) = after("c") {
        let base_url = rebase(&input_url, &format!("/c/{}/", slug), None);
        return Ok(ClassifiedPage {
            page_type: PageType::Category,
            input_url,
            base_url,
            key: slug,
        });
    }

    Err(ScanError::UnsupportedPageType(input_url.to_string()))
}

/// Strip a trailing `page/{n}` from the path and use the last remaining
/// segment as the cache key.
fn listing_base(input: &Url, segments: &[String]) -> (Url, String) {
    let mut kept: Vec<&str> = segments.iter().map(String::as_str).collect();
    if kept.len() >= 2
        && kept[kept.len() - 2] == "page"
        && kept[kept.len() - 1].chars().all(|c| c.is_ascii_digit())
    {
        kept.truncate(kept.len() - 2);
    }

    let key = kept.last().map(|s| s.to_string()).unwrap_or_default();
    let path = if kept.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", kept.join("/"))
    };

    let mut base = input.clone();
    base.set_path(&path);
    base.set_fragment(None);
    (base, key)
}

fn rebase(input: &Url, path: &str, search_term: Option<&str>) -> Url {
    let mut base = input.clone();
    base.set_path(path);
    base.set_query(None);
    base.set_fragment(None);
    if let Some(term) = search_term {
        base.query_pairs_mut().append_pair("s", term);
    }
    base
}

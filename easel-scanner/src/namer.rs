use crate::client::HttpClient;
use crate::page::{ClassifiedPage, PageType};
use scraper::{Html, Selector};
use tracing::{debug, warn};

pub const UNTITLED: &str = "Untitled";
pub const VARIOUS_ARTISTS: &str = "Various Artists";

/// Keep `[A-Za-z0-9 _-]`, turn `-`/`_` into spaces and title-case the rest.
/// May return an empty string.
pub fn sanitize_name(raw: &str) -> String {
    let kept: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-'))
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();
    title_case(kept.trim())
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_ascii_alphabetic() {
            out.push(if in_word {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            });
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn non_empty_or(name: String, fallback: &str) -> String {
    if name.is_empty() {
        fallback.to_string()
    } else {
        name
    }
}

/// Name used when no heading can be read: the slug from the URL.
pub fn fallback_name(page: &ClassifiedPage) -> String {
    non_empty_or(sanitize_name(&page.key), UNTITLED)
}

/// Search and category pages get a descriptive name instead of a heading.
pub fn synthesized_name(page: &ClassifiedPage) -> Option<String> {
    let raw = match page.page_type {
        PageType::Search => format!("Search {}", page.key),
        PageType::Category => format!("Category {}", page.key),
        _ => return None,
    };
    Some(non_empty_or(sanitize_name(&raw), UNTITLED))
}

/// Label used in front of the artwork title in output filenames.
pub fn attribution_label(page_type: PageType, folder: &str) -> String {
    let raw = if page_type == PageType::Artist {
        folder
    } else {
        VARIOUS_ARTISTS
    };
    non_empty_or(sanitize_name(raw), VARIOUS_ARTISTS)
}

pub fn heading_text(html: &str, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

pub struct FolderNamer {
    client: HttpClient,
}

impl FolderNamer {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    /// Never fails: falls back to the URL slug when the heading is missing or
    /// the page cannot be fetched.
    pub async fn folder_name(&self, page: &ClassifiedPage) -> String {
        if let Some(name) = synthesized_name(page) {
            return name;
        }

        let Some(css) = page.profile().heading_selector else {
            return fallback_name(page);
        };

        match self.client.get_text(page.input_url.as_str()).await {
            Ok(html) => match heading_text(&html, css) {
                Some(heading) => {
                    debug!("Folder heading for {}: {}", page.input_url, heading);
                    non_empty_or(sanitize_name(&heading), &fallback_name(page))
                }
                None => {
                    debug!("No {} heading on {}, using slug", css, page.input_url);
                    fallback_name(page)
                }
            },
            Err(e) => {
                warn!("Could not fetch folder name from {}: {}", page.input_url, e);
                fallback_name(page)
            }
        }
    }
}

use crate::client::HttpClient;
use crate::error::{Result, ScanError};
use serde::Deserialize;
use tracing::debug;

pub const RESOLVE_PATH: &str = "/erica";
pub const RESOLVE_ACTION: &str = "woodmart_quick_view2";

#[derive(Debug, Deserialize)]
struct QuickViewResponse {
    #[serde(default)]
    flink: Option<String>,
}

/// Turns an artwork identifier into its binary download URL with one call to
/// the site's quick-view endpoint.
#[derive(Debug, Clone)]
pub struct LinkResolver {
    client: HttpClient,
    endpoint: String,
}

impl LinkResolver {
    pub fn new(client: HttpClient, site_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}{}", site_url.trim_end_matches('/'), RESOLVE_PATH),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn resolve(&self, id: u64) -> Result<String> {
        let failed = |reason: String| ScanError::ResolveFailed { id, reason };

        let response = self
            .client
            .get_with_query(
                &self.endpoint,
                &[
                    ("id", id.to_string()),
                    ("action", RESOLVE_ACTION.to_string()),
                ],
            )
            .await
            .map_err(|e| failed(e.to_string()))?;

        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        let parsed: QuickViewResponse =
            serde_json::from_str(&body).map_err(|e| failed(format!("malformed response: {}", e)))?;

        match parsed.flink.map(|link| link.trim().to_string()) {
            Some(link) if !link.is_empty() => {
                debug!("Resolved artwork {} to {}", id, link);
                Ok(link)
            }
            _ => Err(failed("response has no download link".to_string())),
        }
    }
}

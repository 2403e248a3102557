use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One artwork teaser discovered on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkRecord {
    pub url: String,
    pub id: u64,
    pub title: String,
}

impl ArtworkRecord {
    pub fn new(url: impl Into<String>, id: u64, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            id,
            title: title.into(),
        }
    }
}

/// An artwork whose binary location is known and whose destination folder
/// has been decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDownload {
    pub record: ArtworkRecord,
    pub folder: String,
    pub attribution: String,
    pub download_url: String,
}

/// An artwork that still needs its download link resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDownload {
    pub record: ArtworkRecord,
    pub folder: String,
    pub attribution: String,
}

impl PendingDownload {
    pub fn resolved(self, download_url: String) -> ResolvedDownload {
        ResolvedDownload {
            record: self.record,
            folder: self.folder,
            attribution: self.attribution,
            download_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadResult {
    Saved { path: PathBuf, bytes: u64 },
    SkippedExisting { path: PathBuf },
    ResolveFailed { reason: String },
    FetchFailed { reason: String },
}

impl DownloadResult {
    pub fn label(&self) -> &'static str {
        match self {
            DownloadResult::Saved { .. } => "saved",
            DownloadResult::SkippedExisting { .. } => "skipped",
            DownloadResult::ResolveFailed { .. } => "resolve-failed",
            DownloadResult::FetchFailed { .. } => "fetch-failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DownloadResult::ResolveFailed { .. } | DownloadResult::FetchFailed { .. }
        )
    }
}

impl fmt::Display for DownloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadResult::Saved { path, bytes } => {
                write!(f, "saved {} ({} bytes)", path.display(), bytes)
            }
            DownloadResult::SkippedExisting { path } => {
                write!(f, "already exists: {}", path.display())
            }
            DownloadResult::ResolveFailed { reason } => write!(f, "resolve failed: {}", reason),
            DownloadResult::FetchFailed { reason } => write!(f, "fetch failed: {}", reason),
        }
    }
}

/// Outcome of one item processed by the download pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub record: ArtworkRecord,
    pub result: DownloadResult,
}
